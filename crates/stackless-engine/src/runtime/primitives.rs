//! Runtime builtins
//!
//! Every builtin follows the same protocol as transformed code. Called with
//! the sentinel substate it saves a record of its own and starts an unwind,
//! so the whole native stack is turned into a chain first. The trampoline
//! then resumes that record and the builtin performs its effect with no
//! native frames left above it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::signal::{Raise, Signal};
use super::state::{with_state, SaveError, SENTINEL};
use super::table::ResumeTable;
use crate::error::RuntimeError;
use crate::frame::record::{relink, splice};
use crate::frame::{FrameRecord, FrameRef, FrameTypeId};
use crate::ir::{Builtin, StorageClass};
use crate::value::{GcObject, GcRef, Value};

const INVOCATION: &str = "invocation";

impl From<SaveError> for Raise {
    fn from(err: SaveError) -> Self {
        match err {
            SaveError::Overflow(exception) => Raise::Exception(exception),
            SaveError::Fault(err) => Raise::Fault(err),
        }
    }
}

/// Call a builtin, either from program code or from the trampoline
pub fn call_builtin(builtin: Builtin, args: &[Value]) -> Result<Value, Raise> {
    let substate = with_state(|s| s.restart_substate());
    if substate == SENTINEL {
        enter(builtin, args)
    } else {
        resume(builtin, substate)
    }
}

fn arg(builtin: Builtin, args: &[Value], index: usize) -> Result<&Value, RuntimeError> {
    args.get(index).ok_or_else(|| RuntimeError::InvalidOperation {
        function: builtin.name().to_string(),
        reason: format!("missing argument {}", index),
    })
}

/// Save this builtin's record and start unwinding
fn suspend(builtin: Builtin, frame_type: FrameTypeId, values: &[Value]) -> Raise {
    let restart = ResumeTable::builtin_index(builtin, 0);
    let saved = with_state(|s| {
        let signal = Signal::unwind(s.depth());
        s.save_frame(&signal, frame_type, restart, values)
            .map(|()| signal)
    });
    match saved {
        Ok(signal) => Raise::Signal(signal),
        Err(err) => err.into(),
    }
}

fn enter(builtin: Builtin, args: &[Value]) -> Result<Value, Raise> {
    trace!(builtin = builtin.name(), "suspending");
    let raise = match builtin {
        Builtin::StackUnwind | Builtin::StackFramesDepth | Builtin::YieldCurrentFrameToCaller => {
            suspend(builtin, FrameTypeId::EMPTY, &[])
        }
        Builtin::Switch => {
            let target = arg(builtin, args, 0)?;
            if target.as_frame()?.is_none() {
                return Err(RuntimeError::EmptyChain.into());
            }
            suspend(builtin, FrameTypeId::SINGLE_REF, std::slice::from_ref(target))
        }
        Builtin::ResumeStateInvoke => {
            let chain = arg(builtin, args, 0)?;
            if chain.as_frame()?.is_none() {
                return Err(RuntimeError::EmptyChain.into());
            }
            let outcome = match args.get(2) {
                Some(Value::Ref(GcRef::Exception(raising))) => {
                    Value::Ref(GcRef::Exception(raising.clone()))
                }
                _ => args.get(1).cloned().unwrap_or_default(),
            };
            let invocation = Value::Ref(GcRef::Object(Rc::new(GcObject {
                type_name: INVOCATION.to_string(),
                fields: RefCell::new(vec![chain.clone(), outcome]),
            })));
            suspend(builtin, FrameTypeId::SINGLE_REF, &[invocation])
        }
    };
    Err(raise)
}

/// Pop this builtin's own record
fn pop_own(frame_type: FrameTypeId) -> Result<FrameRef, RuntimeError> {
    with_state(|s| {
        s.reset_restart_substate();
        s.pop_typed(frame_type)
    })
}

fn fetch(class: Option<StorageClass>) -> Result<Value, Raise> {
    with_state(|s| s.fetch_return(class)).map_err(Raise::Exception)
}

fn payload_chain(record: &FrameRecord) -> Result<FrameRef, RuntimeError> {
    record.field(0)?.as_frame()?.ok_or(RuntimeError::EmptyChain)
}

/// Chain and outcome held by a suspended `resume_state_invoke`. The outcome
/// stays in the record until the invocation resumes, so an overflow while
/// unwinding leaves the carriers untouched.
fn open_invocation(record: &FrameRecord) -> Result<(FrameRef, Value), RuntimeError> {
    let malformed = || RuntimeError::InvalidOperation {
        function: Builtin::ResumeStateInvoke.name().to_string(),
        reason: "record does not hold an invocation".to_string(),
    };
    let GcRef::Object(invocation) = record.field(0)?.as_gc_ref()? else {
        return Err(malformed());
    };
    if invocation.type_name != INVOCATION {
        return Err(malformed());
    }
    let fields = invocation.fields.borrow();
    let [chain, outcome] = fields.as_slice() else {
        return Err(malformed());
    };
    let chain = chain.as_frame()?.ok_or(RuntimeError::EmptyChain)?;
    Ok((chain, outcome.clone()))
}

fn resume(builtin: Builtin, substate: i64) -> Result<Value, Raise> {
    trace!(builtin = builtin.name(), substate, "resuming");
    match (builtin, substate) {
        (Builtin::StackUnwind, 0) => {
            pop_own(FrameTypeId::EMPTY)?;
            fetch(None)?;
            Ok(Value::Void)
        }
        (Builtin::StackFramesDepth, 0) => {
            pop_own(FrameTypeId::EMPTY)?;
            fetch(None)?;
            let depth = with_state(|s| s.depth());
            Ok(Value::I64(depth as i64))
        }
        (Builtin::Switch, 0) => {
            let record = pop_own(FrameTypeId::SINGLE_REF)?;
            let target = payload_chain(&record)?;
            // The current chain is the source; whoever we switch to receives
            // a handle to it as the result of its own switch.
            with_state(|s| {
                let source = FrameRecord::new(
                    FrameTypeId::EMPTY,
                    ResumeTable::builtin_index(Builtin::Switch, 1),
                    Vec::new(),
                    s.top().cloned(),
                );
                s.set_top(None);
                s.set_return_value(Value::Ref(GcRef::Frame(source)))
            })?;
            Err(Raise::Signal(Signal::switch(Some(target))))
        }
        (Builtin::Switch, 1) => {
            pop_own(FrameTypeId::EMPTY)?;
            fetch(Some(StorageClass::Ref))
        }
        (Builtin::YieldCurrentFrameToCaller, 0) => {
            pop_own(FrameTypeId::EMPTY)?;
            // The yielding function's record becomes a standalone chain that
            // ends in a record resuming the switch out of it when it returns.
            let (handle, caller) = with_state(|s| {
                let handle = s.top().cloned().ok_or(RuntimeError::EmptyChain)?;
                let caller = handle.back();
                let end = FrameRecord::new(
                    FrameTypeId::EMPTY,
                    ResumeTable::builtin_index(Builtin::YieldCurrentFrameToCaller, 1),
                    Vec::new(),
                    None,
                );
                relink(&handle, 1, Some(end));
                s.set_top(None);
                s.set_return_value(Value::Ref(GcRef::Frame(handle.clone())))?;
                Ok::<_, RuntimeError>((handle, caller))
            })?;
            trace!(depth = handle.depth(), "yielded frame to caller");
            Err(Raise::Signal(Signal::switch(caller)))
        }
        (Builtin::YieldCurrentFrameToCaller, 1) => {
            pop_own(FrameTypeId::EMPTY)?;
            let target = fetch(Some(StorageClass::Ref))?.as_frame()?;
            with_state(|s| s.set_return_value(Value::null()))?;
            Err(Raise::Signal(Signal::switch(target)))
        }
        (Builtin::ResumeStateInvoke, 0) => {
            let record = pop_own(FrameTypeId::SINGLE_REF)?;
            let (chain, outcome) = open_invocation(&record)?;
            // Nothing runs between here and the chain's first fetch
            with_state(|s| match outcome {
                Value::Ref(GcRef::Exception(exception)) => {
                    s.set_pending_exception(exception);
                    Ok(())
                }
                value => s.set_return_value(value),
            })?;
            let remainder = with_state(|s| s.top().cloned());
            splice(&chain, remainder);
            Err(Raise::Signal(Signal::switch(Some(chain))))
        }
        _ => Err(RuntimeError::BadSubstate {
            function: builtin.name().to_string(),
            substate,
        }
        .into()),
    }
}
