//! The trampoline
//!
//! Drives a frame chain to completion from one native frame. Each step
//! decodes the head's restart index, points the runtime state at the chain
//! and calls the decoded function with dummy arguments; that function's
//! dispatch block finds its way to the right resume block by itself.
//!
//! Outcomes of a step:
//! - normal return: the function already popped its record, so `top` is the
//!   rest of the chain; the value goes into the return carrier
//! - unwind: the collected segment is linked in front of `top`
//! - switch: the target chain replaces the current one
//! - exception: becomes the pending exception of the next outer record, or
//!   leaves the trampoline when there is none

use tracing::{debug, trace};

use super::primitives::call_builtin;
use super::signal::{Raise, SignalKind};
use super::state::with_state;
use super::table::FuncAddr;
use crate::frame::FrameRef;
use crate::ir::{FunctionId, StorageClass, Type};
use crate::value::Value;

/// Calls graph functions on behalf of the trampoline
pub trait Invoker {
    /// Call `func` with `args` as an ordinary call
    fn invoke(&self, func: FunctionId, args: Vec<Value>) -> Result<Value, Raise>;
}

enum Step {
    Continue(FrameRef),
    Finish(Value),
}

/// Classify the outcome of a call made with the current `top`
fn step(result: Result<Value, Raise>, result_type: &Type) -> Result<Step, Raise> {
    match result {
        Ok(value) => {
            let rest = with_state(|s| s.top().cloned());
            match rest {
                Some(rest) => {
                    with_state(|s| s.set_return(value, result_type))?;
                    Ok(Step::Continue(rest))
                }
                None => Ok(Step::Finish(value)),
            }
        }
        Err(Raise::Signal(signal)) => match signal.kind() {
            SignalKind::Unwind => {
                let rest = with_state(|s| s.top().cloned());
                let head = signal.link_onto(rest)?;
                trace!(depth = head.depth(), "unwound");
                Ok(Step::Continue(head))
            }
            SignalKind::Switch(Some(target)) => {
                trace!(depth = target.depth(), "switched");
                Ok(Step::Continue(target.clone()))
            }
            SignalKind::Switch(None) => {
                let value = with_state(|s| s.fetch_return(Some(StorageClass::Ref)))
                    .map_err(Raise::Exception)?;
                Ok(Step::Finish(value))
            }
        },
        Err(Raise::Exception(exception)) => {
            let rest = with_state(|s| s.top().cloned());
            match rest {
                Some(rest) => {
                    trace!(kind = %exception.kind, "exception delivered to outer record");
                    with_state(|s| s.set_pending_exception(exception));
                    Ok(Step::Continue(rest))
                }
                None => Err(Raise::Exception(exception)),
            }
        }
        Err(fault @ Raise::Fault(_)) => Err(fault),
    }
}

/// Run a chain until nothing is left of it
pub fn run(chain: FrameRef, invoker: &dyn Invoker) -> Result<Value, Raise> {
    let table = with_state(|s| s.table())?;
    let mut chain = chain;
    let mut steps: u64 = 0;
    loop {
        steps += 1;
        let decoded = table.decode(chain.restart())?;
        trace!(
            func = %decoded.func,
            substate = decoded.substate,
            depth = chain.depth(),
            "dispatch"
        );
        with_state(|s| {
            s.set_restart_substate(decoded.substate as i64);
            s.set_top(Some(chain));
        });

        let result = match decoded.func {
            FuncAddr::Builtin(builtin) => call_builtin(builtin, &[]),
            FuncAddr::Graph(id) => {
                let args = decoded
                    .signature
                    .params
                    .iter()
                    .map(Value::default_for)
                    .collect();
                invoker.invoke(id, args)
            }
        };

        match step(result, &decoded.signature.result) {
            Ok(Step::Continue(next)) => chain = next,
            Ok(Step::Finish(value)) => {
                debug!(steps, "trampoline finished");
                return Ok(value);
            }
            Err(raise) => {
                with_state(|s| s.reset());
                return Err(raise);
            }
        }
    }
}

/// Handle the outcome of an ordinary top-level call: a signal escaping it
/// hands the computation over to the trampoline.
pub fn drive(result: Result<Value, Raise>, result_type: &Type, invoker: &dyn Invoker) -> Result<Value, Raise> {
    match step(result, result_type) {
        Ok(Step::Finish(value)) => Ok(value),
        Ok(Step::Continue(chain)) => run(chain, invoker),
        Err(raise) => {
            with_state(|s| s.reset());
            Err(raise)
        }
    }
}
