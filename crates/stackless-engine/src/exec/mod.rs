//! Reference executor
//!
//! Runs flow graphs directly, one native Rust frame per graph call, over the
//! per-thread runtime state. This is what exercises transformed programs end
//! to end: the first call runs natively, and any unwind or switch signal that
//! escapes it hands the computation to the trampoline.

mod eval;

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ExecError, RuntimeError};
use crate::ir::{FunctionId, Program};
use crate::runtime::trampoline::{self, Invoker};
use crate::runtime::{with_state, Raise};
use crate::value::Value;

/// Host function callable from graphs; host functions never suspend
pub type HostFn = Rc<dyn Fn(&[Value]) -> Result<Value, Raise>>;

/// Graph interpreter
pub struct Machine {
    program: Rc<Program>,
    hosts: FxHashMap<String, HostFn>,
}

impl Machine {
    pub fn new(program: Program) -> Self {
        Self {
            program: Rc::new(program),
            hosts: FxHashMap::default(),
        }
    }

    /// Register a host function under `name`
    pub fn register_host(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, Raise> + 'static,
    ) {
        self.hosts.insert(name.into(), Rc::new(f));
    }

    pub fn with_host(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, Raise> + 'static,
    ) -> Self {
        self.register_host(name, f);
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Call `name` with `args` and drive it to completion.
    ///
    /// Must not be called from inside a running program: it starts from an
    /// empty chain.
    pub fn run(&self, name: &str, args: Vec<Value>) -> Result<Value, ExecError> {
        let id = self
            .program
            .function_id(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        let result_type = self
            .program
            .function(id)
            .map(|f| f.result.clone())
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;

        with_state(|s| s.reset());
        debug!(function = name, "run");

        let result = self.call(id, args);
        match trampoline::drive(result, &result_type, self) {
            Ok(value) => Ok(value),
            Err(Raise::Exception(exception)) => Err(ExecError::Uncaught(exception)),
            Err(Raise::Fault(err)) => Err(ExecError::Fault(err)),
            Err(Raise::Signal(_)) => Err(ExecError::Fault(RuntimeError::InvalidOperation {
                function: name.to_string(),
                reason: "signal escaped the trampoline".to_string(),
            })),
        }
    }
}

impl Invoker for Machine {
    fn invoke(&self, func: FunctionId, args: Vec<Value>) -> Result<Value, Raise> {
        self.call(func, args)
    }
}
