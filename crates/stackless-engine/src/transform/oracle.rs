//! Suspend oracles
//!
//! Decide which calls to other graph functions may have to unwind. Calls to
//! builtins always may, calls to host functions never do; the oracle is only
//! asked about the rest.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::ir::{Callee, Function, Op, OpKind, Program};

/// Flags calls that may need to suspend the whole call chain
pub trait SuspendOracle {
    fn may_suspend(&self, func: &Function, op: &Op) -> bool;
}

/// Every call to a graph function may suspend
#[derive(Debug, Clone, Copy, Default)]
pub struct AllCalls;

impl SuspendOracle for AllCalls {
    fn may_suspend(&self, _func: &Function, op: &Op) -> bool {
        matches!(
            &op.kind,
            OpKind::Call {
                callee: Callee::Function(_),
                ..
            }
        )
    }
}

/// No call to a graph function suspends
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCalls;

impl SuspendOracle for NoCalls {
    fn may_suspend(&self, _func: &Function, _op: &Op) -> bool {
        false
    }
}

/// A call may suspend when its callee can reach a suspending builtin
#[derive(Debug, Clone, Default)]
pub struct CallGraphOracle {
    suspending: FxHashSet<String>,
}

impl CallGraphOracle {
    pub fn new(program: &Program) -> Self {
        let mut suspending: FxHashSet<String> = program
            .functions
            .iter()
            .filter(|f| f.blocks.iter().flat_map(|b| &b.ops).any(suspends_directly))
            .map(|f| f.name.clone())
            .collect();

        loop {
            let mut changed = false;
            for func in &program.functions {
                if suspending.contains(&func.name) {
                    continue;
                }
                let calls_suspending = func.blocks.iter().flat_map(|b| &b.ops).any(|op| {
                    matches!(&op.kind, OpKind::Call { callee: Callee::Function(name), .. } if suspending.contains(name))
                });
                if calls_suspending {
                    suspending.insert(func.name.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Self { suspending }
    }

    pub fn function_may_suspend(&self, name: &str) -> bool {
        self.suspending.contains(name)
    }
}

fn suspends_directly(op: &Op) -> bool {
    matches!(
        &op.kind,
        OpKind::Call {
            callee: Callee::Builtin(_),
            ..
        } | OpKind::ResumePoint { .. }
            | OpKind::ResumeStateInvoke { .. }
    )
}

impl SuspendOracle for CallGraphOracle {
    fn may_suspend(&self, _func: &Function, op: &Op) -> bool {
        match &op.kind {
            OpKind::Call {
                callee: Callee::Function(name),
                ..
            } => self.suspending.contains(name),
            _ => false,
        }
    }
}

/// Oracle selection, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OracleKind {
    AllCalls,
    NoCalls,
    #[default]
    CallGraph,
}

impl OracleKind {
    pub fn build(self, program: &Program) -> Box<dyn SuspendOracle> {
        match self {
            OracleKind::AllCalls => Box::new(AllCalls),
            OracleKind::NoCalls => Box::new(NoCalls),
            OracleKind::CallGraph => Box::new(CallGraphOracle::new(program)),
        }
    }
}

impl std::str::FromStr for OracleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-calls" => Ok(OracleKind::AllCalls),
            "no-calls" => Ok(OracleKind::NoCalls),
            "call-graph" => Ok(OracleKind::CallGraph),
            other => Err(format!("unknown oracle '{}'", other)),
        }
    }
}
