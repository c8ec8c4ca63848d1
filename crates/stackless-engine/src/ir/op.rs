//! IR operations
//!
//! Three groups of operations live here:
//! - ordinary operations produced by the front-end (arithmetic, calls, objects)
//! - hand-written resume markers (`ResumePoint`, `ResumeStateCreate`,
//!   `ResumeStateInvoke`) that the transformer consumes
//! - frame and runtime-state operations that only the transformer emits

use serde::{Deserialize, Serialize};

use super::types::{Constant, Operand, StorageClass, Var, VarId};
use crate::frame::{FrameTypeId, SaveRoutineId};

/// Runtime builtins that take part in the suspend/resume protocol.
///
/// Every builtin can raise the unwind signal, so a call to one is always
/// a suspend point no matter what the oracle says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    /// Save the whole call chain once and resume it
    StackUnwind,
    /// Number of frames on the logical stack
    StackFramesDepth,
    /// Jump to another frame chain, returning a handle to the current one
    Switch,
    /// Return a handle to the rest of the current function to its caller
    YieldCurrentFrameToCaller,
    /// Hand a hand-built chain to the trampoline with a return value or exception
    ResumeStateInvoke,
}

impl Builtin {
    pub const ALL: [Builtin; 5] = [
        Builtin::StackUnwind,
        Builtin::StackFramesDepth,
        Builtin::Switch,
        Builtin::YieldCurrentFrameToCaller,
        Builtin::ResumeStateInvoke,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::StackUnwind => "stack_unwind",
            Builtin::StackFramesDepth => "stack_frames_depth",
            Builtin::Switch => "switch",
            Builtin::YieldCurrentFrameToCaller => "yield_current_frame_to_caller",
            Builtin::ResumeStateInvoke => "resume_state_invoke",
        }
    }

    /// Number of resume points the builtin registers in the resume table
    pub fn resume_points(self) -> usize {
        match self {
            Builtin::Switch | Builtin::YieldCurrentFrameToCaller => 2,
            _ => 1,
        }
    }
}

/// Call target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callee {
    /// Another graph of the program, by name
    Function(String),
    /// A host function registered with the executor; never suspends
    Host(String),
    Builtin(Builtin),
}

impl std::fmt::Display for Callee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callee::Function(name) => write!(f, "{}", name),
            Callee::Host(name) => write!(f, "host:{}", name),
            Callee::Builtin(b) => write!(f, "builtin:{}", b.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }
}

/// Operation kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    // ===== Ordinary operations =====
    Const(Constant),
    Copy(Operand),
    Unary { op: UnaryOp, operand: Operand },
    Binary { op: BinaryOp, lhs: Operand, rhs: Operand },
    /// Numeric conversion to the result variable's type
    Cast(Operand),
    Call { callee: Callee, args: Vec<Operand> },
    NewObject { type_name: String, fields: Vec<Operand> },
    GetField { object: Operand, index: usize },
    SetField { object: Operand, index: usize, value: Operand },
    /// Build an exception object that an `Exit::Raise` can throw
    NewException { kind: String, payload: Operand },
    IsNull(Operand),

    // ===== Hand-written resume markers =====
    /// Names the suspend point of the call right before it and fixes the
    /// exact list of values saved there.
    ResumePoint {
        label: String,
        live: Vec<Operand>,
        returns: Option<VarId>,
    },
    /// Build a frame record for `label` without running any code
    ResumeStateCreate {
        prev: Operand,
        label: String,
        values: Vec<Operand>,
    },
    /// Run a hand-built chain, delivering a return value or an exception to it
    ResumeStateInvoke {
        chain: Operand,
        returning: Option<Operand>,
        raising: Option<Operand>,
    },

    // ===== Emitted by the transformer =====
    ReadRestartSubstate,
    ResetRestartSubstate,
    /// Take the chain head as a record of `frame_type` and pop it
    PopFrame { frame_type: FrameTypeId },
    /// Read a payload field back, cast to the result variable's type
    LoadField { frame: Operand, index: usize },
    /// Fetch the return carrier of `class`; raises a pending exception instead
    FetchReturn { class: Option<StorageClass> },
    /// Run a save routine into the unwind carrier
    SaveFrame {
        routine: SaveRoutineId,
        frame_type: FrameTypeId,
        restart: usize,
        carrier: Operand,
        values: Vec<Operand>,
    },
    /// Lowered `ResumeStateCreate`; the restart index is patched once known
    BuildFrame {
        label: String,
        frame_type: FrameTypeId,
        restart: Option<usize>,
        prev: Operand,
        values: Vec<Operand>,
    },
}

/// One operation with its optional result variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub kind: OpKind,
    pub result: Option<Var>,
}

impl Op {
    pub fn new(kind: OpKind, result: Option<Var>) -> Self {
        Self { kind, result }
    }

    /// Operation without a result
    pub fn effect(kind: OpKind) -> Self {
        Self { kind, result: None }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, OpKind::Call { .. })
    }

    /// Operations a `Catch` exit may guard: calls (including a not yet
    /// lowered `ResumeStateInvoke`), and the return fetch of a resume block,
    /// which re-raises a pending exception
    pub fn is_guardable(&self) -> bool {
        matches!(
            self.kind,
            OpKind::Call { .. } | OpKind::ResumeStateInvoke { .. } | OpKind::FetchReturn { .. }
        )
    }

    pub fn result_id(&self) -> Option<VarId> {
        self.result.as_ref().map(|v| v.id)
    }

    /// All operands read by this operation
    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            OpKind::Const(_)
            | OpKind::ReadRestartSubstate
            | OpKind::ResetRestartSubstate
            | OpKind::PopFrame { .. }
            | OpKind::FetchReturn { .. } => Vec::new(),
            OpKind::Copy(a) | OpKind::Cast(a) | OpKind::IsNull(a) => vec![a],
            OpKind::Unary { operand, .. } => vec![operand],
            OpKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            OpKind::Call { args, .. } => args.iter().collect(),
            OpKind::NewObject { fields, .. } => fields.iter().collect(),
            OpKind::GetField { object, .. } => vec![object],
            OpKind::SetField { object, value, .. } => vec![object, value],
            OpKind::NewException { payload, .. } => vec![payload],
            OpKind::ResumePoint { live, .. } => live.iter().collect(),
            OpKind::ResumeStateCreate { prev, values, .. }
            | OpKind::BuildFrame { prev, values, .. } => {
                std::iter::once(prev).chain(values.iter()).collect()
            }
            OpKind::ResumeStateInvoke { chain, returning, raising } => std::iter::once(chain)
                .chain(returning.iter())
                .chain(raising.iter())
                .collect(),
            OpKind::LoadField { frame, .. } => vec![frame],
            OpKind::SaveFrame { carrier, values, .. } => {
                std::iter::once(carrier).chain(values.iter()).collect()
            }
        }
    }

    /// Mutable access to all operands read by this operation
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match &mut self.kind {
            OpKind::Const(_)
            | OpKind::ReadRestartSubstate
            | OpKind::ResetRestartSubstate
            | OpKind::PopFrame { .. }
            | OpKind::FetchReturn { .. } => Vec::new(),
            OpKind::Copy(a) | OpKind::Cast(a) | OpKind::IsNull(a) => vec![a],
            OpKind::Unary { operand, .. } => vec![operand],
            OpKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            OpKind::Call { args, .. } => args.iter_mut().collect(),
            OpKind::NewObject { fields, .. } => fields.iter_mut().collect(),
            OpKind::GetField { object, .. } => vec![object],
            OpKind::SetField { object, value, .. } => vec![object, value],
            OpKind::NewException { payload, .. } => vec![payload],
            OpKind::ResumePoint { live, .. } => live.iter_mut().collect(),
            OpKind::ResumeStateCreate { prev, values, .. }
            | OpKind::BuildFrame { prev, values, .. } => {
                std::iter::once(prev).chain(values.iter_mut()).collect()
            }
            OpKind::ResumeStateInvoke { chain, returning, raising } => std::iter::once(chain)
                .chain(returning.iter_mut())
                .chain(raising.iter_mut())
                .collect(),
            OpKind::LoadField { frame, .. } => vec![frame],
            OpKind::SaveFrame { carrier, values, .. } => {
                std::iter::once(carrier).chain(values.iter_mut()).collect()
            }
        }
    }

    /// Variables read by this operation
    pub fn used_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.operands().into_iter().filter_map(|o| o.as_var())
    }
}
