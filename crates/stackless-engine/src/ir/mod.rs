//! Flow-graph IR
//!
//! The graph representation the stackless transform consumes and rewrites.
//! Blocks own their variables; values cross block boundaries only through
//! link arguments.

pub mod block;
pub mod builder;
pub mod function;
pub mod op;
pub mod pretty;
pub mod program;
pub mod types;

pub use block::{Block, BlockId, Catch, Exit, Handler, Link};
pub use builder::FunctionBuilder;
pub use function::Function;
pub use op::{BinaryOp, Builtin, Callee, Op, OpKind, UnaryOp};
pub use pretty::PrettyPrint;
pub use program::{FunctionId, Program};
pub use types::{Constant, Operand, StorageClass, Type, Var, VarId};
