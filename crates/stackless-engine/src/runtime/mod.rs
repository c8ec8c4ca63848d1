//! Continuation runtime
//!
//! Per-thread state, the resume table, the unwind/switch signals, the
//! builtins and the trampoline that ties them together.

pub mod primitives;
pub mod signal;
pub mod state;
pub mod table;
pub mod trampoline;

pub use primitives::call_builtin;
pub use signal::{Raise, Signal, SignalKind, SignalRef};
pub use state::{with_state, RuntimeState, SENTINEL};
pub use table::{FuncAddr, ResumeTable, RestartEntry, Signature, SignatureId};
pub use trampoline::Invoker;
