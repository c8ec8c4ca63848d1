//! Heap frames
//!
//! Frame types (interned by storage-class counts) and the frame records that
//! hold a suspended call level.

pub mod record;
pub mod typer;

pub use record::{chain_len, FrameRecord, FrameRef};
pub use typer::{FrameCapture, FrameLayout, FrameTypeId, FrameTyper, SaveRoutineId};
