//! Per-thread continuation state
//!
//! One instance per OS thread, reached from every function without being
//! passed around. Borrows are kept short: no closure given to [`with_state`]
//! may call back into program code.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use super::signal::Signal;
use super::table::ResumeTable;
use crate::error::RuntimeError;
use crate::frame::record::relink;
use crate::frame::{FrameLayout, FrameRecord, FrameRef, FrameTypeId};
use crate::ir::{StorageClass, Type};
use crate::value::{Exception, Value};

/// `restart_substate` value meaning "not resuming"
pub const SENTINEL: i64 = -1;

/// The continuation runtime state
#[derive(Debug)]
pub struct RuntimeState {
    top: Option<FrameRef>,
    restart_substate: i64,
    carriers: [Value; StorageClass::COUNT],
    pending_exception: Option<Rc<Exception>>,
    depth_limit: Option<usize>,
    table: Option<Rc<ResumeTable>>,
    layouts: Rc<[FrameLayout]>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    static STATE: RefCell<RuntimeState> = RefCell::new(RuntimeState::new());
}

/// Run `f` with this thread's runtime state
pub fn with_state<R>(f: impl FnOnce(&mut RuntimeState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

impl RuntimeState {
    pub fn new() -> Self {
        Self {
            top: None,
            restart_substate: SENTINEL,
            carriers: Default::default(),
            pending_exception: None,
            depth_limit: None,
            table: None,
            layouts: Rc::from(Vec::new()),
        }
    }

    /// Install the finished resume table and frame layouts, clearing any
    /// chain or carrier left from a previous run
    pub fn install(&mut self, table: Rc<ResumeTable>, layouts: Rc<[FrameLayout]>) {
        self.table = Some(table);
        self.layouts = layouts;
        self.reset();
    }

    /// Drop the active chain and clear carriers
    pub fn reset(&mut self) {
        self.top = None;
        self.restart_substate = SENTINEL;
        self.carriers = Default::default();
        self.pending_exception = None;
    }

    pub fn set_depth_limit(&mut self, limit: Option<usize>) {
        self.depth_limit = limit;
    }

    pub fn depth_limit(&self) -> Option<usize> {
        self.depth_limit
    }

    pub fn table(&self) -> Result<Rc<ResumeTable>, RuntimeError> {
        self.table.clone().ok_or(RuntimeError::TableNotInstalled)
    }

    pub fn layout(&self, id: FrameTypeId) -> Result<&FrameLayout, RuntimeError> {
        self.layouts
            .get(id.0 as usize)
            .ok_or(RuntimeError::UnknownFrameType(id.0))
    }

    // ===== Chain =====

    pub fn top(&self) -> Option<&FrameRef> {
        self.top.as_ref()
    }

    pub fn set_top(&mut self, top: Option<FrameRef>) {
        self.top = top;
    }

    /// Depth of the active chain
    pub fn depth(&self) -> usize {
        self.top.as_ref().map_or(0, |t| t.depth())
    }

    /// Make `record` the new head, linked in front of the current one
    pub fn push(&mut self, record: FrameRef) {
        let back = self.top.take();
        relink(&record, 1, back);
        self.top = Some(record);
    }

    /// Take the head of the chain; `top` becomes its back pointer
    pub fn pop(&mut self) -> Result<FrameRef, RuntimeError> {
        let head = self.top.take().ok_or(RuntimeError::EmptyChain)?;
        self.top = head.back();
        Ok(head)
    }

    /// Pop a record that must be of `frame_type`
    pub fn pop_typed(&mut self, frame_type: FrameTypeId) -> Result<FrameRef, RuntimeError> {
        let head = self.top.as_ref().ok_or(RuntimeError::EmptyChain)?;
        head.expect_type(frame_type)?;
        self.pop()
    }

    // ===== Resume selector =====

    pub fn restart_substate(&self) -> i64 {
        self.restart_substate
    }

    pub fn set_restart_substate(&mut self, substate: i64) {
        self.restart_substate = substate;
    }

    pub fn reset_restart_substate(&mut self) {
        self.restart_substate = SENTINEL;
    }

    pub fn is_resuming(&self) -> bool {
        self.restart_substate != SENTINEL
    }

    // ===== Carriers =====

    /// Store a returned value in the carrier of its type's class. Clears any
    /// pending exception.
    pub fn set_return(&mut self, value: Value, ty: &Type) -> Result<(), RuntimeError> {
        self.pending_exception = None;
        if let Some(class) = ty.storage_class() {
            self.carriers[class.index()] = value.erase(class)?;
        }
        Ok(())
    }

    /// Store a value in the carrier of its own class
    pub fn set_return_value(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.pending_exception = None;
        if let Some(class) = value.storage_class() {
            self.carriers[class.index()] = value.erase(class)?;
        }
        Ok(())
    }

    pub fn set_pending_exception(&mut self, exception: Rc<Exception>) {
        self.pending_exception = Some(exception);
    }

    /// Take the value of `class`'s carrier, or the pending exception if one
    /// was set since the last return
    pub fn fetch_return(&mut self, class: Option<StorageClass>) -> Result<Value, Rc<Exception>> {
        if let Some(exception) = self.pending_exception.take() {
            return Err(exception);
        }
        Ok(match class {
            Some(class) => std::mem::take(&mut self.carriers[class.index()]),
            None => Value::Void,
        })
    }

    // ===== Saving =====

    /// Run the save routine of `frame_type`: erase `values` into a new
    /// record and append it to the unwinding segment of `carrier`.
    ///
    /// When the record would push the logical stack past the depth limit
    /// nothing is linked and the overflow exception is returned instead.
    pub fn save_frame(
        &self,
        carrier: &Signal,
        frame_type: FrameTypeId,
        restart: usize,
        values: &[Value],
    ) -> Result<(), SaveError> {
        let depth = carrier.next_depth();
        if let Some(limit) = self.depth_limit {
            if depth > limit {
                warn!(depth, limit, restart, "depth limit exceeded while saving frame");
                return Err(SaveError::Overflow(Exception::stack_overflow(depth)));
            }
        }
        let fields = self.erase_fields(frame_type, values)?;
        carrier.append(FrameRecord::new(frame_type, restart, fields, None));
        Ok(())
    }

    /// Build a record without running code (`resume_state_create`)
    pub fn build_frame(
        &self,
        frame_type: FrameTypeId,
        restart: usize,
        values: &[Value],
        back: Option<FrameRef>,
    ) -> Result<FrameRef, RuntimeError> {
        let fields = self.erase_fields(frame_type, values)?;
        Ok(FrameRecord::new(frame_type, restart, fields, back))
    }

    fn erase_fields(
        &self,
        frame_type: FrameTypeId,
        values: &[Value],
    ) -> Result<Vec<Value>, RuntimeError> {
        let layout = self.layout(frame_type)?;
        if layout.len() != values.len() {
            return Err(RuntimeError::FrameTypeMismatch {
                expected: format!("{} ({} fields)", frame_type, layout.len()),
                found: format!("{} values", values.len()),
            });
        }
        layout
            .fields
            .iter()
            .zip(values)
            .map(|(field, value)| value.erase(field.class))
            .collect()
    }
}

/// Why a save routine did not link its record
#[derive(Debug)]
pub enum SaveError {
    Overflow(Rc<Exception>),
    Fault(RuntimeError),
}

impl From<RuntimeError> for SaveError {
    fn from(err: RuntimeError) -> Self {
        SaveError::Fault(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameTyper;

    fn state_with_layouts() -> RuntimeState {
        let mut typer = FrameTyper::new();
        typer.frame_type_for(&[StorageClass::Int]);
        let mut state = RuntimeState::new();
        state.install(Rc::new(ResumeTable::new()), Rc::from(typer.into_layouts()));
        state
    }

    #[test]
    fn test_push_pop() {
        let mut state = state_with_layouts();
        let a = FrameRecord::new(FrameTypeId::EMPTY, 0, vec![], None);
        let b = FrameRecord::new(FrameTypeId::EMPTY, 1, vec![], None);
        state.push(a);
        state.push(b);
        assert_eq!(state.depth(), 2);
        assert_eq!(state.pop().unwrap().restart(), 1);
        assert_eq!(state.pop().unwrap().restart(), 0);
        assert_eq!(state.pop().unwrap_err(), RuntimeError::EmptyChain);
    }

    #[test]
    fn test_fetch_return_prefers_pending_exception() {
        let mut state = state_with_layouts();
        state.set_return(Value::I32(5), &Type::I32).unwrap();
        assert_eq!(
            state.fetch_return(Some(StorageClass::Int)).unwrap(),
            Value::I64(5)
        );

        state.set_pending_exception(Exception::new("ValueError", Value::Void));
        let err = state.fetch_return(Some(StorageClass::Int)).unwrap_err();
        assert_eq!(err.kind, "ValueError");
        // consumed
        assert!(state.fetch_return(None).is_ok());
    }

    #[test]
    fn test_set_return_clears_pending() {
        let mut state = state_with_layouts();
        state.set_pending_exception(Exception::new("E", Value::Void));
        state.set_return(Value::F64(1.5), &Type::F64).unwrap();
        assert_eq!(
            state.fetch_return(Some(StorageClass::Float)).unwrap(),
            Value::F64(1.5)
        );
    }

    #[test]
    fn test_save_frame_depth_limit() {
        let mut state = state_with_layouts();
        state.set_depth_limit(Some(2));
        let carrier = Signal::unwind(0);
        state.save_frame(&carrier, FrameTypeId::EMPTY, 0, &[]).unwrap();
        state.save_frame(&carrier, FrameTypeId::EMPTY, 0, &[]).unwrap();
        let err = state.save_frame(&carrier, FrameTypeId::EMPTY, 0, &[]).unwrap_err();
        assert!(matches!(err, SaveError::Overflow(ref e) if e.is_stack_overflow()));
        assert_eq!(carrier.segment_len(), 2);
    }

    #[test]
    fn test_save_frame_erases_fields() {
        let state = state_with_layouts();
        let carrier = Signal::unwind(0);
        state
            .save_frame(&carrier, FrameTypeId(2), 7, &[Value::Bool(true)])
            .unwrap();
        let head = carrier.link_onto(None).unwrap();
        assert_eq!(head.fields(), &[Value::I64(1)]);
        assert_eq!(head.restart(), 7);
    }
}
