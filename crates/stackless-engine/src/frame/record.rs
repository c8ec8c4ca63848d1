//! Frame records and chains
//!
//! A frame record is the heap image of one suspended call level. Records are
//! linked innermost-first through `back`; the outermost record has no back
//! pointer. `depth` counts records from this one out to the end of its chain
//! (outermost = 1) and is renumbered whenever records are relinked.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::typer::FrameTypeId;
use crate::error::RuntimeError;
use crate::value::Value;

/// Shared handle to a frame record
pub type FrameRef = Rc<FrameRecord>;

/// One suspended call level
pub struct FrameRecord {
    back: RefCell<Option<FrameRef>>,
    restart: usize,
    depth: Cell<usize>,
    frame_type: FrameTypeId,
    fields: Box<[Value]>,
}

impl FrameRecord {
    /// Allocate a record with the given (already erased) payload
    pub fn new(
        frame_type: FrameTypeId,
        restart: usize,
        fields: Vec<Value>,
        back: Option<FrameRef>,
    ) -> FrameRef {
        let depth = back.as_ref().map_or(0, |b| b.depth()) + 1;
        Rc::new(Self {
            back: RefCell::new(back),
            restart,
            depth: Cell::new(depth),
            frame_type,
            fields: fields.into_boxed_slice(),
        })
    }

    pub fn back(&self) -> Option<FrameRef> {
        self.back.borrow().clone()
    }

    /// Replace the back pointer. Depths of this record and of any records
    /// pointing at it are not updated; see [`relink`].
    pub fn set_back(&self, back: Option<FrameRef>) {
        *self.back.borrow_mut() = back;
    }

    pub fn restart(&self) -> usize {
        self.restart
    }

    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn frame_type(&self) -> FrameTypeId {
        self.frame_type
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Result<&Value, RuntimeError> {
        self.fields
            .get(index)
            .ok_or(RuntimeError::MissingField(index))
    }

    /// Fail unless the record has the expected frame type
    pub fn expect_type(&self, expected: FrameTypeId) -> Result<(), RuntimeError> {
        if self.frame_type == expected {
            Ok(())
        } else {
            Err(RuntimeError::FrameTypeMismatch {
                expected: expected.to_string(),
                found: self.frame_type.to_string(),
            })
        }
    }
}

impl Drop for FrameRecord {
    fn drop(&mut self) {
        // Unlink iteratively so dropping a long chain does not recurse
        let mut next = self.back.get_mut().take();
        while let Some(record) = next {
            match Rc::try_unwrap(record) {
                Ok(mut record) => next = record.back.get_mut().take(),
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for FrameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRecord")
            .field("restart", &self.restart)
            .field("depth", &self.depth.get())
            .field("frame_type", &self.frame_type)
            .field("fields", &self.fields)
            .field("has_back", &self.back.borrow().is_some())
            .finish()
    }
}

/// Number of records in a chain
pub fn chain_len(head: Option<&FrameRef>) -> usize {
    iter_chain(head.cloned()).count()
}

/// Link `len` records starting at `head` in front of `back` and renumber
/// their depths. The `len`-th record's back pointer is replaced.
pub fn relink(head: &FrameRef, len: usize, back: Option<FrameRef>) {
    let mut segment = Vec::with_capacity(len);
    let mut cursor = Some(head.clone());
    while segment.len() < len {
        let Some(record) = cursor else { break };
        cursor = record.back();
        segment.push(record);
    }
    let Some(bottom) = segment.last() else {
        return;
    };
    let mut depth = back.as_ref().map_or(0, |b| b.depth());
    bottom.set_back(back);
    for record in segment.iter().rev() {
        depth += 1;
        record.depth.set(depth);
    }
}

/// Append a whole chain in front of `back`
pub fn splice(head: &FrameRef, back: Option<FrameRef>) {
    let len = chain_len(Some(head));
    relink(head, len, back);
}

/// Iterate over the records of a chain, innermost first
pub fn iter_chain(head: Option<FrameRef>) -> impl Iterator<Item = FrameRef> {
    std::iter::successors(head, |record| record.back())
}
