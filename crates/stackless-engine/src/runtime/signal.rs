//! Unwind and switch signals
//!
//! A signal is raised like an exception but never reaches program code: the
//! only handlers that match it are the save edges the transformer inserts.
//! While an unwind signal travels outward, every save routine it passes
//! appends one record to the signal's segment, at the outer end, so the
//! innermost suspended level stays the head.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::frame::record::relink;
use crate::frame::FrameRef;
use crate::value::Exception;

pub type SignalRef = Rc<Signal>;

/// What the trampoline does with a signal that reaches it
#[derive(Debug)]
pub enum SignalKind {
    /// Link the collected segment in front of the current chain and resume it
    Unwind,
    /// Continue with the given chain; `None` ends the run
    Switch(Option<FrameRef>),
}

/// Records collected by an unwind, innermost first
#[derive(Debug, Default)]
pub struct Segment {
    head: Option<FrameRef>,
    bottom: Option<FrameRef>,
    len: usize,
}

impl Segment {
    pub fn head(&self) -> Option<&FrameRef> {
        self.head.as_ref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Carrier passed to save routines
#[derive(Debug)]
pub struct Signal {
    kind: SignalKind,
    segment: RefCell<Segment>,
    base_depth: usize,
}

impl Signal {
    /// Unwind signal raised above a chain of `base_depth` records
    pub fn unwind(base_depth: usize) -> SignalRef {
        Rc::new(Self {
            kind: SignalKind::Unwind,
            segment: RefCell::new(Segment::default()),
            base_depth,
        })
    }

    pub fn switch(target: Option<FrameRef>) -> SignalRef {
        Rc::new(Self {
            kind: SignalKind::Switch(target),
            segment: RefCell::new(Segment::default()),
            base_depth: 0,
        })
    }

    pub fn kind(&self) -> &SignalKind {
        &self.kind
    }

    pub fn base_depth(&self) -> usize {
        self.base_depth
    }

    /// Logical depth the next saved record would have
    pub fn next_depth(&self) -> usize {
        self.base_depth + self.segment.borrow().len + 1
    }

    pub fn segment_len(&self) -> usize {
        self.segment.borrow().len
    }

    /// Append a record at the outer end of the segment
    pub fn append(&self, record: FrameRef) {
        let mut segment = self.segment.borrow_mut();
        match segment.bottom.take() {
            Some(bottom) => bottom.set_back(Some(record.clone())),
            None => segment.head = Some(record.clone()),
        }
        segment.bottom = Some(record);
        segment.len += 1;
    }

    /// Link the segment in front of `back` and return its head
    pub fn link_onto(&self, back: Option<FrameRef>) -> Result<FrameRef, RuntimeError> {
        let mut segment = self.segment.borrow_mut();
        let head = segment.head.take().ok_or(RuntimeError::EmptyChain)?;
        relink(&head, segment.len, back);
        segment.bottom = None;
        segment.len = 0;
        Ok(head)
    }
}

/// Anything that leaves an operation other than a normal result
#[derive(Debug, Clone)]
pub enum Raise {
    /// Ordinary program exception
    Exception(Rc<Exception>),
    /// Internal unwind/switch signal
    Signal(SignalRef),
    /// Internal fault; never caught
    Fault(RuntimeError),
}

impl From<RuntimeError> for Raise {
    fn from(err: RuntimeError) -> Self {
        Raise::Fault(err)
    }
}

impl fmt::Display for Raise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Raise::Exception(exc) => write!(f, "exception {}", exc),
            Raise::Signal(signal) => match signal.kind() {
                SignalKind::Unwind => write!(f, "unwind signal ({} records)", signal.segment_len()),
                SignalKind::Switch(_) => write!(f, "switch signal"),
            },
            Raise::Fault(err) => write!(f, "fault: {}", err),
        }
    }
}
