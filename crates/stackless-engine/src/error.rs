//! Error types
//!
//! Transform-time errors are fatal and reported before any code runs.
//! Runtime errors are internal faults of the executor and the runtime; they
//! are never catchable by program code. The depth-limit overflow is not an
//! error here: it is an ordinary exception (see [`crate::value::STACK_OVERFLOW`]).

use std::rc::Rc;

use thiserror::Error;

use crate::ir::{StorageClass, VarId};
use crate::value::Exception;

/// Errors raised while rewriting a program
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("{function}: {value} is needed after resume point '{label}' but is not saved by it")]
    UncoveredValue {
        function: String,
        label: String,
        value: VarId,
    },

    #[error("resume point '{label}' has frame layout {existing:?}, requested again as {requested:?}")]
    InconsistentFrameType {
        label: String,
        existing: Vec<StorageClass>,
        requested: Vec<StorageClass>,
    },

    #[error("resume point label '{0}' is never defined")]
    UnknownLabel(String),

    #[error("resume point label '{label}' is defined twice (in {first} and {second})")]
    DuplicateLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("{function}: misplaced resume point: {reason}")]
    MisplacedResumePoint { function: String, reason: String },

    #[error("{function}: ill-formed frame: {reason}")]
    IllFormedFrame { function: String, reason: String },

    #[error("{function}: invalid graph: {reason}")]
    InvalidGraph { function: String, reason: String },
}

/// Internal runtime faults
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("restart index {0} is not in the resume table")]
    BadRestartIndex(usize),

    #[error("resume table has not been installed")]
    TableNotInstalled,

    #[error("unknown frame type {0}")]
    UnknownFrameType(u32),

    #[error("frame type mismatch: expected {expected}, found {found}")]
    FrameTypeMismatch { expected: String, found: String },

    #[error("frame has no field {0}")]
    MissingField(usize),

    #[error("pop from an empty frame chain")]
    EmptyChain,

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown host function '{0}'")]
    UnknownHost(String),

    #[error("{function} has no resume substate {substate}")]
    BadSubstate { function: String, substate: i64 },

    #[error("{function}: {reason}")]
    InvalidOperation { function: String, reason: String },

    #[error("undefined variable {0}")]
    UndefinedVariable(VarId),
}

/// Outcome of running a program that did not produce a value
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("uncaught exception {0}")]
    Uncaught(Rc<Exception>),

    #[error(transparent)]
    Fault(#[from] RuntimeError),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::UncoveredValue {
            function: "f".into(),
            label: "resume_f".into(),
            value: VarId(3),
        };
        assert_eq!(
            err.to_string(),
            "f: v3 is needed after resume point 'resume_f' but is not saved by it"
        );
    }

    #[test]
    fn test_exec_error_from_fault() {
        let err: ExecError = RuntimeError::EmptyChain.into();
        assert!(matches!(err, ExecError::Fault(RuntimeError::EmptyChain)));
        assert_eq!(err.to_string(), "pop from an empty frame chain");
    }
}
