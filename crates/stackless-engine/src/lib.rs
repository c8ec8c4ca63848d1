//! Stackless Engine
//!
//! Suspension and resumption of whole call chains on top of a flow-graph IR
//! with no native way to capture a stack:
//! - **IR**: typed flow graphs with block-local variables (`ir` module)
//! - **Frames**: frame types interned by storage classes, heap frame records
//!   and chains (`frame` module)
//! - **Transform**: rewrites every function so suspend-capable calls save
//!   their live values and can be re-entered (`transform` module)
//! - **Runtime**: per-thread state, resume table, builtins and the
//!   trampoline (`runtime` module)
//! - **Exec**: a reference executor for transformed graphs (`exec` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use stackless_engine::{transform, Config, Machine, Program, Value};
//!
//! let program = Program::from_json(&std::fs::read_to_string("prog.json")?)?;
//! let transformed = transform(program, &Config::default())?;
//! transformed.install();
//!
//! let machine = Machine::new(transformed.program);
//! let result = machine.run("main", vec![Value::I64(41)])?;
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Flow-graph IR consumed and rewritten by the transformer
pub mod ir;

/// Runtime values and GC references
pub mod value;

/// Frame types and frame records
pub mod frame;

/// Graph transformer and suspend oracles
pub mod transform;

/// Runtime state, resume table, builtins and trampoline
pub mod runtime;

/// Reference executor
pub mod exec;

pub mod config;
pub mod error;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{Config, RuntimeConfig, TransformConfig};
pub use error::{ConfigError, ExecError, RuntimeError, TransformError};
pub use exec::{HostFn, Machine};
pub use frame::{FrameLayout, FrameRecord, FrameRef, FrameTypeId, FrameTyper};
pub use ir::{Function, FunctionBuilder, PrettyPrint, Program, StorageClass, Type};
pub use runtime::{with_state, ResumeTable};
pub use transform::{
    transform_program, OracleKind, StacklessTransformer, SuspendOracle, TransformStats,
    Transformed,
};
pub use value::{Exception, GcRef, Value};

/// Transform `program` with the oracle selected by `config`
pub fn transform(program: Program, config: &Config) -> Result<Transformed, TransformError> {
    let oracle = config.transform.oracle.build(&program);
    transform_program(program, oracle.as_ref())
}
