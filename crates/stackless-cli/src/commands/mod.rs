pub mod run;
pub mod table;
pub mod transform;

use anyhow::Context;
use std::path::Path;

use stackless_engine::{Config, Program, Transformed};

/// Read a program from its JSON form
pub fn load_program(path: &Path) -> anyhow::Result<Program> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Program::from_json(&text).with_context(|| format!("invalid program {}", path.display()))
}

/// Load and transform with the configured oracle
pub fn load_transformed(path: &Path, config: &Config) -> anyhow::Result<Transformed> {
    let program = load_program(path)?;
    let transformed = stackless_engine::transform(program, config)
        .with_context(|| format!("transform of {} failed", path.display()))?;
    Ok(transformed)
}
