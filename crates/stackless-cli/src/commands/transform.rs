//! `stackless transform`: rewrite a program and print or save it

use anyhow::Context;
use std::path::Path;
use termcolor::ColorChoice;

use stackless_engine::{Config, PrettyPrint, TransformStats};

use crate::output::StyledOutput;

pub fn execute(
    file: &Path,
    output: Option<&Path>,
    table: bool,
    config: &Config,
    color: ColorChoice,
) -> anyhow::Result<()> {
    let transformed = super::load_transformed(file, config)?;
    let mut out = StyledOutput::new(color);

    match output {
        Some(path) => {
            let json = transformed.program.to_json()?;
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            out.success("wrote ");
            out.plain(&path.display().to_string());
            out.newline();
        }
        None => out.plain(&transformed.program.pretty_print()),
    }

    print_stats(&mut out, &transformed.stats);
    if table {
        out.newline();
        out.heading("resume table");
        out.plain(&transformed.table.to_string());
    }
    out.flush();
    Ok(())
}

pub fn print_stats(out: &mut StyledOutput, stats: &TransformStats) {
    out.newline();
    out.heading("stats");
    out.field("functions", stats.functions);
    out.field("transformed", stats.transformed_functions);
    out.field("resume points", stats.resume_points);
    out.field("frame types", stats.frame_types);
}
