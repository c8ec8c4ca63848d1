//! `stackless table`: resume table and frame layouts of a transformed program

use std::path::Path;
use termcolor::ColorChoice;

use stackless_engine::Config;

use crate::output::StyledOutput;

pub fn execute(file: &Path, config: &Config, color: ColorChoice) -> anyhow::Result<()> {
    let transformed = super::load_transformed(file, config)?;
    let mut out = StyledOutput::new(color);

    out.heading("resume table");
    out.plain(&transformed.table.to_string());
    out.newline();

    out.heading("frame types");
    for (id, layout) in transformed.layouts.iter().enumerate() {
        out.field(&format!("#{}", id), format!("{}  {}", layout, layout.save_routine_name()));
    }

    super::transform::print_stats(&mut out, &transformed.stats);
    out.flush();
    Ok(())
}
