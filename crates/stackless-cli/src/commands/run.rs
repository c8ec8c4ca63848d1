//! `stackless run`: transform a program and call one of its functions
//!
//! Two host functions are available to programs:
//! - `print` writes its arguments to stdout, space separated
//! - `log` records integer arguments; the log is printed after the run

use anyhow::{anyhow, bail, Context};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use termcolor::ColorChoice;
use tracing::debug;

use stackless_engine::{Config, ExecError, Machine, Type, Value};

use crate::output::StyledOutput;

pub fn execute(
    file: &Path,
    entry: &str,
    args: &[String],
    config: &Config,
    color: ColorChoice,
) -> anyhow::Result<()> {
    let transformed = super::load_transformed(file, config)?;
    transformed.install();
    config.apply();

    let params: Vec<Type> = transformed
        .program
        .function_by_name(entry)
        .ok_or_else(|| anyhow!("no function named '{}'", entry))?
        .params()
        .iter()
        .map(|v| v.ty.clone())
        .collect();
    let values = parse_args(&params, args)?;
    debug!(entry, args = values.len(), "running");

    let log: Rc<RefCell<Vec<i64>>> = Rc::default();
    let sink = log.clone();
    let machine = Machine::new(transformed.program)
        .with_host("print", |args| {
            let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
            println!("{}", line.join(" "));
            Ok(Value::Void)
        })
        .with_host("log", move |args| {
            for arg in args {
                sink.borrow_mut().push(arg.as_i64()?);
            }
            Ok(Value::Void)
        });

    let mut out = StyledOutput::new(color);
    let result = machine.run(entry, values);
    if !log.borrow().is_empty() {
        let entries: Vec<String> = log.borrow().iter().map(|i| i.to_string()).collect();
        out.field("log", entries.join(" "));
    }

    match result {
        Ok(value) => {
            if value != Value::Void {
                out.field("result", &value);
            }
            out.flush();
            Ok(())
        }
        Err(err) => {
            out.error(&err.to_string());
            out.flush();
            match err {
                ExecError::Uncaught(exc) => bail!("{} terminated by uncaught {}", entry, exc),
                ExecError::Fault(fault) => Err(fault).context(format!("{} faulted", entry)),
            }
        }
    }
}

/// Parse command-line arguments by the entry's parameter types
pub fn parse_args(params: &[Type], args: &[String]) -> anyhow::Result<Vec<Value>> {
    if params.len() != args.len() {
        bail!("expected {} argument(s), got {}", params.len(), args.len());
    }
    params
        .iter()
        .zip(args)
        .map(|(ty, text)| parse_arg(ty, text))
        .collect()
}

fn parse_arg(ty: &Type, text: &str) -> anyhow::Result<Value> {
    let invalid = || format!("'{}' is not a valid {}", text, ty);
    let value = match ty {
        Type::Bool => Value::Bool(text.parse().with_context(invalid)?),
        Type::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Value::Char(c),
                _ => bail!(invalid()),
            }
        }
        Type::I32 => Value::I32(text.parse().with_context(invalid)?),
        Type::I64 => Value::I64(text.parse().with_context(invalid)?),
        Type::U64 => Value::U64(text.parse().with_context(invalid)?),
        Type::I128 => Value::I128(text.parse().with_context(invalid)?),
        Type::F64 => Value::F64(text.parse().with_context(invalid)?),
        Type::Addr => Value::Addr(text.parse().with_context(invalid)?),
        Type::Void | Type::Ref(_) | Type::Raw(_) => {
            bail!("parameters of type {} cannot be passed on the command line", ty)
        }
    };
    Ok(value)
}
