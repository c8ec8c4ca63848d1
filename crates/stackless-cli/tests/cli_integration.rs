//! Integration tests for the `stackless` binary.
//!
//! Programs are built with the engine's builder, written out as JSON and fed
//! to the binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use stackless_engine::ir::{BinaryOp, Builtin, Constant, Link, Operand};
use stackless_engine::{FunctionBuilder, Program, Type};

fn int(v: i64) -> Operand {
    Operand::Const(Constant::I64(v))
}

/// rec(n) = n + rec(n - 1), unwinding the whole chain at the bottom;
/// main(n) logs n before and after
fn recursive() -> Program {
    let mut program = Program::new("recursive");

    let mut b = FunctionBuilder::new("rec", vec![Type::I64], Type::I64);
    let n = b.params()[0];
    let (base, _) = b.create_block(&[]);
    let (step, step_params) = b.create_block(&[Type::I64]);
    let is_zero = b.binary(BinaryOp::Eq, n, int(0));
    b.branch(is_zero, Link::to(base), Link::new(step, vec![n.into()]));
    b.switch_to_block(base);
    b.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
    b.ret(int(0));
    b.switch_to_block(step);
    let n = step_params[0];
    let m = b.binary(BinaryOp::Sub, n, int(1));
    let r = b.call("rec", vec![m.into()], Type::I64);
    let s = b.binary(BinaryOp::Add, r, n);
    b.ret(s);
    program.add_function(b.build());

    let mut main = FunctionBuilder::new("main", vec![Type::I64], Type::I64);
    let n = main.params()[0];
    main.call_host("log", vec![n.into()], Type::Void);
    let r = main.call("rec", vec![n.into()], Type::I64);
    main.call_host("log", vec![r.into()], Type::Void);
    main.ret(r);
    program.add_function(main.build());

    program
}

fn write_program(dir: &Path, program: &Program) -> PathBuf {
    let path = dir.join(format!("{}.json", program.name));
    std::fs::write(&path, program.to_json().unwrap()).unwrap();
    path
}

fn stackless(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stackless"))
        .args(["--color", "never"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch stackless")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ────────────────────────────────────────────────────────────────────────────
// run
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_unwinds_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());

    let output = stackless(&["run", path.to_str().unwrap(), "--entry", "main", "10"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("log"), "stdout: {}", text);
    assert!(text.contains("10 55"), "stdout: {}", text);
    assert!(text.contains("result"), "stdout: {}", text);
}

#[test]
fn test_run_depth_limit_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());
    let config = dir.path().join("stackless.toml");
    std::fs::write(&config, "[runtime]\ndepth-limit = 5\n").unwrap();

    let output = stackless(&[
        "--config",
        config.to_str().unwrap(),
        "run",
        path.to_str().unwrap(),
        "10",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("StackOverflow"), "stderr: {}", stderr(&output));
}

#[test]
fn test_run_depth_limit_flag_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());
    let config = dir.path().join("stackless.toml");
    std::fs::write(&config, "[runtime]\ndepth-limit = 5\n").unwrap();

    let output = stackless(&[
        "--config",
        config.to_str().unwrap(),
        "--depth-limit",
        "1000",
        "run",
        path.to_str().unwrap(),
        "10",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn test_run_rejects_bad_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());

    let output = stackless(&["run", path.to_str().unwrap(), "ten"]);
    assert!(!output.status.success());

    let output = stackless(&["run", path.to_str().unwrap(), "--entry", "missing"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("missing"));
}

// ────────────────────────────────────────────────────────────────────────────
// transform / table
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_transform_prints_graphs_and_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());

    let output = stackless(&["transform", path.to_str().unwrap(), "--table"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("; program recursive"));
    assert!(text.contains("resume table"));
    assert!(text.contains("resume points"));
}

#[test]
fn test_transform_writes_loadable_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());
    let out = dir.path().join("out.json");

    let output = stackless(&[
        "transform",
        path.to_str().unwrap(),
        "--output",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = std::fs::read_to_string(&out).unwrap();
    let transformed = Program::from_json(&text).unwrap();
    assert_eq!(transformed.function_count(), 2);
    let rec = transformed.function_by_name("rec").unwrap();
    assert!(rec.blocks.len() > recursive().function_by_name("rec").unwrap().blocks.len());
}

#[test]
fn test_table_lists_frame_types() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());

    let output = stackless(&["--oracle", "all-calls", "table", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("frame types"));
    assert!(text.contains("save_state_"));
}

#[test]
fn test_unknown_oracle_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_program(dir.path(), &recursive());

    let output = stackless(&["--oracle", "sometimes", "table", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_file_is_reported() {
    let output = stackless(&["transform", "/nonexistent/program.json"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read"));
}
