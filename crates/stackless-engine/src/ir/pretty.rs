//! Pretty-printing for IR
//!
//! Provides human-readable output for debugging IR structures.

use super::block::Block;
use super::function::Function;
use super::op::{Op, OpKind};
use super::program::Program;
use super::types::Operand;
use std::fmt::Write;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for Program {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        writeln!(output, "; program {}", self.name).unwrap();
        writeln!(output).unwrap();

        for func in &self.functions {
            output.push_str(&func.pretty_print());
            writeln!(output).unwrap();
        }

        output
    }
}

impl PrettyPrint for Function {
    fn pretty_print(&self) -> String {
        let mut output = String::new();

        let params: Vec<String> = self.params().iter().map(|p| format!("{}", p)).collect();
        writeln!(
            output,
            "{}fn {}({}) -> {} {{",
            if self.explicit { "explicit " } else { "" },
            self.name,
            params.join(", "),
            self.result
        )
        .unwrap();

        // Entry block first, then the rest in order
        if let Some(entry) = self.entry_block() {
            output.push_str(&entry.pretty_print_indented(2, true));
        }
        for block in self.blocks.iter().filter(|b| b.id != self.entry) {
            output.push_str(&block.pretty_print_indented(2, false));
        }

        writeln!(output, "}}").unwrap();
        output
    }
}

impl Block {
    fn pretty_print_indented(&self, indent: usize, is_entry: bool) -> String {
        let mut output = String::new();
        let prefix = " ".repeat(indent);

        let params: Vec<String> = self.params.iter().map(|p| format!("{}", p)).collect();
        write!(output, "{}{}({}):", prefix, self.id, params.join(", ")).unwrap();
        if let Some(label) = &self.label {
            write!(output, " ; {}", label).unwrap();
        }
        if is_entry {
            write!(output, " ; entry").unwrap();
        }
        writeln!(output).unwrap();

        for op in &self.ops {
            writeln!(output, "{}  {}", prefix, op.pretty_print()).unwrap();
        }
        writeln!(output, "{}  {}", prefix, self.exit).unwrap();

        output
    }
}

fn join(operands: &[Operand]) -> String {
    operands
        .iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl PrettyPrint for Op {
    fn pretty_print(&self) -> String {
        let body = match &self.kind {
            OpKind::Const(c) => format!("const {}", c),
            OpKind::Copy(a) => format!("copy {}", a),
            OpKind::Unary { op, operand } => format!("{:?} {}", op, operand).to_lowercase(),
            OpKind::Binary { op, lhs, rhs } => format!("{} {} {}", lhs, op.symbol(), rhs),
            OpKind::Cast(a) => format!("cast {}", a),
            OpKind::Call { callee, args } => format!("call {}({})", callee, join(args)),
            OpKind::NewObject { type_name, fields } => {
                format!("new {} {{{}}}", type_name, join(fields))
            }
            OpKind::GetField { object, index } => format!("{}.{}", object, index),
            OpKind::SetField { object, index, value } => {
                format!("{}.{} = {}", object, index, value)
            }
            OpKind::NewException { kind, payload } => format!("exception {}({})", kind, payload),
            OpKind::IsNull(a) => format!("is_null {}", a),
            OpKind::ResumePoint { label, live, returns } => match returns {
                Some(r) => format!("resume_point {:?} [{}] returns {}", label, join(live), r),
                None => format!("resume_point {:?} [{}]", label, join(live)),
            },
            OpKind::ResumeStateCreate { prev, label, values } => {
                format!("resume_state_create {:?} prev={} [{}]", label, prev, join(values))
            }
            OpKind::ResumeStateInvoke { chain, returning, raising } => {
                let mut s = format!("resume_state_invoke {}", chain);
                if let Some(r) = returning {
                    write!(s, " returning={}", r).unwrap();
                }
                if let Some(r) = raising {
                    write!(s, " raising={}", r).unwrap();
                }
                s
            }
            OpKind::ReadRestartSubstate => "read_restart_substate".to_string(),
            OpKind::ResetRestartSubstate => "reset_restart_substate".to_string(),
            OpKind::PopFrame { frame_type } => format!("pop_frame {}", frame_type),
            OpKind::LoadField { frame, index } => format!("load_field {}[{}]", frame, index),
            OpKind::FetchReturn { class } => match class {
                Some(class) => format!("fetch_return {}", class),
                None => "fetch_return void".to_string(),
            },
            OpKind::SaveFrame { routine, frame_type, restart, carrier, values } => format!(
                "save_frame {} {} restart={} carrier={} [{}]",
                routine,
                frame_type,
                restart,
                carrier,
                join(values)
            ),
            OpKind::BuildFrame { label, frame_type, restart, prev, values } => {
                let restart = restart.map_or("?".to_string(), |r| r.to_string());
                format!(
                    "build_frame {:?} {} restart={} prev={} [{}]",
                    label,
                    frame_type,
                    restart,
                    prev,
                    join(values)
                )
            }
        };

        match &self.result {
            Some(var) => format!("{} = {}", var, body),
            None => body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::Exit;
    use crate::ir::op::{BinaryOp, Callee};
    use crate::ir::types::{Constant, Type};

    #[test]
    fn test_pretty_print_function() {
        let mut func = Function::new("inc", vec![Type::I64], Type::I64);
        let x = func.params()[0].id;
        let y = func.new_var(Type::I64);
        let entry = func.entry;
        let block = func.block_mut(entry).unwrap();
        block.push(Op::new(
            OpKind::Binary {
                op: BinaryOp::Add,
                lhs: Operand::Var(x),
                rhs: Operand::Const(Constant::I64(1)),
            },
            Some(y.clone()),
        ));
        block.set_exit(Exit::Return(Operand::Var(y.id)));

        let output = func.pretty_print();
        assert!(output.contains("fn inc(v0:i64) -> i64 {"));
        assert!(output.contains("bb0(v0:i64): ; entry"));
        assert!(output.contains("v1:i64 = v0 + 1"));
        assert!(output.contains("return v1"));
    }

    #[test]
    fn test_pretty_print_call() {
        let op = Op::effect(OpKind::Call {
            callee: Callee::Host("print".into()),
            args: vec![Operand::Const(Constant::I64(3))],
        });
        assert_eq!(op.pretty_print(), "call host:print(3)");
    }
}
