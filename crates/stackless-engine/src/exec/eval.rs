//! Operation and exit evaluation

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::Machine;
use crate::error::RuntimeError;
use crate::ir::{
    BinaryOp, Block, Callee, Catch, Constant, Exit, Function, FunctionId, Link, Op, OpKind,
    Operand, UnaryOp, VarId,
};
use crate::runtime::{call_builtin, with_state, Raise, SignalKind};
use crate::value::{Exception, GcObject, GcRef, Value};

/// Kind of the exception raised by integer division by zero
pub const ZERO_DIVISION: &str = "ZeroDivisionError";

type Env = FxHashMap<VarId, Value>;

fn constant(c: &Constant) -> Value {
    match c {
        Constant::Void => Value::Void,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Char(c) => Value::Char(*c),
        Constant::I32(v) => Value::I32(*v),
        Constant::I64(v) => Value::I64(*v),
        Constant::U64(v) => Value::U64(*v),
        Constant::I128(v) => Value::I128(*v),
        Constant::F64(v) => Value::F64(*v),
        Constant::Addr(a) => Value::Addr(*a),
        Constant::Null => Value::null(),
    }
}

fn operand(env: &Env, op: &Operand, caught: Option<&Value>) -> Result<Value, RuntimeError> {
    match op {
        Operand::Var(id) => env.get(id).cloned().ok_or(RuntimeError::UndefinedVariable(*id)),
        Operand::Const(c) => Ok(constant(c)),
        Operand::Caught => caught.cloned().ok_or_else(|| RuntimeError::InvalidOperation {
            function: String::new(),
            reason: "caught value read outside an exception edge".to_string(),
        }),
    }
}

fn operands(env: &Env, ops: &[Operand]) -> Result<Vec<Value>, RuntimeError> {
    ops.iter().map(|o| operand(env, o, None)).collect()
}

fn catches(catch: &Catch, raise: &Raise) -> bool {
    match (catch, raise) {
        (Catch::Unwind, Raise::Signal(signal)) => matches!(signal.kind(), SignalKind::Unwind),
        (Catch::Kind(kind), Raise::Exception(exception)) => exception.kind == *kind,
        (Catch::Any, Raise::Exception(_)) => true,
        _ => false,
    }
}

fn caught_value(raise: Raise) -> Value {
    match raise {
        Raise::Exception(exception) => Value::Ref(GcRef::Exception(exception)),
        Raise::Signal(signal) => Value::Ref(GcRef::Signal(signal)),
        // never matched by a handler
        Raise::Fault(_) => Value::Void,
    }
}

fn raise_value(value: Value) -> Raise {
    match value {
        Value::Ref(GcRef::Exception(exception)) => Raise::Exception(exception),
        Value::Ref(GcRef::Signal(signal)) => Raise::Signal(signal),
        other => Raise::Fault(RuntimeError::TypeMismatch {
            expected: "exception".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

fn zero_division() -> Raise {
    Raise::Exception(Exception::new(ZERO_DIVISION, Value::Void))
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, Raise> {
    let result = match (op, &value) {
        (UnaryOp::Neg, Value::I32(v)) => Value::I32(v.wrapping_neg()),
        (UnaryOp::Neg, Value::I64(v)) => Value::I64(v.wrapping_neg()),
        (UnaryOp::Neg, Value::I128(v)) => Value::I128(v.wrapping_neg()),
        (UnaryOp::Neg, Value::F64(v)) => Value::F64(-v),
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnaryOp::Not, Value::I64(v)) => Value::I64(!v),
        (UnaryOp::Not, Value::I32(v)) => Value::I32(!v),
        _ => {
            return Err(RuntimeError::TypeMismatch {
                expected: "numeric".to_string(),
                found: value.type_name().to_string(),
            }
            .into())
        }
    };
    Ok(result)
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Option<Value> {
    let result = match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        _ => return None,
    };
    Some(Value::Bool(result))
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Raise> {
    let mismatch = || -> Raise {
        RuntimeError::TypeMismatch {
            expected: format!("operands for {}", op.symbol()),
            found: format!("{} and {}", lhs.type_name(), rhs.type_name()),
        }
        .into()
    };

    match (&lhs, &rhs) {
        (Value::F64(a), Value::F64(b)) => {
            if let Some(result) = compare(op, a, b) {
                return Ok(result);
            }
            Ok(Value::F64(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return Err(mismatch()),
            }))
        }
        (Value::I128(a), Value::I128(b)) => {
            if let Some(result) = compare(op, a, b) {
                return Ok(result);
            }
            Ok(Value::I128(match op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                BinaryOp::Mul => a.wrapping_mul(*b),
                BinaryOp::Div | BinaryOp::Rem if *b == 0 => return Err(zero_division()),
                BinaryOp::Div => a.wrapping_div(*b),
                BinaryOp::Rem => a.wrapping_rem(*b),
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                _ => return Err(mismatch()),
            }))
        }
        (Value::Ref(a), Value::Ref(b)) => match op {
            BinaryOp::Eq => Ok(Value::Bool(a == b)),
            BinaryOp::Ne => Ok(Value::Bool(a != b)),
            _ => Err(mismatch()),
        },
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            _ => return Err(mismatch()),
        })),
        (Value::U64(a), Value::U64(b)) if op.is_comparison() => {
            compare(op, a, b).ok_or_else(mismatch)
        }
        _ => {
            let (Ok(a), Ok(b)) = (lhs.as_i64(), rhs.as_i64()) else {
                return Err(mismatch());
            };
            if let Some(result) = compare(op, a, b) {
                return Ok(result);
            }
            Ok(Value::I64(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(zero_division()),
                BinaryOp::Div => a.wrapping_div(b),
                BinaryOp::Rem => a.wrapping_rem(b),
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                _ => return Err(mismatch()),
            }))
        }
    }
}

fn object(value: &Value) -> Result<Rc<GcObject>, RuntimeError> {
    match value {
        Value::Ref(GcRef::Object(obj)) => Ok(obj.clone()),
        other => Err(RuntimeError::TypeMismatch {
            expected: "object".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

impl Machine {
    /// Run one graph call to its end, one native frame per call
    pub(crate) fn call(&self, id: FunctionId, args: Vec<Value>) -> Result<Value, Raise> {
        let func = self
            .program
            .function(id)
            .ok_or_else(|| RuntimeError::UnknownFunction(id.to_string()))?;
        let entry = func.entry_block().ok_or_else(|| RuntimeError::InvalidOperation {
            function: func.name.clone(),
            reason: "no entry block".to_string(),
        })?;
        if entry.params.len() != args.len() {
            return Err(RuntimeError::InvalidOperation {
                function: func.name.clone(),
                reason: format!("expected {} arguments, got {}", entry.params.len(), args.len()),
            }
            .into());
        }

        let mut env: Env = entry.params.iter().map(|p| p.id).zip(args).collect();
        let mut block = entry;

        loop {
            let raised = self.run_ops(func, block, &mut env)?;
            let (link, caught) = match self.exit(func, block, &env, raised)? {
                Flow::Jump(link, caught) => (link, caught),
                Flow::Return(value) => return Ok(value),
            };

            let target = func.block(link.target).ok_or_else(|| RuntimeError::InvalidOperation {
                function: func.name.clone(),
                reason: format!("missing block {}", link.target),
            })?;
            let values = link
                .args
                .iter()
                .map(|a| operand(&env, a, caught.as_ref()))
                .collect::<Result<Vec<_>, _>>()?;
            env = target.params.iter().map(|p| p.id).zip(values).collect();
            block = target;
        }
    }

    /// Run the operations of a block. A raise from the last operation of a
    /// block with a `Catch` exit is handed back for the exit to route.
    fn run_ops(&self, func: &Function, block: &Block, env: &mut Env) -> Result<Option<Raise>, Raise> {
        let guarded = matches!(block.exit, Exit::Catch { .. });
        let last = block.ops.len().checked_sub(1);
        for (i, op) in block.ops.iter().enumerate() {
            match self.eval_op(func, env, op) {
                Ok(value) => {
                    if let Some(var) = &op.result {
                        env.insert(var.id, value);
                    }
                }
                Err(raise) if guarded && Some(i) == last => return Ok(Some(raise)),
                Err(raise) => return Err(raise),
            }
        }
        Ok(None)
    }

    fn exit<'f>(
        &self,
        func: &Function,
        block: &'f Block,
        env: &Env,
        raised: Option<Raise>,
    ) -> Result<Flow<'f>, Raise> {
        let fault = |reason: String| -> Raise {
            RuntimeError::InvalidOperation {
                function: func.name.clone(),
                reason,
            }
            .into()
        };

        match &block.exit {
            Exit::Return(value) => Ok(Flow::Return(operand(env, value, None)?)),
            Exit::Raise(value) => Err(raise_value(operand(env, value, None)?)),
            Exit::Goto(link) => Ok(Flow::Jump(link, None)),
            Exit::Branch {
                cond,
                then_link,
                else_link,
            } => {
                let taken = if operand(env, cond, None)?.as_bool()? {
                    then_link
                } else {
                    else_link
                };
                Ok(Flow::Jump(taken, None))
            }
            Exit::Switch {
                value,
                cases,
                default,
            } => {
                let v = operand(env, value, None)?.as_i64()?;
                cases
                    .iter()
                    .find(|(case, _)| *case == v)
                    .map(|(_, link)| link)
                    .or(default.as_ref())
                    .map(|link| Flow::Jump(link, None))
                    .ok_or_else(|| fault(format!("no switch case for {} in {}", v, block.id)))
            }
            Exit::Catch { normal, handlers } => match raised {
                None => Ok(Flow::Jump(normal, None)),
                Some(raise) => match handlers.iter().find(|h| catches(&h.catch, &raise)) {
                    Some(handler) => Ok(Flow::Jump(&handler.link, Some(caught_value(raise)))),
                    None => Err(raise),
                },
            },
            Exit::Unreachable => Err(fault(format!("reached unreachable exit of {}", block.id))),
        }
    }

    fn eval_op(&self, func: &Function, env: &Env, op: &Op) -> Result<Value, Raise> {
        let result_type = op.result.as_ref().map(|v| &v.ty);
        let fault = |reason: &str| -> Raise {
            RuntimeError::InvalidOperation {
                function: func.name.clone(),
                reason: reason.to_string(),
            }
            .into()
        };

        let value = match &op.kind {
            OpKind::Const(c) => constant(c),
            OpKind::Copy(a) => operand(env, a, None)?,
            OpKind::Unary { op, operand: a } => unary(*op, operand(env, a, None)?)?,
            OpKind::Binary { op, lhs, rhs } => {
                binary(*op, operand(env, lhs, None)?, operand(env, rhs, None)?)?
            }
            OpKind::Cast(a) => {
                let value = operand(env, a, None)?;
                match result_type {
                    Some(ty) => value.convert(ty)?,
                    None => value,
                }
            }
            OpKind::Call { callee, args } => {
                let args = operands(env, args)?;
                match callee {
                    Callee::Function(name) => {
                        let id = self
                            .program
                            .function_id(name)
                            .ok_or_else(|| RuntimeError::UnknownFunction(name.clone()))?;
                        self.call(id, args)?
                    }
                    Callee::Host(name) => {
                        let host = self
                            .hosts
                            .get(name)
                            .ok_or_else(|| RuntimeError::UnknownHost(name.clone()))?;
                        host(&args)?
                    }
                    Callee::Builtin(builtin) => call_builtin(*builtin, &args)?,
                }
            }
            OpKind::NewObject { type_name, fields } => Value::Ref(GcRef::Object(Rc::new(GcObject {
                type_name: type_name.clone(),
                fields: RefCell::new(operands(env, fields)?),
            }))),
            OpKind::GetField { object: obj, index } => {
                let obj = object(&operand(env, obj, None)?)?;
                let field = obj.fields.borrow().get(*index).cloned();
                field.ok_or(RuntimeError::MissingField(*index))?
            }
            OpKind::SetField {
                object: obj,
                index,
                value,
            } => {
                let obj = object(&operand(env, obj, None)?)?;
                let value = operand(env, value, None)?;
                let mut fields = obj.fields.borrow_mut();
                let slot = fields
                    .get_mut(*index)
                    .ok_or(RuntimeError::MissingField(*index))?;
                *slot = value;
                Value::Void
            }
            OpKind::NewException { kind, payload } => Value::Ref(GcRef::Exception(Exception::new(
                kind.clone(),
                operand(env, payload, None)?,
            ))),
            OpKind::IsNull(a) => Value::Bool(operand(env, a, None)?.as_gc_ref()?.is_null()),

            OpKind::ResumePoint { .. }
            | OpKind::ResumeStateCreate { .. }
            | OpKind::ResumeStateInvoke { .. } => {
                return Err(fault("resume marker in an untransformed function"))
            }

            OpKind::ReadRestartSubstate => Value::I64(with_state(|s| s.restart_substate())),
            OpKind::ResetRestartSubstate => {
                with_state(|s| s.reset_restart_substate());
                Value::Void
            }
            OpKind::PopFrame { frame_type } => {
                Value::Ref(GcRef::Frame(with_state(|s| s.pop_typed(*frame_type))?))
            }
            OpKind::LoadField { frame, index } => {
                let frame = operand(env, frame, None)?
                    .as_frame()?
                    .ok_or(RuntimeError::EmptyChain)?;
                let field = frame.field(*index)?;
                match result_type {
                    Some(ty) => field.restore(ty)?,
                    None => field.clone(),
                }
            }
            OpKind::FetchReturn { class } => {
                let value =
                    with_state(|s| s.fetch_return(*class)).map_err(Raise::Exception)?;
                match result_type {
                    Some(ty) => value.restore(ty)?,
                    None => value,
                }
            }
            OpKind::SaveFrame {
                frame_type,
                restart,
                carrier,
                values,
                ..
            } => {
                let carrier = match operand(env, carrier, None)? {
                    Value::Ref(GcRef::Signal(signal)) => signal,
                    _ => return Err(fault("save routine called without an unwind signal")),
                };
                let values = operands(env, values)?;
                with_state(|s| s.save_frame(&carrier, *frame_type, *restart, &values))?;
                Value::Void
            }
            OpKind::BuildFrame {
                frame_type,
                restart,
                prev,
                values,
                ..
            } => {
                let restart = restart.ok_or_else(|| fault("frame built for an unresolved label"))?;
                let prev = operand(env, prev, None)?.as_frame()?;
                let values = operands(env, values)?;
                let record = with_state(|s| s.build_frame(*frame_type, restart, &values, prev))?;
                Value::Ref(GcRef::Frame(record))
            }
        };

        match (result_type, &op.kind) {
            (Some(ty), OpKind::Binary { .. }) => Ok(value.convert(ty)?),
            _ => Ok(value),
        }
    }
}

enum Flow<'f> {
    Jump(&'f Link, Option<Value>),
    Return(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_arithmetic() {
        assert_eq!(
            binary(BinaryOp::Add, Value::I64(2), Value::I64(3)).unwrap(),
            Value::I64(5)
        );
        assert_eq!(
            binary(BinaryOp::Lt, Value::F64(1.0), Value::F64(2.0)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(BinaryOp::Mul, Value::I32(4), Value::I64(5)).unwrap(),
            Value::I64(20)
        );
    }

    #[test]
    fn test_division_by_zero_raises() {
        let err = binary(BinaryOp::Div, Value::I64(1), Value::I64(0)).unwrap_err();
        assert!(matches!(err, Raise::Exception(ref e) if e.kind == ZERO_DIVISION));
    }

    #[test]
    fn test_catch_matching() {
        let exc = Raise::Exception(Exception::new("KeyError", Value::Void));
        assert!(catches(&Catch::Any, &exc));
        assert!(catches(&Catch::Kind("KeyError".into()), &exc));
        assert!(!catches(&Catch::Kind("ValueError".into()), &exc));
        assert!(!catches(&Catch::Unwind, &exc));
        assert!(!catches(&Catch::Any, &Raise::Fault(RuntimeError::EmptyChain)));
    }
}
