//! Graph builder helpers
//!
//! Utilities for constructing flow graphs by hand, used by tests and by
//! hand-written runtime helpers.

use super::block::{BlockId, Catch, Exit, Handler, Link};
use super::function::Function;
use super::op::{BinaryOp, Builtin, Callee, Op, OpKind};
use super::types::{Constant, Operand, Type, Var, VarId};

/// Builder that simplifies graph construction
pub struct FunctionBuilder {
    func: Function,
    current_block: BlockId,
}

impl FunctionBuilder {
    /// Start a new function; the builder is positioned in its entry block
    pub fn new(name: impl Into<String>, params: Vec<Type>, result: Type) -> Self {
        let func = Function::new(name, params, result);
        let current_block = func.entry;
        Self { func, current_block }
    }

    /// Entry parameters as operands
    pub fn params(&self) -> Vec<VarId> {
        self.func.params().iter().map(|v| v.id).collect()
    }

    /// Switch to emitting into a different block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Create a new block with parameters of the given types
    pub fn create_block(&mut self, params: &[Type]) -> (BlockId, Vec<VarId>) {
        let vars: Vec<Var> = params.iter().map(|ty| self.func.new_var(ty.clone())).collect();
        let ids = vars.iter().map(|v| v.id).collect();
        (self.func.new_block(vars), ids)
    }

    /// Emit an operation with a result of type `ty` (no result for `Void`)
    pub fn emit(&mut self, kind: OpKind, ty: Type) -> VarId {
        let var = self.func.new_var(ty);
        let id = var.id;
        let result = if var.ty.is_void() { None } else { Some(var) };
        self.push(Op::new(kind, result));
        id
    }

    /// Emit an operation without a result
    pub fn emit_effect(&mut self, kind: OpKind) {
        self.push(Op::effect(kind));
    }

    fn push(&mut self, op: Op) {
        if let Some(block) = self.func.block_mut(self.current_block) {
            block.push(op);
        }
    }

    /// Set the exit of the current block
    pub fn terminate(&mut self, exit: Exit) {
        if let Some(block) = self.func.block_mut(self.current_block) {
            block.set_exit(exit);
        }
    }

    pub fn const_i64(&mut self, value: i64) -> VarId {
        self.emit(OpKind::Const(Constant::I64(value)), Type::I64)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> VarId {
        let ty = if op.is_comparison() { Type::Bool } else { Type::I64 };
        self.binary_typed(op, lhs, rhs, ty)
    }

    pub fn binary_typed(
        &mut self,
        op: BinaryOp,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
        ty: Type,
    ) -> VarId {
        self.emit(
            OpKind::Binary {
                op,
                lhs: lhs.into(),
                rhs: rhs.into(),
            },
            ty,
        )
    }

    /// Call another graph function
    pub fn call(&mut self, name: &str, args: Vec<Operand>, ty: Type) -> VarId {
        self.emit(
            OpKind::Call {
                callee: Callee::Function(name.to_string()),
                args,
            },
            ty,
        )
    }

    /// Call a host function
    pub fn call_host(&mut self, name: &str, args: Vec<Operand>, ty: Type) -> VarId {
        self.emit(
            OpKind::Call {
                callee: Callee::Host(name.to_string()),
                args,
            },
            ty,
        )
    }

    /// Call a runtime builtin
    pub fn call_builtin(&mut self, builtin: Builtin, args: Vec<Operand>, ty: Type) -> VarId {
        self.emit(
            OpKind::Call {
                callee: Callee::Builtin(builtin),
                args,
            },
            ty,
        )
    }

    /// Mark the preceding call as an explicit resume point
    pub fn resume_point(&mut self, label: &str, live: Vec<Operand>, returns: Option<VarId>) {
        self.emit_effect(OpKind::ResumePoint {
            label: label.to_string(),
            live,
            returns,
        });
    }

    /// Build a frame record for `label` in front of `prev` (null for none)
    pub fn resume_state_create(
        &mut self,
        prev: impl Into<Operand>,
        label: &str,
        values: Vec<Operand>,
    ) -> VarId {
        self.emit(
            OpKind::ResumeStateCreate {
                prev: prev.into(),
                label: label.to_string(),
                values,
            },
            Type::Ref("frame".to_string()),
        )
    }

    /// Resume a hand-built chain with a return value or an exception
    pub fn resume_state_invoke(
        &mut self,
        chain: impl Into<Operand>,
        returning: Option<Operand>,
        raising: Option<Operand>,
        ty: Type,
    ) -> VarId {
        self.emit(
            OpKind::ResumeStateInvoke {
                chain: chain.into(),
                returning,
                raising,
            },
            ty,
        )
    }

    pub fn new_exception(&mut self, kind: &str, payload: impl Into<Operand>) -> VarId {
        self.emit(
            OpKind::NewException {
                kind: kind.to_string(),
                payload: payload.into(),
            },
            Type::Ref("exception".to_string()),
        )
    }

    pub fn new_object(&mut self, type_name: &str, fields: Vec<Operand>) -> VarId {
        self.emit(
            OpKind::NewObject {
                type_name: type_name.to_string(),
                fields,
            },
            Type::Ref(type_name.to_string()),
        )
    }

    pub fn is_null(&mut self, value: impl Into<Operand>) -> VarId {
        self.emit(OpKind::IsNull(value.into()), Type::Bool)
    }

    pub fn ret(&mut self, value: impl Into<Operand>) {
        self.terminate(Exit::Return(value.into()));
    }

    pub fn ret_void(&mut self) {
        self.terminate(Exit::Return(Operand::Const(Constant::Void)));
    }

    pub fn goto(&mut self, target: BlockId, args: Vec<Operand>) {
        self.terminate(Exit::Goto(Link::new(target, args)));
    }

    pub fn branch(&mut self, cond: impl Into<Operand>, then_link: Link, else_link: Link) {
        self.terminate(Exit::Branch {
            cond: cond.into(),
            then_link,
            else_link,
        });
    }

    /// Guard the last call of the current block with exception handlers
    pub fn catch(&mut self, normal: Link, handlers: Vec<(Catch, Link)>) {
        self.terminate(Exit::Catch {
            normal,
            handlers: handlers
                .into_iter()
                .map(|(catch, link)| Handler { catch, link })
                .collect(),
        });
    }

    /// Mark the function as handling its own suspension
    pub fn explicit(&mut self) {
        self.func.explicit = true;
    }

    /// Finish building and return the function
    pub fn build(self) -> Function {
        self.func
    }
}
