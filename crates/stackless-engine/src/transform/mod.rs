//! Stackless transform
//!
//! Rewrites every function so that a call which may have to suspend the
//! whole call chain can save the caller's live values into a heap frame
//! record and later be re-entered at the same point with those values back.
//!
//! Per function:
//! 1. split blocks so every suspend point is a call ending its block
//! 2. give each suspend point a restart index, a save block and a resume block
//! 3. prepend a dispatch block that routes resumed calls to their resume block
//!
//! Hand-written `resume_state_create` ops are lowered up front and get their
//! restart index once every function has been transformed. Functions marked
//! `explicit` keep their graph: they read and reset the restart substate
//! themselves.

pub mod oracle;
pub mod resume;
pub mod split;

use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::TransformError;
use crate::frame::{FrameLayout, FrameTypeId, FrameTyper};
use crate::ir::{
    Block, BlockId, Builtin, Callee, Constant, Exit, Function, FunctionId, Op, OpKind, Operand,
    Program, StorageClass, Type, Var,
};
use crate::runtime::{with_state, FuncAddr, ResumeTable, Signature};

pub use oracle::{AllCalls, CallGraphOracle, NoCalls, OracleKind, SuspendOracle};

/// A transformed program together with what startup code must install
#[derive(Debug, Clone)]
pub struct Transformed {
    pub program: Program,
    pub table: Rc<ResumeTable>,
    pub layouts: Rc<[FrameLayout]>,
    pub stats: TransformStats,
}

impl Transformed {
    /// Install the resume table and frame layouts into this thread's state
    pub fn install(&self) {
        with_state(|s| s.install(self.table.clone(), self.layouts.clone()));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub functions: usize,
    pub transformed_functions: usize,
    pub resume_points: usize,
    pub frame_types: usize,
}

/// A hand-written resume point marker attached to a suspend point
#[derive(Debug, Clone)]
struct Marker {
    label: String,
    live: Vec<Var>,
    /// Void values read after the marker; rebuilt rather than saved
    void: Vec<Var>,
}

#[derive(Debug, Clone)]
struct Site {
    block: BlockId,
    marker: Option<Marker>,
}

#[derive(Debug, Clone)]
struct LabelInfo {
    function: String,
    restart: usize,
    frame_type: FrameTypeId,
}

/// Whole-program transformer
pub struct StacklessTransformer<'o> {
    oracle: &'o dyn SuspendOracle,
    typer: FrameTyper,
    table: ResumeTable,
    labels: FxHashMap<String, LabelInfo>,
    stats: TransformStats,
}

/// Transform `program`, asking `oracle` which calls may suspend
pub fn transform_program(
    program: Program,
    oracle: &dyn SuspendOracle,
) -> Result<Transformed, TransformError> {
    StacklessTransformer::new(oracle).transform(program)
}

fn invalid(func: &Function, reason: impl Into<String>) -> TransformError {
    TransformError::InvalidGraph {
        function: func.name.clone(),
        reason: reason.into(),
    }
}

fn ill_formed(func: &Function, reason: impl Into<String>) -> TransformError {
    TransformError::IllFormedFrame {
        function: func.name.clone(),
        reason: reason.into(),
    }
}

fn misplaced(func: &Function, reason: impl Into<String>) -> TransformError {
    TransformError::MisplacedResumePoint {
        function: func.name.clone(),
        reason: reason.into(),
    }
}

fn operand_type(block: &Block, operand: &Operand) -> Option<Type> {
    match operand {
        Operand::Var(id) => block.var(*id).map(|v| v.ty.clone()),
        Operand::Const(c) => Some(c.ty()),
        Operand::Caught => None,
    }
}

impl<'o> StacklessTransformer<'o> {
    pub fn new(oracle: &'o dyn SuspendOracle) -> Self {
        Self {
            oracle,
            typer: FrameTyper::new(),
            table: ResumeTable::new(),
            labels: FxHashMap::default(),
            stats: TransformStats::default(),
        }
    }

    pub fn transform(mut self, mut program: Program) -> Result<Transformed, TransformError> {
        for func in &program.functions {
            func.validate().map_err(|reason| invalid(func, reason))?;
        }

        for func in program.functions.iter_mut() {
            self.lower_markers(func)?;
        }

        let ids: Vec<FunctionId> = program.function_ids().collect();
        for id in ids {
            let Some(func) = program.function_mut(id) else {
                continue;
            };
            self.transform_function(id, func)?;
        }

        for func in program.functions.iter_mut() {
            self.patch_build_frames(func)?;
        }

        self.stats.functions = program.function_count();
        self.stats.frame_types = self.typer.type_count();
        debug!(
            functions = self.stats.functions,
            resume_points = self.stats.resume_points,
            frame_types = self.stats.frame_types,
            table_len = self.table.len(),
            "transformed program"
        );

        Ok(Transformed {
            program,
            table: Rc::new(self.table),
            layouts: Rc::from(self.typer.into_layouts()),
            stats: self.stats,
        })
    }

    /// Lower `resume_state_create` to `BuildFrame` and `resume_state_invoke`
    /// to a builtin call
    fn lower_markers(&mut self, func: &mut Function) -> Result<(), TransformError> {
        for b in 0..func.blocks.len() {
            for i in 0..func.blocks[b].ops.len() {
                let block = &func.blocks[b];
                let lowered = match &block.ops[i].kind {
                    OpKind::ResumeStateCreate {
                        prev,
                        label,
                        values,
                    } => {
                        let mut classes = Vec::with_capacity(values.len());
                        for value in values {
                            let class = operand_type(block, value)
                                .and_then(|ty| ty.storage_class())
                                .ok_or_else(|| {
                                    ill_formed(
                                        func,
                                        format!("resume_state_create '{}' saves {}", label, value),
                                    )
                                })?;
                            classes.push(class);
                        }
                        let capture = self.typer.ensure_type_for(label, &classes)?;
                        OpKind::BuildFrame {
                            label: label.clone(),
                            frame_type: capture.frame_type,
                            restart: None,
                            prev: prev.clone(),
                            values: capture.reorder(values),
                        }
                    }
                    OpKind::ResumeStateInvoke {
                        chain,
                        returning,
                        raising,
                    } => OpKind::Call {
                        callee: Callee::Builtin(Builtin::ResumeStateInvoke),
                        args: vec![
                            chain.clone(),
                            returning.clone().unwrap_or(Operand::Const(Constant::Void)),
                            raising.clone().unwrap_or(Operand::Const(Constant::Null)),
                        ],
                    },
                    _ => continue,
                };
                func.blocks[b].ops[i].kind = lowered;
            }
        }
        Ok(())
    }

    fn is_suspend_point(&self, func: &Function, block: &Block, index: usize) -> bool {
        let op = &block.ops[index];
        match &op.kind {
            OpKind::Call {
                callee: Callee::Builtin(_),
                ..
            } => true,
            OpKind::Call {
                callee: Callee::Function(_),
                ..
            } => {
                let marked = matches!(
                    block.ops.get(index + 1).map(|o| &o.kind),
                    Some(OpKind::ResumePoint { .. })
                );
                marked || self.oracle.may_suspend(func, op)
            }
            _ => false,
        }
    }

    /// Check a resume point marker following the call at `index` and
    /// resolve its live list
    fn check_marker(
        &self,
        func: &Function,
        block: &Block,
        index: usize,
        marker: &Op,
    ) -> Result<Marker, TransformError> {
        let OpKind::ResumePoint {
            label,
            live,
            returns,
        } = &marker.kind
        else {
            return Err(misplaced(func, "expected a resume point"));
        };
        let call_result = block.ops[index].result_id();

        if let Some(returns) = returns {
            if Some(*returns) != call_result {
                return Err(misplaced(
                    func,
                    format!("'{}' returns {}, which is not the call's result", label, returns),
                ));
            }
        }

        let mut vars = Vec::with_capacity(live.len());
        for operand in live {
            let Operand::Var(id) = operand else {
                return Err(ill_formed(
                    func,
                    format!("'{}' saves {}, which is not a variable", label, operand),
                ));
            };
            if Some(*id) == call_result {
                return Err(ill_formed(
                    func,
                    format!("'{}' saves {}, the result of its own call", label, id),
                ));
            }
            let defined = block
                .params
                .iter()
                .chain(block.ops[..index].iter().filter_map(|op| op.result.as_ref()))
                .find(|v| v.id == *id);
            let Some(var) = defined else {
                return Err(ill_formed(
                    func,
                    format!("'{}' saves {}, which is not defined before the call", label, id),
                ));
            };
            if var.ty.is_void() {
                return Err(ill_formed(
                    func,
                    format!("'{}' saves {}, which has no storage class", label, id),
                ));
            }
            vars.push(var.clone());
        }

        // Everything read after the marker must be saved by it
        let mut void = Vec::new();
        for needed in split::live_after(block, index + 1) {
            if Some(needed.id) == call_result || vars.iter().any(|v| v.id == needed.id) {
                continue;
            }
            if needed.ty.is_void() {
                void.push(needed);
                continue;
            }
            return Err(TransformError::UncoveredValue {
                function: func.name.clone(),
                label: label.clone(),
                value: needed.id,
            });
        }

        Ok(Marker {
            label: label.clone(),
            live: vars,
            void,
        })
    }

    /// Split blocks so that every suspend point is a call ending its block
    /// under a `Catch` exit
    fn split_suspend_points(&self, func: &mut Function) -> Result<Vec<Site>, TransformError> {
        let mut sites = Vec::new();
        let mut work: VecDeque<BlockId> = func.block_ids().into();

        while let Some(id) = work.pop_front() {
            let block = func
                .block(id)
                .ok_or_else(|| invalid(func, format!("missing block {}", id)))?;

            let mut found = None;
            for (i, op) in block.ops.iter().enumerate() {
                match &op.kind {
                    OpKind::ResumePoint { label, .. } => {
                        return Err(misplaced(
                            func,
                            format!("'{}' does not follow a call to a graph function", label),
                        ));
                    }
                    OpKind::Call { .. } if self.is_suspend_point(func, block, i) => {
                        found = Some(i);
                        break;
                    }
                    _ => {}
                }
            }
            let Some(index) = found else { continue };

            let marker = match block.ops.get(index + 1) {
                Some(op) if matches!(op.kind, OpKind::ResumePoint { .. }) => {
                    Some(self.check_marker(func, block, index, op)?)
                }
                _ => None,
            };
            if marker.is_some() {
                if let Some(block) = func.block_mut(id) {
                    block.ops.remove(index + 1);
                }
            }

            let block = func
                .block(id)
                .ok_or_else(|| invalid(func, format!("missing block {}", id)))?;
            let guarded = index + 1 == block.ops.len() && matches!(block.exit, Exit::Catch { .. });
            if !guarded {
                let carried = split::live_after(block, index);
                let cont = split::split_after(func, id, index, &carried)
                    .ok_or_else(|| invalid(func, format!("cannot split {}", id)))?;
                work.push_back(cont);
            }
            sites.push(Site { block: id, marker });
        }

        Ok(sites)
    }

    fn transform_function(&mut self, id: FunctionId, func: &mut Function) -> Result<(), TransformError> {
        if func.explicit {
            let marker = func.blocks.iter().flat_map(|b| &b.ops).find_map(|op| match &op.kind {
                OpKind::ResumePoint { label, .. } => Some(label.clone()),
                _ => None,
            });
            if let Some(label) = marker {
                return Err(misplaced(
                    func,
                    format!("'{}' is in a function that saves its own frames", label),
                ));
            }
            debug!(function = %func.name, "explicit function left untouched");
            return Ok(());
        }

        let sites = self.split_suspend_points(func)?;
        if sites.is_empty() {
            return Ok(());
        }

        let signature = Signature {
            params: func.param_types(),
            result: func.result.clone(),
        };

        let mut resume_blocks = Vec::with_capacity(sites.len());
        for (k, site) in sites.iter().enumerate() {
            let restart = if k == 0 {
                self.table.push_first(FuncAddr::Graph(id), signature.clone())
            } else {
                self.table.push_later(k)
            };
            let resume = self.build_site(func, site, restart)?;
            resume_blocks.push(resume);
        }

        resume::insert_dispatch(func, &resume_blocks)
            .ok_or_else(|| invalid(func, "cannot insert dispatch block"))?;

        self.stats.transformed_functions += 1;
        self.stats.resume_points += sites.len();
        debug!(
            function = %func.name,
            resume_points = sites.len(),
            blocks = func.block_count(),
            "transformed function"
        );
        Ok(())
    }

    /// Live values of an implicit suspend point: whatever its exit links
    /// pass on, except the call's own result
    fn implicit_live(func: &Function, block: &Block) -> Result<(Vec<Var>, Vec<Var>), TransformError> {
        let call_result = block.ops.last().and_then(|op| op.result_id());
        let mut live = Vec::new();
        let mut void = Vec::new();
        for id in split::link_vars(&block.exit) {
            if Some(id) == call_result {
                continue;
            }
            let var = block
                .var(id)
                .ok_or_else(|| invalid(func, format!("{} is not defined in {}", id, block.id)))?;
            if var.ty.is_void() {
                void.push(var.clone());
            } else {
                live.push(var.clone());
            }
        }
        Ok((live, void))
    }

    fn build_site(&mut self, func: &mut Function, site: &Site, restart: usize) -> Result<BlockId, TransformError> {
        let block = func
            .block(site.block)
            .ok_or_else(|| invalid(func, format!("missing block {}", site.block)))?;

        let (live, void) = match &site.marker {
            Some(marker) => (marker.live.clone(), marker.void.clone()),
            None => Self::implicit_live(func, block)?,
        };
        let classes: Vec<StorageClass> = live
            .iter()
            .map(|v| v.ty.storage_class())
            .collect::<Option<_>>()
            .ok_or_else(|| ill_formed(func, "void value in frame"))?;

        let capture = match &site.marker {
            Some(marker) => self.typer.ensure_type_for(&marker.label, &classes)?,
            None => self.typer.frame_type_for(&classes),
        };
        let ordered = capture.reorder(&live);

        resume::add_save_block(func, site.block, &ordered, &capture, restart)
            .ok_or_else(|| invalid(func, format!("{} has no catch exit", site.block)))?;
        let resume_block =
            resume::add_resume_block(func, site.block, &ordered, &void, capture.frame_type, restart)
                .ok_or_else(|| invalid(func, format!("{} has no catch exit", site.block)))?;

        if let Some(marker) = &site.marker {
            if let Some(existing) = self.labels.get(&marker.label) {
                return Err(TransformError::DuplicateLabel {
                    label: marker.label.clone(),
                    first: existing.function.clone(),
                    second: func.name.clone(),
                });
            }
            self.labels.insert(
                marker.label.clone(),
                LabelInfo {
                    function: func.name.clone(),
                    restart,
                    frame_type: capture.frame_type,
                },
            );
        }

        Ok(resume_block)
    }

    /// Fill in the restart index of every `BuildFrame`
    fn patch_build_frames(&self, func: &mut Function) -> Result<(), TransformError> {
        for block in func.blocks.iter_mut() {
            for op in block.ops.iter_mut() {
                if let OpKind::BuildFrame {
                    label,
                    frame_type,
                    restart,
                    ..
                } = &mut op.kind
                {
                    let info = self
                        .labels
                        .get(label.as_str())
                        .ok_or_else(|| TransformError::UnknownLabel(label.clone()))?;
                    debug_assert_eq!(info.frame_type, *frame_type);
                    *restart = Some(info.restart);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Catch, FunctionBuilder, Link, VarId};

    /// g(x) suspends through `stack_unwind`; f(x) = g(x) + x
    fn nested() -> Program {
        let mut program = Program::new("nested");

        let mut g = FunctionBuilder::new("g", vec![Type::I64], Type::I64);
        let x = g.params()[0];
        g.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
        let y = g.binary(BinaryOp::Add, x, Operand::Const(Constant::I64(1)));
        g.ret(y);
        program.add_function(g.build());

        let mut f = FunctionBuilder::new("f", vec![Type::I64], Type::I64);
        let x = f.params()[0];
        let r = f.call("g", vec![x.into()], Type::I64);
        let s = f.binary(BinaryOp::Add, r, x);
        f.ret(s);
        program.add_function(f.build());

        let mut pure = FunctionBuilder::new("pure", vec![], Type::I64);
        let one = pure.const_i64(1);
        pure.ret(one);
        program.add_function(pure.build());

        program
    }

    fn save_frames(func: &Function) -> Vec<(FrameTypeId, usize)> {
        func.blocks
            .iter()
            .flat_map(|b| &b.ops)
            .filter_map(|op| match &op.kind {
                OpKind::SaveFrame {
                    frame_type,
                    restart,
                    ..
                } => Some((*frame_type, *restart)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_transform_adds_dispatch_save_and_resume() {
        let transformed = transform_program(nested(), &CallGraphOracle::new(&nested())).unwrap();
        let f = transformed.program.function_by_name("f").unwrap();

        assert!(f.validate().is_ok());
        let entry = f.entry_block().unwrap();
        assert_eq!(entry.label.as_deref(), Some("dispatch"));
        assert!(matches!(entry.ops[0].kind, OpKind::ReadRestartSubstate));
        assert!(f.blocks.iter().any(|b| b.label.as_deref().is_some_and(|l| l.starts_with("resume_"))));

        // x is the only value f still needs after the call
        let saves = save_frames(f);
        assert_eq!(saves.len(), 1);
        let layout = &transformed.layouts[saves[0].0 .0 as usize];
        assert_eq!(layout.classes(), vec![StorageClass::Int]);

        let stats = transformed.stats;
        assert_eq!(stats.functions, 3);
        assert_eq!(stats.transformed_functions, 2);
        assert_eq!(stats.resume_points, 2);
        assert_eq!(transformed.table.len(), ResumeTable::builtin_count() + 2);
    }

    #[test]
    fn test_function_without_suspend_points_is_unchanged() {
        let before = nested().function_by_name("pure").unwrap().clone();
        let transformed = transform_program(nested(), &AllCalls).unwrap();
        let after = transformed.program.function_by_name("pure").unwrap();
        assert_eq!(after.block_count(), before.block_count());
        assert_eq!(after.entry, before.entry);
    }

    #[test]
    fn test_no_calls_oracle_only_splits_builtins() {
        let transformed = transform_program(nested(), &NoCalls).unwrap();
        assert_eq!(transformed.stats.transformed_functions, 1);
        let f = transformed.program.function_by_name("f").unwrap();
        assert!(save_frames(f).is_empty());
    }

    #[test]
    fn test_restart_indices_follow_sites() {
        let mut program = Program::new("two");
        let mut h = FunctionBuilder::new("h", vec![], Type::Void);
        h.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
        h.call_builtin(Builtin::StackUnwind, vec![], Type::Void);
        h.ret_void();
        program.add_function(h.build());

        let transformed = transform_program(program, &NoCalls).unwrap();
        let h = transformed.program.function_by_name("h").unwrap();
        let mut restarts: Vec<usize> = save_frames(h).iter().map(|s| s.1).collect();
        restarts.sort();
        let first = ResumeTable::builtin_count();
        assert_eq!(restarts, vec![first, first + 1]);

        let decoded = transformed.table.decode(first + 1).unwrap();
        assert_eq!(decoded.substate, 1);
    }

    #[test]
    fn test_explicit_function_is_left_alone() {
        let mut program = nested();
        let mut leaf = FunctionBuilder::new("leaf", vec![], Type::I64);
        leaf.explicit();
        let d = leaf.call_builtin(Builtin::StackFramesDepth, vec![], Type::I64);
        leaf.ret(d);
        let before = leaf.build();
        program.add_function(before.clone());

        let transformed = transform_program(program, &AllCalls).unwrap();
        let after = transformed.program.function_by_name("leaf").unwrap();
        assert!(after.explicit);
        assert_eq!(after.block_count(), before.block_count());
        assert_eq!(after.entry, before.entry);
        assert!(save_frames(after).is_empty());
        assert_eq!(transformed.stats.transformed_functions, 2);
    }

    fn marked(live: Vec<Operand>) -> Program {
        let mut program = Program::new("marked");
        let mut g = FunctionBuilder::new("g", vec![], Type::I64);
        let one = g.const_i64(1);
        g.ret(one);
        program.add_function(g.build());

        let mut f = FunctionBuilder::new("f", vec![Type::I64, Type::F64], Type::I64);
        let p = f.params();
        let r = f.call("g", vec![], Type::I64);
        f.resume_point("rp", live, Some(r));
        let s = f.binary(BinaryOp::Add, r, p[0]);
        f.ret(s);
        program.add_function(f.build());
        program
    }

    #[test]
    fn test_resume_point_registers_label() {
        let program = marked(vec![Operand::Var(VarId(1)), Operand::Var(VarId(0))]);
        let transformed = transform_program(program, &NoCalls).unwrap();
        let f = transformed.program.function_by_name("f").unwrap();
        assert!(f
            .blocks
            .iter()
            .flat_map(|b| &b.ops)
            .all(|op| !matches!(op.kind, OpKind::ResumePoint { .. })));
        let saves = save_frames(f);
        assert_eq!(saves.len(), 1);
        let layout = &transformed.layouts[saves[0].0 .0 as usize];
        assert_eq!(layout.classes(), vec![StorageClass::Int, StorageClass::Float]);
    }

    #[test]
    fn test_uncovered_value() {
        let program = marked(vec![Operand::Var(VarId(1))]);
        let err = transform_program(program, &NoCalls).unwrap_err();
        assert_eq!(
            err,
            TransformError::UncoveredValue {
                function: "f".into(),
                label: "rp".into(),
                value: VarId(0),
            }
        );
    }

    #[test]
    fn test_marker_rebuilds_void_values() {
        let mut program = marked(vec![Operand::Var(VarId(0)), Operand::Var(VarId(1))]);
        let mut f = FunctionBuilder::new("with_void", vec![Type::I64, Type::Void], Type::I64);
        let p = f.params();
        let r = f.call("g", vec![], Type::I64);
        f.resume_point("rp_void", vec![p[0].into()], Some(r));
        f.call_host("noop", vec![p[1].into()], Type::Void);
        let s = f.binary(BinaryOp::Add, r, p[0]);
        f.ret(s);
        program.add_function(f.build());

        let transformed = transform_program(program, &NoCalls).unwrap();
        let func = transformed.program.function_by_name("with_void").unwrap();
        assert!(func.validate().is_ok());

        let saves = save_frames(func);
        assert_eq!(saves.len(), 1);
        let layout = &transformed.layouts[saves[0].0 .0 as usize];
        assert_eq!(layout.classes(), vec![StorageClass::Int]);

        let resume = func
            .blocks
            .iter()
            .find(|b| b.label.as_deref().is_some_and(|l| l.starts_with("resume_")))
            .unwrap();
        match &resume.exit {
            Exit::Goto(link) => assert!(link
                .args
                .iter()
                .any(|a| matches!(a, Operand::Const(Constant::Void)))),
            other => panic!("unexpected resume exit {}", other),
        }
    }

    #[test]
    fn test_misplaced_resume_point() {
        let mut program = Program::new("bad");
        let mut f = FunctionBuilder::new("f", vec![], Type::Void);
        f.call_host("print", vec![], Type::Void);
        f.resume_point("rp", vec![], None);
        f.ret_void();
        program.add_function(f.build());

        let err = transform_program(program, &AllCalls).unwrap_err();
        assert!(matches!(err, TransformError::MisplacedResumePoint { .. }));
    }

    #[test]
    fn test_resume_point_in_explicit_function() {
        let mut program = marked(vec![Operand::Var(VarId(0)), Operand::Var(VarId(1))]);
        if let Some(f) = program.function_mut(FunctionId(1)) {
            f.explicit = true;
        }
        let err = transform_program(program, &NoCalls).unwrap_err();
        assert!(matches!(err, TransformError::MisplacedResumePoint { .. }));
    }

    #[test]
    fn test_returns_must_name_call_result() {
        let mut program = marked(vec![Operand::Var(VarId(0))]);
        let f = program.function_mut(FunctionId(1)).unwrap();
        for op in f.blocks.iter_mut().flat_map(|b| b.ops.iter_mut()) {
            if let OpKind::ResumePoint { returns, .. } = &mut op.kind {
                *returns = Some(VarId(0));
            }
        }
        let err = transform_program(program, &NoCalls).unwrap_err();
        assert!(matches!(err, TransformError::MisplacedResumePoint { .. }));
    }

    #[test]
    fn test_unknown_label() {
        let mut program = Program::new("unknown");
        let mut f = FunctionBuilder::new("f", vec![], Type::Void);
        f.resume_state_create(
            Operand::Const(Constant::Null),
            "nowhere",
            vec![Operand::Const(Constant::I64(1))],
        );
        f.ret_void();
        program.add_function(f.build());

        let err = transform_program(program, &NoCalls).unwrap_err();
        assert_eq!(err, TransformError::UnknownLabel("nowhere".into()));
    }

    #[test]
    fn test_inconsistent_frame_type() {
        let mut program = marked(vec![Operand::Var(VarId(0)), Operand::Var(VarId(1))]);
        let mut maker = FunctionBuilder::new("maker", vec![], Type::object());
        let chain = maker.resume_state_create(
            Operand::Const(Constant::Null),
            "rp",
            vec![
                Operand::Const(Constant::F64(1.0)),
                Operand::Const(Constant::I64(2)),
            ],
        );
        maker.ret(chain);
        program.add_function(maker.build());

        let err = transform_program(program, &NoCalls).unwrap_err();
        assert!(matches!(err, TransformError::InconsistentFrameType { ref label, .. } if label == "rp"));
    }

    #[test]
    fn test_duplicate_label() {
        let mut program = marked(vec![Operand::Var(VarId(0)), Operand::Var(VarId(1))]);
        let mut other = FunctionBuilder::new("other", vec![Type::I64, Type::F64], Type::I64);
        let p = other.params();
        let r = other.call("g", vec![], Type::I64);
        other.resume_point("rp", vec![p[0].into(), p[1].into()], Some(r));
        let s = other.binary(BinaryOp::Add, r, p[0]);
        other.ret(s);
        program.add_function(other.build());

        // same layout under both uses, so only the second definition fails
        let err = transform_program(program, &NoCalls).unwrap_err();
        assert_eq!(
            err,
            TransformError::DuplicateLabel {
                label: "rp".into(),
                first: "f".into(),
                second: "other".into(),
            }
        );
    }

    #[test]
    fn test_resume_state_create_is_patched() {
        let mut program = marked(vec![Operand::Var(VarId(0)), Operand::Var(VarId(1))]);
        let mut maker = FunctionBuilder::new("maker", vec![], Type::object());
        let chain = maker.resume_state_create(
            Operand::Const(Constant::Null),
            "rp",
            vec![
                Operand::Const(Constant::I64(2)),
                Operand::Const(Constant::F64(1.0)),
            ],
        );
        maker.ret(chain);
        program.add_function(maker.build());

        let transformed = transform_program(program, &NoCalls).unwrap();
        let f_restart = save_frames(transformed.program.function_by_name("f").unwrap())[0].1;
        let maker = transformed.program.function_by_name("maker").unwrap();
        let built = maker
            .blocks
            .iter()
            .flat_map(|b| &b.ops)
            .find_map(|op| match &op.kind {
                OpKind::BuildFrame { restart, .. } => *restart,
                _ => None,
            });
        assert_eq!(built, Some(f_restart));
    }

    #[test]
    fn test_marker_under_catch_keeps_handlers() {
        let mut program = marked(vec![Operand::Var(VarId(0))]);
        let mut f = FunctionBuilder::new("guarded", vec![Type::I64], Type::I64);
        let x = f.params()[0];
        let (join, join_params) = f.create_block(&[Type::I64]);
        let (handler, _) = f.create_block(&[]);
        let r = f.call("g", vec![], Type::I64);
        f.resume_point("rp_guarded", vec![x.into()], Some(r));
        f.catch(
            Link::new(join, vec![r.into()]),
            vec![(Catch::Kind("KeyError".into()), Link::to(handler))],
        );
        f.switch_to_block(join);
        f.ret(join_params[0]);
        f.switch_to_block(handler);
        f.ret(Operand::Const(Constant::I64(42)));
        program.add_function(f.build());

        let transformed = transform_program(program, &NoCalls).unwrap();
        let guarded = transformed.program.function_by_name("guarded").unwrap();
        assert!(guarded.validate().is_ok());

        let resume = guarded
            .blocks
            .iter()
            .find(|b| b.label.as_deref().is_some_and(|l| l.starts_with("resume_")))
            .unwrap();
        match &resume.exit {
            Exit::Catch { handlers, .. } => {
                assert_eq!(handlers.len(), 1);
                assert_eq!(handlers[0].catch, Catch::Kind("KeyError".into()));
            }
            other => panic!("unexpected resume exit {}", other),
        }
    }
}
