//! Block splitting and liveness at a call
//!
//! Variables are local to their block, so what is live after an operation is
//! simply what the rest of the block reads, minus what the rest of the block
//! defines.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{Block, BlockId, Exit, Function, Link, Op, Operand, Var, VarId};

/// Variables defined at or before `index` that the rest of the block reads,
/// in definition order
pub fn live_after(block: &Block, index: usize) -> Vec<Var> {
    let tail = &block.ops[index + 1..];
    let defined_later: FxHashSet<VarId> = tail.iter().filter_map(|op| op.result_id()).collect();
    let used: FxHashSet<VarId> = tail
        .iter()
        .flat_map(|op| op.used_vars().collect::<Vec<_>>())
        .chain(block.exit.used_vars())
        .filter(|id| !defined_later.contains(id))
        .collect();

    block
        .params
        .iter()
        .chain(block.ops[..=index].iter().filter_map(|op| op.result.as_ref()))
        .filter(|v| used.contains(&v.id))
        .cloned()
        .collect()
}

/// Variables passed along the links of an exit, first appearance first
pub fn link_vars(exit: &Exit) -> Vec<VarId> {
    let mut seen = FxHashSet::default();
    exit.links()
        .into_iter()
        .flat_map(|link| link.used_vars().collect::<Vec<_>>())
        .filter(|id| seen.insert(*id))
        .collect()
}

pub type Renaming = FxHashMap<VarId, Operand>;

fn rename_operand(operand: &mut Operand, map: &Renaming) {
    if let Operand::Var(id) = operand {
        if let Some(new) = map.get(id) {
            *operand = new.clone();
        }
    }
}

pub fn rename_op(op: &mut Op, map: &Renaming) {
    for operand in op.operands_mut() {
        rename_operand(operand, map);
    }
    if let crate::ir::OpKind::ResumePoint { returns: Some(id), .. } = &mut op.kind {
        if let Some(Operand::Var(new)) = map.get(id) {
            *id = *new;
        }
    }
}

pub fn rename_link(link: &mut Link, map: &Renaming) {
    for arg in &mut link.args {
        rename_operand(arg, map);
    }
}

pub fn rename_exit(exit: &mut Exit, map: &Renaming) {
    for operand in exit.condition_operands_mut() {
        rename_operand(operand, map);
    }
    for link in exit.links_mut() {
        rename_link(link, map);
    }
}

/// Move everything after op `index` of `block` into a new block.
///
/// The new block takes fresh copies of `carried` as parameters; the old
/// block ends with a `Catch` exit (no handlers yet) whose normal link passes
/// `carried`. Returns the new block.
pub fn split_after(func: &mut Function, block: BlockId, index: usize, carried: &[Var]) -> Option<BlockId> {
    let params: Vec<Var> = carried.iter().map(|v| func.copy_var(v)).collect();
    let map: Renaming = carried
        .iter()
        .zip(&params)
        .map(|(old, new)| (old.id, Operand::Var(new.id)))
        .collect();

    let source = func.block_mut(block)?;
    let mut tail = source.ops.split_off(index + 1);
    let mut exit = std::mem::replace(&mut source.exit, Exit::Unreachable);
    let label = source.label.clone();

    for op in &mut tail {
        rename_op(op, &map);
    }
    rename_exit(&mut exit, &map);

    let cont = func.new_block(params);
    let target = func.block_mut(cont)?;
    target.ops = tail;
    target.exit = exit;
    target.label = label.map(|l| format!("{}.cont", l));

    let source = func.block_mut(block)?;
    source.exit = Exit::Catch {
        normal: Link::new(cont, carried.iter().map(Operand::from).collect()),
        handlers: Vec::new(),
    };
    Some(cont)
}
