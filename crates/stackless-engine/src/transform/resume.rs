//! Save, resume and dispatch blocks
//!
//! For one suspend point (a call ending its block under a `Catch` exit):
//! - the save block receives the live values and the caught unwind signal,
//!   runs the frame type's save routine into the signal and re-raises it
//! - the resume block pops the record, reloads the values, fetches the
//!   call's result and continues along the original edges
//! - the dispatch block, new entry of the function, picks the original entry
//!   or a resume block from the restart substate

use crate::frame::{FrameCapture, FrameTypeId};
use crate::ir::{
    BlockId, Catch, Exit, Function, Handler, Link, Op, OpKind, Operand, Type, Var,
};
use crate::runtime::SENTINEL;

use super::split::{rename_link, Renaming};

/// Type of the variable holding a popped frame record
pub fn frame_type() -> Type {
    Type::Ref("frame".to_string())
}

/// Type of the variable holding a caught signal
pub fn signal_type() -> Type {
    Type::Ref("signal".to_string())
}

/// Build the save block for values `ordered` (already in field order) and
/// hook it to `block`'s exit as the first handler, catching only unwinding.
pub fn add_save_block(
    func: &mut Function,
    block: BlockId,
    ordered: &[Var],
    capture: &FrameCapture,
    restart: usize,
) -> Option<BlockId> {
    let values: Vec<Var> = ordered.iter().map(|v| func.copy_var(v)).collect();
    let carrier = func.new_var(signal_type());

    let mut params = values.clone();
    params.push(carrier.clone());
    let save = func.new_block(params);
    let save_block = func.block_mut(save)?;
    save_block.label = Some(format!("save_{}", restart));
    save_block.push(Op::effect(OpKind::SaveFrame {
        routine: capture.routine,
        frame_type: capture.frame_type,
        restart,
        carrier: Operand::Var(carrier.id),
        values: values.iter().map(Operand::from).collect(),
    }));
    save_block.set_exit(Exit::Raise(Operand::Var(carrier.id)));

    let args = ordered
        .iter()
        .map(Operand::from)
        .chain(std::iter::once(Operand::Caught))
        .collect();
    match &mut func.block_mut(block)?.exit {
        Exit::Catch { handlers, .. } => handlers.insert(
            0,
            Handler {
                catch: Catch::Unwind,
                link: Link::new(save, args),
            },
        ),
        _ => return None,
    }
    Some(save)
}

/// Build the resume block of the suspend point ending `block`.
///
/// `ordered` are the saved values in field order; `void_vars` are live
/// variables of type void, which are not saved and come back as constants.
pub fn add_resume_block(
    func: &mut Function,
    block: BlockId,
    ordered: &[Var],
    void_vars: &[Var],
    frame_type_id: FrameTypeId,
    restart: usize,
) -> Option<BlockId> {
    let source = func.block(block)?;
    let call_result = source.ops.last()?.result.clone();
    let (normal, handlers) = match &source.exit {
        Exit::Catch { normal, handlers } => (normal.clone(), handlers.clone()),
        _ => return None,
    };

    let frame = func.new_var(frame_type());
    let mut ops = vec![
        Op::effect(OpKind::ResetRestartSubstate),
        Op::new(
            OpKind::PopFrame {
                frame_type: frame_type_id,
            },
            Some(frame.clone()),
        ),
    ];

    let mut map = Renaming::default();
    for (index, var) in ordered.iter().enumerate() {
        let loaded = func.copy_var(var);
        ops.push(Op::new(
            OpKind::LoadField {
                frame: Operand::Var(frame.id),
                index,
            },
            Some(loaded.clone()),
        ));
        map.insert(var.id, Operand::Var(loaded.id));
    }
    for var in void_vars {
        map.insert(var.id, Operand::Const(crate::ir::Constant::Void));
    }

    // Always fetched: this is where an exception raised by the resumed
    // callee surfaces.
    match &call_result {
        Some(result) => {
            let fetched = func.copy_var(result);
            ops.push(Op::new(
                OpKind::FetchReturn {
                    class: result.ty.storage_class(),
                },
                Some(fetched.clone()),
            ));
            map.insert(result.id, Operand::Var(fetched.id));
        }
        None => ops.push(Op::effect(OpKind::FetchReturn { class: None })),
    }

    let mut normal = normal;
    rename_link(&mut normal, &map);
    let handlers: Vec<Handler> = handlers
        .into_iter()
        .filter(|h| h.catch != Catch::Unwind)
        .map(|mut h| {
            rename_link(&mut h.link, &map);
            h
        })
        .collect();

    let resume = func.new_block(Vec::new());
    let resume_block = func.block_mut(resume)?;
    resume_block.label = Some(format!("resume_{}", restart));
    resume_block.ops = ops;
    resume_block.exit = if handlers.is_empty() {
        Exit::Goto(normal)
    } else {
        Exit::Catch { normal, handlers }
    };
    Some(resume)
}

/// Prepend the dispatch block: sentinel goes to the original entry, every
/// other substate to its resume block.
pub fn insert_dispatch(func: &mut Function, resume_blocks: &[BlockId]) -> Option<BlockId> {
    let old_entry = func.entry;
    let old_params = func.params().to_vec();
    let params: Vec<Var> = old_params.iter().map(|v| func.copy_var(v)).collect();
    let substate = func.new_var(Type::I64);

    let mut cases = vec![(
        SENTINEL,
        Link::new(old_entry, params.iter().map(Operand::from).collect()),
    )];
    cases.extend(
        resume_blocks
            .iter()
            .enumerate()
            .map(|(k, &b)| (k as i64, Link::to(b))),
    );

    let dispatch = func.new_block(params);
    let dispatch_block = func.block_mut(dispatch)?;
    dispatch_block.label = Some("dispatch".to_string());
    dispatch_block.push(Op::new(OpKind::ReadRestartSubstate, Some(substate.clone())));
    dispatch_block.set_exit(Exit::Switch {
        value: Operand::Var(substate.id),
        cases,
        default: None,
    });
    func.entry = dispatch;
    Some(dispatch)
}
