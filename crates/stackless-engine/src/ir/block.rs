//! Basic Blocks and Control Flow
//!
//! Blocks take parameters and pass values to their successors through link
//! arguments; nothing else crosses a block boundary.

use serde::{Deserialize, Serialize};

use super::op::Op;
use super::types::{Operand, Var, VarId};

/// Basic block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Control-flow edge carrying the target block's arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub target: BlockId,
    pub args: Vec<Operand>,
}

impl Link {
    pub fn new(target: BlockId, args: Vec<Operand>) -> Self {
        Self { target, args }
    }

    /// Link without arguments
    pub fn to(target: BlockId) -> Self {
        Self { target, args: Vec::new() }
    }

    /// Variables passed along this link
    pub fn used_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.args.iter().filter_map(|a| a.as_var())
    }
}

/// What an exception edge catches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Catch {
    /// The unwind signal only
    Unwind,
    /// Ordinary exceptions of the named kind
    Kind(String),
    /// Any ordinary exception (never a signal)
    Any,
}

/// Exception edge of a `Catch` exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    pub catch: Catch,
    pub link: Link,
}

/// How a block exits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Exit {
    Return(Operand),
    /// Raise an exception object (or re-raise a caught signal)
    Raise(Operand),
    Goto(Link),
    Branch {
        cond: Operand,
        then_link: Link,
        else_link: Link,
    },
    /// Exact-match switch on an integer; no match and no default is a fault
    Switch {
        value: Operand,
        cases: Vec<(i64, Link)>,
        default: Option<Link>,
    },
    /// Guards the last operation of the block: `normal` when it completes,
    /// the first matching handler when it raises, propagation otherwise.
    Catch {
        normal: Link,
        handlers: Vec<Handler>,
    },
    Unreachable,
}

impl Exit {
    /// All outgoing links, normal edge first
    pub fn links(&self) -> Vec<&Link> {
        match self {
            Exit::Return(_) | Exit::Raise(_) | Exit::Unreachable => Vec::new(),
            Exit::Goto(link) => vec![link],
            Exit::Branch { then_link, else_link, .. } => vec![then_link, else_link],
            Exit::Switch { cases, default, .. } => {
                cases.iter().map(|(_, l)| l).chain(default.iter()).collect()
            }
            Exit::Catch { normal, handlers } => {
                std::iter::once(normal).chain(handlers.iter().map(|h| &h.link)).collect()
            }
        }
    }

    pub fn links_mut(&mut self) -> Vec<&mut Link> {
        match self {
            Exit::Return(_) | Exit::Raise(_) | Exit::Unreachable => Vec::new(),
            Exit::Goto(link) => vec![link],
            Exit::Branch { then_link, else_link, .. } => vec![then_link, else_link],
            Exit::Switch { cases, default, .. } => cases
                .iter_mut()
                .map(|(_, l)| l)
                .chain(default.iter_mut())
                .collect(),
            Exit::Catch { normal, handlers } => std::iter::once(normal)
                .chain(handlers.iter_mut().map(|h| &mut h.link))
                .collect(),
        }
    }

    /// Operands read by the exit itself (condition, switch value, returned value)
    pub fn condition_operands(&self) -> Vec<&Operand> {
        match self {
            Exit::Return(op) | Exit::Raise(op) => vec![op],
            Exit::Branch { cond, .. } => vec![cond],
            Exit::Switch { value, .. } => vec![value],
            Exit::Goto(_) | Exit::Catch { .. } | Exit::Unreachable => Vec::new(),
        }
    }

    pub fn condition_operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Exit::Return(op) | Exit::Raise(op) => vec![op],
            Exit::Branch { cond, .. } => vec![cond],
            Exit::Switch { value, .. } => vec![value],
            Exit::Goto(_) | Exit::Catch { .. } | Exit::Unreachable => Vec::new(),
        }
    }

    /// Every variable the exit reads, including link arguments
    pub fn used_vars(&self) -> Vec<VarId> {
        let mut vars: Vec<VarId> = self
            .condition_operands()
            .into_iter()
            .filter_map(|o| o.as_var())
            .collect();
        for link in self.links() {
            vars.extend(link.used_vars());
        }
        vars
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.links().into_iter().map(|l| l.target).collect()
    }
}

/// A basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Optional label for debugging
    #[serde(default)]
    pub label: Option<String>,
    pub params: Vec<Var>,
    pub ops: Vec<Op>,
    pub exit: Exit,
}

impl Block {
    pub fn new(id: BlockId, params: Vec<Var>) -> Self {
        Self {
            id,
            label: None,
            params,
            ops: Vec::new(),
            exit: Exit::Unreachable,
        }
    }

    pub fn with_label(id: BlockId, label: impl Into<String>, params: Vec<Var>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(id, params)
        }
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn set_exit(&mut self, exit: Exit) {
        self.exit = exit;
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self.exit, Exit::Unreachable)
    }

    pub fn successors(&self) -> Vec<BlockId> {
        self.exit.successors()
    }

    /// Look up the definition of a variable inside this block
    pub fn var(&self, id: VarId) -> Option<&Var> {
        self.params
            .iter()
            .chain(self.ops.iter().filter_map(|op| op.result.as_ref()))
            .find(|v| v.id == id)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.target)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl std::fmt::Display for Catch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Catch::Unwind => write!(f, "unwind"),
            Catch::Kind(kind) => write!(f, "{}", kind),
            Catch::Any => write!(f, "*"),
        }
    }
}

impl std::fmt::Display for Exit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exit::Return(value) => write!(f, "return {}", value),
            Exit::Raise(value) => write!(f, "raise {}", value),
            Exit::Goto(link) => write!(f, "goto {}", link),
            Exit::Branch { cond, then_link, else_link } => {
                write!(f, "branch {} ? {} : {}", cond, then_link, else_link)
            }
            Exit::Switch { value, cases, default } => {
                write!(f, "switch {} [", value)?;
                for (i, (case, link)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} => {}", case, link)?;
                }
                match default {
                    Some(link) => write!(f, ", _ => {}]", link),
                    None => write!(f, "]"),
                }
            }
            Exit::Catch { normal, handlers } => {
                write!(f, "catch {}", normal)?;
                for handler in handlers {
                    write!(f, " | {} => {}", handler.catch, handler.link)?;
                }
                Ok(())
            }
            Exit::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{Constant, Type};

    #[test]
    fn test_block_new() {
        let block = Block::new(BlockId(0), vec![]);
        assert_eq!(block.id, BlockId(0));
        assert!(block.ops.is_empty());
        assert!(!block.is_terminated());
    }

    #[test]
    fn test_exit_successors() {
        let exit = Exit::Catch {
            normal: Link::to(BlockId(1)),
            handlers: vec![Handler {
                catch: Catch::Any,
                link: Link::new(BlockId(2), vec![Operand::Caught]),
            }],
        };
        assert_eq!(exit.successors(), vec![BlockId(1), BlockId(2)]);

        let ret = Exit::Return(Operand::Const(Constant::Void));
        assert!(ret.successors().is_empty());
    }

    #[test]
    fn test_exit_used_vars() {
        let exit = Exit::Branch {
            cond: Operand::Var(VarId(0)),
            then_link: Link::new(BlockId(1), vec![Operand::Var(VarId(1))]),
            else_link: Link::new(BlockId(2), vec![Operand::Const(Constant::I64(0))]),
        };
        assert_eq!(exit.used_vars(), vec![VarId(0), VarId(1)]);
    }

    #[test]
    fn test_block_var_lookup() {
        let block = Block::new(BlockId(0), vec![Var::new(VarId(5), Type::F64)]);
        assert_eq!(block.var(VarId(5)).map(|v| v.ty.clone()), Some(Type::F64));
        assert!(block.var(VarId(6)).is_none());
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(format!("{}", Exit::Goto(Link::to(BlockId(1)))), "goto bb1()");
        let switch = Exit::Switch {
            value: Operand::Var(VarId(0)),
            cases: vec![(-1, Link::to(BlockId(1)))],
            default: None,
        };
        assert_eq!(format!("{}", switch), "switch v0 [-1 => bb1()]");
    }
}
