//! IR Functions
//!
//! A function is an ordered list of blocks plus an entry block whose
//! parameters are the function parameters.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::block::{Block, BlockId, Exit};
use super::op::OpKind;
use super::types::{Type, Var, VarId};

/// An IR function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// Return type
    pub result: Type,
    /// Basic blocks (in order)
    pub blocks: Vec<Block>,
    /// Entry block ID
    pub entry: BlockId,
    /// Drives the resume protocol by hand; the transformer leaves it as is
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub explicit: bool,
    /// Block lookup map for fast access
    #[serde(skip)]
    block_map: FxHashMap<BlockId, usize>,
    #[serde(skip)]
    next_var: u32,
    #[serde(skip)]
    next_block: u32,
}

impl Function {
    /// Create a new function with an empty entry block taking `params`
    pub fn new(name: impl Into<String>, params: Vec<Type>, result: Type) -> Self {
        let mut func = Self {
            name: name.into(),
            result,
            blocks: Vec::new(),
            entry: BlockId(0),
            explicit: false,
            block_map: FxHashMap::default(),
            next_var: 0,
            next_block: 0,
        };
        let params: Vec<Var> = params.into_iter().map(|ty| func.new_var(ty)).collect();
        let entry = func.new_block(params);
        func.entry = entry;
        func
    }

    /// Rebuild the lookup map and id counters, e.g. after deserialization
    pub fn reindex(&mut self) {
        self.block_map = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id, i))
            .collect();
        self.next_block = self.blocks.iter().map(|b| b.id.0 + 1).max().unwrap_or(0);
        self.next_var = self
            .blocks
            .iter()
            .flat_map(|b| {
                b.params
                    .iter()
                    .map(|v| v.id.0)
                    .chain(b.ops.iter().filter_map(|op| op.result_id().map(|v| v.0)))
            })
            .map(|id| id + 1)
            .max()
            .unwrap_or(0);
    }

    /// Allocate a fresh variable
    pub fn new_var(&mut self, ty: Type) -> Var {
        let id = VarId(self.next_var);
        self.next_var += 1;
        Var::new(id, ty)
    }

    /// Fresh variable with the same type as `var`
    pub fn copy_var(&mut self, var: &Var) -> Var {
        self.new_var(var.ty.clone())
    }

    /// Create and add a new block, returning its ID
    pub fn new_block(&mut self, params: Vec<Var>) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.add_block(Block::new(id, params))
    }

    /// Add a basic block and return its ID
    pub fn add_block(&mut self, block: Block) -> BlockId {
        let id = block.id;
        self.next_block = self.next_block.max(id.0 + 1);
        let index = self.blocks.len();
        self.block_map.insert(id, index);
        self.blocks.push(block);
        id
    }

    /// Get a block by ID
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.block_map.get(&id).map(|&idx| &self.blocks[idx])
    }

    /// Get a mutable block by ID
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.block_map
            .get(&id)
            .copied()
            .map(|idx| &mut self.blocks[idx])
    }

    /// Get the entry block
    pub fn entry_block(&self) -> Option<&Block> {
        self.block(self.entry)
    }

    /// Parameter variables (the entry block's parameters)
    pub fn params(&self) -> &[Var] {
        self.entry_block().map(|b| b.params.as_slice()).unwrap_or(&[])
    }

    /// Parameter types
    pub fn param_types(&self) -> Vec<Type> {
        self.params().iter().map(|v| v.ty.clone()).collect()
    }

    /// Get all block IDs in order
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|b| b.id).collect()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Compute the total number of operations across all blocks
    pub fn op_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// Validate the function structure
    pub fn validate(&self) -> Result<(), String> {
        if self.blocks.is_empty() {
            return Err(format!("function {} has no blocks", self.name));
        }
        if self.block(self.entry).is_none() {
            return Err(format!("entry block {} does not exist", self.entry));
        }

        for block in &self.blocks {
            if !block.is_terminated() {
                return Err(format!("block {} is not terminated", block.id));
            }
            if let Exit::Catch { .. } = block.exit {
                // a resume point marker may sit between the call and the exit
                let guarded = block
                    .ops
                    .iter()
                    .rev()
                    .find(|op| !matches!(op.kind, OpKind::ResumePoint { .. }));
                if guarded.map_or(true, |op| !op.is_guardable()) {
                    return Err(format!(
                        "block {} has a catch exit but does not end with a call",
                        block.id
                    ));
                }
            }
            for link in block.exit.links() {
                let Some(target) = self.block(link.target) else {
                    return Err(format!(
                        "block {} references non-existent successor {}",
                        block.id, link.target
                    ));
                };
                if target.params.len() != link.args.len() {
                    return Err(format!(
                        "link {} -> {} passes {} arguments, target takes {}",
                        block.id,
                        link.target,
                        link.args.len(),
                        target.params.len()
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::Link;
    use crate::ir::types::{Constant, Operand};

    #[test]
    fn test_function_new() {
        let func = Function::new("test", vec![Type::I64, Type::F64], Type::Void);
        assert_eq!(func.name, "test");
        assert_eq!(func.block_count(), 1);
        assert_eq!(func.params().len(), 2);
        assert_eq!(func.param_types(), vec![Type::I64, Type::F64]);
    }

    #[test]
    fn test_function_validate() {
        let mut func = Function::new("test", vec![], Type::Void);
        assert!(func.validate().is_err());

        let entry = func.entry;
        func.block_mut(entry)
            .unwrap()
            .set_exit(Exit::Return(Operand::Const(Constant::Void)));
        assert!(func.validate().is_ok());
    }

    #[test]
    fn test_function_validate_missing_successor() {
        let mut func = Function::new("test", vec![], Type::Void);
        let entry = func.entry;
        func.block_mut(entry)
            .unwrap()
            .set_exit(Exit::Goto(Link::to(BlockId(999))));
        assert!(func.validate().is_err());
    }

    #[test]
    fn test_function_validate_arity() {
        let mut func = Function::new("test", vec![], Type::Void);
        let x = func.new_var(Type::I64);
        let target = func.new_block(vec![x]);
        let entry = func.entry;
        func.block_mut(entry)
            .unwrap()
            .set_exit(Exit::Goto(Link::to(target)));
        func.block_mut(target)
            .unwrap()
            .set_exit(Exit::Return(Operand::Const(Constant::Void)));
        let err = func.validate().unwrap_err();
        assert!(err.contains("passes 0 arguments"));
    }

    #[test]
    fn test_reindex_after_serde() {
        let mut func = Function::new("f", vec![Type::I64], Type::I64);
        let entry = func.entry;
        let param = func.params()[0].id;
        func.block_mut(entry)
            .unwrap()
            .set_exit(Exit::Return(Operand::Var(param)));

        let json = serde_json::to_string(&func).unwrap();
        let mut back: Function = serde_json::from_str(&json).unwrap();
        back.reindex();
        assert!(back.validate().is_ok());
        assert_eq!(back.new_var(Type::I64).id, VarId(1));
    }
}
