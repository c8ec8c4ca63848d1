//! IR Program
//!
//! Top-level container: every graph the whole-program transform sees.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::function::Function;

/// Function identifier (index into the program)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// A whole program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    /// Program name
    #[serde(default)]
    pub name: String,
    /// Functions in this program
    pub functions: Vec<Function>,
    /// Function lookup by name
    #[serde(skip)]
    function_map: FxHashMap<String, FunctionId>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            function_map: FxHashMap::default(),
        }
    }

    /// Parse a JSON-serialized program and rebuild its indices
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut program: Program = serde_json::from_str(text)?;
        program.reindex();
        Ok(program)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn reindex(&mut self) {
        self.function_map.clear();
        for (i, func) in self.functions.iter_mut().enumerate() {
            func.reindex();
            self.function_map.insert(func.name.clone(), FunctionId(i as u32));
        }
    }

    /// Add a function to the program
    pub fn add_function(&mut self, func: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.function_map.insert(func.name.clone(), id);
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    pub fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id.0 as usize)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.function_map
            .get(name)
            .and_then(|&id| self.function(id))
    }

    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.function_map.get(name).copied()
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        (0..self.functions.len() as u32).map(FunctionId)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Type;

    #[test]
    fn test_program_lookup() {
        let mut program = Program::new("p");
        let f = program.add_function(Function::new("f", vec![], Type::Void));
        let g = program.add_function(Function::new("g", vec![Type::I64], Type::I64));
        assert_eq!(program.function_id("f"), Some(f));
        assert_eq!(program.function_id("g"), Some(g));
        assert_eq!(program.function_by_name("g").map(|f| f.params().len()), Some(1));
        assert!(program.function_by_name("h").is_none());
    }

    #[test]
    fn test_program_json_roundtrip_rebuilds_map() {
        let mut program = Program::new("p");
        program.add_function(Function::new("main", vec![], Type::I64));
        let json = program.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back.function_id("main"), Some(FunctionId(0)));
    }
}
