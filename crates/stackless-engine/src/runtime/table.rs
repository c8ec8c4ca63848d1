//! Resume table
//!
//! Append-only array of restart descriptors. The first resume point of a
//! function stores the function and its signature; later points of the same
//! function store only their offset from it. Decoding an index walks back to
//! the nearest first entry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::ir::{Builtin, FunctionId, Type};

/// What a restart index resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncAddr {
    Graph(FunctionId),
    Builtin(Builtin),
}

impl fmt::Display for FuncAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncAddr::Graph(id) => write!(f, "{}", id),
            FuncAddr::Builtin(b) => write!(f, "builtin:{}", b.name()),
        }
    }
}

/// Signature identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureId(pub u32);

/// Parameter and result types of a resumable function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Type>,
    pub result: Type,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|t| t.to_string()).collect();
        write!(f, "({}) -> {}", params.join(", "), self.result)
    }
}

/// Restart descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartEntry {
    /// First resume point of a function
    First { func: FuncAddr, sig: SignatureId },
    /// Later resume point, `offset` entries after the function's first
    Later { offset: usize },
}

/// A decoded restart index
#[derive(Debug, Clone, Copy)]
pub struct Decoded<'a> {
    pub func: FuncAddr,
    pub substate: usize,
    pub signature: &'a Signature,
}

/// The resume table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeTable {
    entries: Vec<RestartEntry>,
    signatures: Vec<Signature>,
}

impl Default for ResumeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeTable {
    /// New table holding the builtin entries at fixed indices
    pub fn new() -> Self {
        let mut table = Self {
            entries: Vec::new(),
            signatures: Vec::new(),
        };
        for builtin in Builtin::ALL {
            let sig = Signature {
                params: Vec::new(),
                result: builtin_result(builtin),
            };
            table.push_first(FuncAddr::Builtin(builtin), sig);
            for offset in 1..builtin.resume_points() {
                table.push_later(offset);
            }
        }
        table
    }

    /// Restart index of a builtin's resume point
    pub fn builtin_index(builtin: Builtin, substate: usize) -> usize {
        let base: usize = Builtin::ALL
            .iter()
            .take_while(|&&b| b != builtin)
            .map(|b| b.resume_points())
            .sum();
        base + substate
    }

    /// First index available to graph functions
    pub fn builtin_count() -> usize {
        Builtin::ALL.iter().map(|b| b.resume_points()).sum()
    }

    fn intern_signature(&mut self, sig: Signature) -> SignatureId {
        if let Some(pos) = self.signatures.iter().position(|s| *s == sig) {
            return SignatureId(pos as u32);
        }
        self.signatures.push(sig);
        SignatureId(self.signatures.len() as u32 - 1)
    }

    /// Append the first resume point of a function
    pub fn push_first(&mut self, func: FuncAddr, sig: Signature) -> usize {
        let sig = self.intern_signature(sig);
        self.entries.push(RestartEntry::First { func, sig });
        self.entries.len() - 1
    }

    /// Append a later resume point of the function whose first entry was
    /// pushed most recently
    pub fn push_later(&mut self, offset: usize) -> usize {
        self.entries.push(RestartEntry::Later { offset });
        self.entries.len() - 1
    }

    /// Decode a restart index into function, substate and signature
    pub fn decode(&self, index: usize) -> Result<Decoded<'_>, RuntimeError> {
        let (first, substate) = match self.entries.get(index) {
            Some(RestartEntry::First { .. }) => (index, 0),
            Some(RestartEntry::Later { offset }) => {
                let first = index
                    .checked_sub(*offset)
                    .ok_or(RuntimeError::BadRestartIndex(index))?;
                (first, *offset)
            }
            None => return Err(RuntimeError::BadRestartIndex(index)),
        };
        match self.entries.get(first) {
            Some(RestartEntry::First { func, sig }) => {
                let signature = self
                    .signatures
                    .get(sig.0 as usize)
                    .ok_or(RuntimeError::BadRestartIndex(index))?;
                Ok(Decoded {
                    func: *func,
                    substate,
                    signature,
                })
            }
            _ => Err(RuntimeError::BadRestartIndex(index)),
        }
    }

    pub fn entries(&self) -> &[RestartEntry] {
        &self.entries
    }

    pub fn signature(&self, id: SignatureId) -> Option<&Signature> {
        self.signatures.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn builtin_result(builtin: Builtin) -> Type {
    match builtin {
        Builtin::StackUnwind | Builtin::ResumeStateInvoke => Type::Void,
        Builtin::StackFramesDepth => Type::I64,
        Builtin::Switch | Builtin::YieldCurrentFrameToCaller => Type::object(),
    }
}

impl fmt::Display for ResumeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entry) in self.entries.iter().enumerate() {
            match entry {
                RestartEntry::First { func, sig } => {
                    let sig = self
                        .signature(*sig)
                        .map_or_else(|| "?".to_string(), |s| s.to_string());
                    writeln!(f, "{:>4}  {} {}", index, func, sig)?;
                }
                RestartEntry::Later { offset } => writeln!(f, "{:>4}    +{}", index, offset)?,
            }
        }
        Ok(())
    }
}
