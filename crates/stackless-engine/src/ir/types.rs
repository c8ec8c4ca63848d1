//! IR types, variables and operands
//!
//! Every variable carries a concrete type. The transformer only cares about
//! the *storage class* a type erases to: that is what decides the layout of
//! the heap frame records a suspended call level is saved into.

use serde::{Deserialize, Serialize};

/// Concrete type of an IR variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// No value
    Void,
    Bool,
    Char,
    I32,
    I64,
    U64,
    /// Wide integer (stored in the wide-integer class)
    I128,
    F64,
    /// Untracked machine address
    Addr,
    /// Pointer to a GC-managed object of the named type
    Ref(String),
    /// Pointer to non-GC memory of the named type
    Raw(String),
}

/// Erased storage class of a saved value.
///
/// The declaration order is the canonical field order of frame records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageClass {
    Int,
    Wide,
    Float,
    Addr,
    Ref,
}

impl StorageClass {
    /// Number of storage classes
    pub const COUNT: usize = 5;

    /// All classes in canonical order
    pub const ALL: [StorageClass; StorageClass::COUNT] = [
        StorageClass::Int,
        StorageClass::Wide,
        StorageClass::Float,
        StorageClass::Addr,
        StorageClass::Ref,
    ];

    /// Position of this class in [`StorageClass::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The concrete type values of this class are erased to
    pub fn erased_type(self) -> Type {
        match self {
            StorageClass::Int => Type::I64,
            StorageClass::Wide => Type::I128,
            StorageClass::Float => Type::F64,
            StorageClass::Addr => Type::Addr,
            StorageClass::Ref => Type::Ref("object".to_string()),
        }
    }

    /// Short name used in frame field names (`state_long_0`, ...)
    pub fn field_prefix(self) -> &'static str {
        match self {
            StorageClass::Int => "long",
            StorageClass::Wide => "longlong",
            StorageClass::Float => "float",
            StorageClass::Addr => "addr",
            StorageClass::Ref => "ref",
        }
    }
}

impl Type {
    /// Storage class this type erases to, `None` for `Void`
    pub fn storage_class(&self) -> Option<StorageClass> {
        match self {
            Type::Void => None,
            Type::Bool | Type::Char | Type::I32 | Type::I64 | Type::U64 => Some(StorageClass::Int),
            Type::I128 => Some(StorageClass::Wide),
            Type::F64 => Some(StorageClass::Float),
            Type::Addr | Type::Raw(_) => Some(StorageClass::Addr),
            Type::Ref(_) => Some(StorageClass::Ref),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    /// Shorthand for a GC reference to a generic object
    pub fn object() -> Self {
        Type::Ref("object".to_string())
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::U64 => write!(f, "u64"),
            Type::I128 => write!(f, "i128"),
            Type::F64 => write!(f, "f64"),
            Type::Addr => write!(f, "addr"),
            Type::Ref(name) => write!(f, "ref<{}>", name),
            Type::Raw(name) => write!(f, "raw<{}>", name),
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_prefix())
    }
}

/// Variable identifier, unique within a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A typed variable. Variables are local to the block that defines them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
    pub id: VarId,
    pub ty: Type,
}

impl Var {
    pub fn new(id: VarId, ty: Type) -> Self {
        Self { id, ty }
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.ty)
    }
}

/// Immediate constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Void,
    Bool(bool),
    Char(char),
    I32(i32),
    I64(i64),
    U64(u64),
    I128(i128),
    F64(f64),
    Addr(usize),
    /// The null GC reference
    Null,
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Void => Type::Void,
            Constant::Bool(_) => Type::Bool,
            Constant::Char(_) => Type::Char,
            Constant::I32(_) => Type::I32,
            Constant::I64(_) => Type::I64,
            Constant::U64(_) => Type::U64,
            Constant::I128(_) => Type::I128,
            Constant::F64(_) => Type::F64,
            Constant::Addr(_) => Type::Addr,
            Constant::Null => Type::object(),
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Void => write!(f, "void"),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Char(c) => write!(f, "{:?}", c),
            Constant::I32(v) => write!(f, "{}i32", v),
            Constant::I64(v) => write!(f, "{}", v),
            Constant::U64(v) => write!(f, "{}u64", v),
            Constant::I128(v) => write!(f, "{}i128", v),
            Constant::F64(v) => write!(f, "{:?}", v),
            Constant::Addr(a) => write!(f, "0x{:x}", a),
            Constant::Null => write!(f, "null"),
        }
    }
}

/// Operation argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Var(VarId),
    Const(Constant),
    /// The raise captured by the exception edge being followed.
    /// Only meaningful in the arguments of a `Catch` handler link.
    Caught,
}

impl Operand {
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Operand::Var(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<VarId> for Operand {
    fn from(id: VarId) -> Self {
        Operand::Var(id)
    }
}

impl From<&Var> for Operand {
    fn from(var: &Var) -> Self {
        Operand::Var(var.id)
    }
}

impl From<Constant> for Operand {
    fn from(c: Constant) -> Self {
        Operand::Const(c)
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Var(id) => write!(f, "{}", id),
            Operand::Const(c) => write!(f, "{}", c),
            Operand::Caught => write!(f, "$caught"),
        }
    }
}
