//! Runtime values
//!
//! `Value` is what the executor moves between variables. Reference counting
//! stands in for the garbage collector: a `GcRef` keeps its target alive and
//! two references are the same object iff they point at the same allocation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::frame::FrameRef;
use crate::ir::{StorageClass, Type};
use crate::runtime::SignalRef;

/// Kind of the catchable condition raised when a save would exceed the
/// depth limit
pub const STACK_OVERFLOW: &str = "StackOverflow";

/// Ordinary, program-visible exception object
#[derive(Debug)]
pub struct Exception {
    pub kind: String,
    pub payload: Value,
}

impl Exception {
    pub fn new(kind: impl Into<String>, payload: Value) -> Rc<Self> {
        Rc::new(Self {
            kind: kind.into(),
            payload,
        })
    }

    pub fn stack_overflow(depth: usize) -> Rc<Self> {
        Self::new(STACK_OVERFLOW, Value::I64(depth as i64))
    }

    pub fn is_stack_overflow(&self) -> bool {
        self.kind == STACK_OVERFLOW
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.payload)
    }
}

/// Heap object with mutable fields
#[derive(Debug)]
pub struct GcObject {
    pub type_name: String,
    pub fields: RefCell<Vec<Value>>,
}

/// A GC-tracked reference
#[derive(Debug, Clone, Default)]
pub enum GcRef {
    #[default]
    Null,
    Frame(FrameRef),
    Object(Rc<GcObject>),
    Exception(Rc<Exception>),
    Signal(SignalRef),
}

impl GcRef {
    pub fn is_null(&self) -> bool {
        matches!(self, GcRef::Null)
    }

    pub fn as_frame(&self) -> Option<&FrameRef> {
        match self {
            GcRef::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

impl PartialEq for GcRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GcRef::Null, GcRef::Null) => true,
            (GcRef::Frame(a), GcRef::Frame(b)) => Rc::ptr_eq(a, b),
            (GcRef::Object(a), GcRef::Object(b)) => Rc::ptr_eq(a, b),
            (GcRef::Exception(a), GcRef::Exception(b)) => Rc::ptr_eq(a, b),
            (GcRef::Signal(a), GcRef::Signal(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    Char(char),
    I32(i32),
    I64(i64),
    U64(u64),
    I128(i128),
    F64(f64),
    Addr(usize),
    Ref(GcRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::I128(a), Value::I128(b)) => a == b,
            // bit pattern, so NaN payloads and signed zeros compare exactly
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Addr(a), Value::Addr(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Zero value of a type, used for the dummy arguments of a resumed call
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Void => Value::Void,
            Type::Bool => Value::Bool(false),
            Type::Char => Value::Char('\0'),
            Type::I32 => Value::I32(0),
            Type::I64 => Value::I64(0),
            Type::U64 => Value::U64(0),
            Type::I128 => Value::I128(0),
            Type::F64 => Value::F64(0.0),
            Type::Addr | Type::Raw(_) => Value::Addr(0),
            Type::Ref(_) => Value::Ref(GcRef::Null),
        }
    }

    pub fn null() -> Value {
        Value::Ref(GcRef::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::I128(_) => "i128",
            Value::F64(_) => "f64",
            Value::Addr(_) => "addr",
            Value::Ref(_) => "ref",
        }
    }

    /// Storage class of the value's own type
    pub fn storage_class(&self) -> Option<StorageClass> {
        match self {
            Value::Void => None,
            Value::Bool(_) | Value::Char(_) | Value::I32(_) | Value::I64(_) | Value::U64(_) => {
                Some(StorageClass::Int)
            }
            Value::I128(_) => Some(StorageClass::Wide),
            Value::F64(_) => Some(StorageClass::Float),
            Value::Addr(_) => Some(StorageClass::Addr),
            Value::Ref(_) => Some(StorageClass::Ref),
        }
    }

    fn mismatch(&self, expected: impl fmt::Display) -> RuntimeError {
        RuntimeError::TypeMismatch {
            expected: expected.to_string(),
            found: self.type_name().to_string(),
        }
    }

    /// Cast into the erased representation of `class`
    pub fn erase(&self, class: StorageClass) -> Result<Value, RuntimeError> {
        let erased = match (class, self) {
            (StorageClass::Int, Value::Bool(b)) => Value::I64(*b as i64),
            (StorageClass::Int, Value::Char(c)) => Value::I64(*c as u32 as i64),
            (StorageClass::Int, Value::I32(v)) => Value::I64(*v as i64),
            (StorageClass::Int, Value::I64(v)) => Value::I64(*v),
            (StorageClass::Int, Value::U64(v)) => Value::I64(*v as i64),
            (StorageClass::Wide, Value::I128(v)) => Value::I128(*v),
            (StorageClass::Float, Value::F64(v)) => Value::F64(*v),
            (StorageClass::Addr, Value::Addr(a)) => Value::Addr(*a),
            (StorageClass::Ref, Value::Ref(r)) => Value::Ref(r.clone()),
            _ => return Err(self.mismatch(class)),
        };
        Ok(erased)
    }

    /// Cast an erased (or already concrete) value back to `ty`
    pub fn restore(&self, ty: &Type) -> Result<Value, RuntimeError> {
        let Some(class) = ty.storage_class() else {
            return Ok(Value::Void);
        };
        let erased = self.erase(class)?;
        let restored = match (ty, erased) {
            (Type::Bool, Value::I64(n)) => Value::Bool(n != 0),
            (Type::Char, Value::I64(n)) => {
                char::from_u32(n as u32).map(Value::Char).ok_or_else(|| self.mismatch(ty))?
            }
            (Type::I32, Value::I64(n)) => Value::I32(n as i32),
            (Type::I64, Value::I64(n)) => Value::I64(n),
            (Type::U64, Value::I64(n)) => Value::U64(n as u64),
            (_, erased) => erased,
        };
        Ok(restored)
    }

    /// Numeric conversion (the `Cast` operation)
    pub fn convert(&self, ty: &Type) -> Result<Value, RuntimeError> {
        match (self, ty.storage_class()) {
            (Value::F64(f), Some(StorageClass::Int)) => Value::I64(*f as i64).restore(ty),
            (Value::F64(f), Some(StorageClass::Wide)) => Ok(Value::I128(*f as i128)),
            (Value::I128(v), Some(StorageClass::Int)) => Value::I64(*v as i64).restore(ty),
            (Value::I128(v), Some(StorageClass::Float)) => Ok(Value::F64(*v as f64)),
            (_, Some(StorageClass::Wide)) => Ok(Value::I128(self.as_i64()? as i128)),
            (_, Some(StorageClass::Float)) => match self {
                Value::U64(v) => Ok(Value::F64(*v as f64)),
                _ => Ok(Value::F64(self.as_i64()? as f64)),
            },
            (Value::Addr(a), Some(StorageClass::Int)) => Value::I64(*a as i64).restore(ty),
            (_, Some(StorageClass::Addr)) => match self {
                Value::Addr(a) => Ok(Value::Addr(*a)),
                _ => Ok(Value::Addr(self.as_i64()? as usize)),
            },
            _ => self.restore(ty),
        }
    }

    /// Integer view of an integer-class value
    pub fn as_i64(&self) -> Result<i64, RuntimeError> {
        match self.erase(StorageClass::Int) {
            Ok(Value::I64(n)) => Ok(n),
            _ => Err(self.mismatch("integer")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::I64(n) => Ok(*n != 0),
            Value::I32(n) => Ok(*n != 0),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn as_gc_ref(&self) -> Result<&GcRef, RuntimeError> {
        match self {
            Value::Ref(r) => Ok(r),
            _ => Err(self.mismatch("ref")),
        }
    }

    /// Frame handle, `None` for the null reference
    pub fn as_frame(&self) -> Result<Option<FrameRef>, RuntimeError> {
        match self.as_gc_ref()? {
            GcRef::Null => Ok(None),
            GcRef::Frame(frame) => Ok(Some(frame.clone())),
            _ => Err(self.mismatch("frame")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{:?}", c),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I128(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{:?}", v),
            Value::Addr(a) => write!(f, "0x{:x}", a),
            Value::Ref(GcRef::Null) => write!(f, "null"),
            Value::Ref(GcRef::Frame(frame)) => write!(f, "<frame restart={}>", frame.restart()),
            Value::Ref(GcRef::Object(obj)) => write!(f, "<{}>", obj.type_name),
            Value::Ref(GcRef::Exception(exc)) => write!(f, "<exception {}>", exc),
            Value::Ref(GcRef::Signal(_)) => write!(f, "<signal>"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
