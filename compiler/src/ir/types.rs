//! IR Type System
//!
//! Defines the type system for the intermediate representation.
//! IR types map directly to runtime representations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// Void type (no value)
    Void,

    /// Boolean type
    Bool,

    /// Integer types
    I8,
    I16,
    I32,
    I64,

    /// Unsigned integer types
    U8,
    U16,
    U32,
    U64,

    /// Pointer type
    Ptr(Box<IrType>),

    /// Array type with known element count
    Array(Box<IrType>, usize),

    /// Function type
    Function {
        params: Vec<IrType>,
        return_type: Box<IrType>,
    },

    /// Structure type
    Struct {
        name: String,
        fields: Vec<StructField>,
    },
}

/// Structure field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: IrType,
    pub offset: usize,
}

impl IrType {
    /// Pointer to `pointee`
    pub fn ptr(pointee: IrType) -> Self {
        IrType::Ptr(Box::new(pointee))
    }

    /// Fixed-size array of `count` elements
    pub fn array(element: IrType, count: usize) -> Self {
        IrType::Array(Box::new(element), count)
    }

    /// Get the size of the type in bytes
    pub fn size(&self) -> usize {
        match self {
            IrType::Void => 0,
            IrType::Bool | IrType::I8 | IrType::U8 => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 => 4,
            IrType::I64 | IrType::U64 => 8,
            IrType::Ptr(_) => std::mem::size_of::<usize>(),
            IrType::Array(elem_ty, count) => elem_ty.size() * count,
            IrType::Function { .. } => std::mem::size_of::<usize>(), // function pointer
            IrType::Struct { fields, .. } => fields.iter().map(|f| f.ty.size()).sum(),
        }
    }

    /// Get the alignment requirement of the type
    pub fn align(&self) -> usize {
        match self {
            IrType::Void => 1,
            IrType::Bool | IrType::I8 | IrType::U8 => 1,
            IrType::I16 | IrType::U16 => 2,
            IrType::I32 | IrType::U32 => 4,
            IrType::I64 | IrType::U64 => 8,
            IrType::Ptr(_) | IrType::Function { .. } => std::mem::align_of::<usize>(),
            IrType::Array(elem_ty, _) => elem_ty.align(),
            IrType::Struct { fields, .. } => fields.iter().map(|f| f.ty.align()).max().unwrap_or(1),
        }
    }

    /// Check if this is a pointer type
    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// Check if this is a struct type
    pub fn is_struct(&self) -> bool {
        matches!(self, IrType::Struct { .. })
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            IrType::I8
                | IrType::I16
                | IrType::I32
                | IrType::I64
                | IrType::U8
                | IrType::U16
                | IrType::U32
                | IrType::U64
        )
    }

    /// Check if this is a signed integer type
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }

    /// Element type behind a pointer, if this is one
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Number of elements if this is a fixed-size array
    pub fn array_len(&self) -> Option<usize> {
        match self {
            IrType::Array(_, count) => Some(*count),
            _ => None,
        }
    }

    /// Get the default value for this type
    pub fn default_value(&self) -> IrValue {
        match self {
            IrType::Void => IrValue::Void,
            IrType::Bool => IrValue::Bool(false),
            IrType::I8 => IrValue::I8(0),
            IrType::I16 => IrValue::I16(0),
            IrType::I32 => IrValue::I32(0),
            IrType::I64 => IrValue::I64(0),
            IrType::U8 => IrValue::U8(0),
            IrType::U16 => IrValue::U16(0),
            IrType::U32 => IrValue::U32(0),
            IrType::U64 => IrValue::U64(0),
            IrType::Ptr(_) => IrValue::Null,
            _ => IrValue::Undef,
        }
    }
}

/// IR constant value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrValue {
    /// No value
    Void,
    /// Undefined value
    Undef,
    /// Null pointer
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer values
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    /// Array value
    Array(Vec<IrValue>),
}

impl IrValue {
    /// The value as a sign-extended integer, if it is one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            IrValue::I8(n) => Some(*n as i64),
            IrValue::I16(n) => Some(*n as i64),
            IrValue::I32(n) => Some(*n as i64),
            IrValue::I64(n) => Some(*n),
            IrValue::U8(n) => Some(*n as i64),
            IrValue::U16(n) => Some(*n as i64),
            IrValue::U32(n) => Some(*n as i64),
            IrValue::U64(n) => Some(*n as i64),
            _ => None,
        }
    }

    /// Type of this constant
    pub fn ty(&self) -> IrType {
        match self {
            IrValue::Void | IrValue::Undef => IrType::Void,
            IrValue::Null => IrType::ptr(IrType::Void),
            IrValue::Bool(_) => IrType::Bool,
            IrValue::I8(_) => IrType::I8,
            IrValue::I16(_) => IrType::I16,
            IrValue::I32(_) => IrType::I32,
            IrValue::I64(_) => IrType::I64,
            IrValue::U8(_) => IrType::U8,
            IrValue::U16(_) => IrType::U16,
            IrValue::U32(_) => IrType::U32,
            IrValue::U64(_) => IrType::U64,
            IrValue::Array(elems) => {
                let elem_ty = elems.first().map(|e| e.ty()).unwrap_or(IrType::Void);
                IrType::array(elem_ty, elems.len())
            }
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "bool"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::Ptr(ty) => write!(f, "*{}", ty),
            IrType::Array(ty, size) => write!(f, "[{}; {}]", ty, size),
            IrType::Function {
                params,
                return_type,
            } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", return_type)
            }
            IrType::Struct { name, .. } => write!(f, "struct {}", name),
        }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Void => write!(f, "void"),
            IrValue::Undef => write!(f, "undef"),
            IrValue::Null => write!(f, "null"),
            IrValue::Bool(b) => write!(f, "{}", b),
            IrValue::Array(elems) => {
                write!(f, "[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            other => match other.as_i64() {
                Some(n) => write!(f, "{}:{}", n, other.ty()),
                None => write!(f, "?"),
            },
        }
    }
}
