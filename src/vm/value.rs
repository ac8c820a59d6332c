// mathvm Runtime Values
// Everything on the operand stack and in frame slots is one of three scalar kinds

use crate::ast::VarType;
use crate::compiler::ConstantPool;
use std::fmt;

/// Runtime value
///
/// Strings are ids into the program's constant pool; they are never created at run time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    StringRef(u16),
}

impl Value {
    /// Zero value of a slot of type `ty`
    pub fn zero(ty: VarType) -> Option<Value> {
        match ty {
            VarType::Int => Some(Value::Int(0)),
            VarType::Double => Some(Value::Double(0.0)),
            VarType::String => Some(Value::StringRef(0)),
            VarType::Void | VarType::Invalid => None,
        }
    }

    pub fn kind(&self) -> VarType {
        match self {
            Value::Int(_) => VarType::Int,
            Value::Double(_) => VarType::Double,
            Value::StringRef(_) => VarType::String,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_id(&self) -> Option<u16> {
        match self {
            Value::StringRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Text as the print instructions would write it
    pub fn render(&self, constants: &ConstantPool) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::StringRef(id) => constants.get(*id).unwrap_or("<bad string>").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::StringRef(id) => write!(f, "<string @{}>", id),
        }
    }
}

/// Named top-level variable exchanged with a running program
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    pub value: Value,
}

impl Var {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, Value::Int(value))
    }

    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, Value::Double(value))
    }

    pub fn ty(&self) -> VarType {
        self.value.kind()
    }
}
