// mathvm Static Types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of a variable, parameter, return value or expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Invalid,
    Void,
    Int,
    Double,
    String,
}

impl VarType {
    pub fn name(&self) -> &'static str {
        match self {
            VarType::Invalid => "<invalid>",
            VarType::Void => "void",
            VarType::Int => "int",
            VarType::Double => "double",
            VarType::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "void" => VarType::Void,
            "int" => VarType::Int,
            "double" => VarType::Double,
            "string" => VarType::String,
            _ => VarType::Invalid,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, VarType::Int | VarType::Double)
    }

    /// Whether a value of this type can live in a frame slot or on the stack
    pub fn is_value(&self) -> bool {
        matches!(self, VarType::Int | VarType::Double | VarType::String)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            VarType::Invalid => 0,
            VarType::Void => 1,
            VarType::Double => 2,
            VarType::Int => 3,
            VarType::String => 4,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(VarType::Invalid),
            1 => Some(VarType::Void),
            2 => Some(VarType::Double),
            3 => Some(VarType::Int),
            4 => Some(VarType::String),
            _ => None,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for ty in [VarType::Void, VarType::Int, VarType::Double, VarType::String] {
            assert_eq!(VarType::from_name(ty.name()), ty);
            assert_eq!(VarType::from_byte(ty.to_byte()), Some(ty));
        }
        assert_eq!(VarType::from_name("float"), VarType::Invalid);
    }
}
