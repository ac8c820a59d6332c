// mathvm Code Object
// Function table plus the pools shared by all functions of a translated program

use super::bytecode::{Bytecode, Insn, Operand};
use super::opcode::Opcode;
use super::pool::{ConstantPool, NativePool};
use crate::ast::VarType;
use regex::Regex;
use std::io::{self, Write};

/// Name of the implicit function wrapping the program body
pub const TOP_FUNCTION: &str = "<top>";

/// A translated function
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub id: u16,
    pub name: String,
    pub return_type: VarType,
    pub params: Vec<(VarType, String)>,
    /// Type of every frame slot, parameters first
    pub locals: Vec<VarType>,
    pub bytecode: Bytecode,
    /// Native pool id when the body is a native binding
    pub native: Option<u16>,
}

impl Function {
    pub fn new(id: u16, name: impl Into<String>, return_type: VarType) -> Self {
        Self {
            id,
            name: name.into(),
            return_type,
            params: Vec::new(),
            locals: Vec::new(),
            bytecode: Bytecode::new(),
            native: None,
        }
    }

    pub fn params_count(&self) -> usize {
        self.params.len()
    }

    pub fn locals_count(&self) -> usize {
        self.locals.len()
    }

    pub fn is_native(&self) -> bool {
        self.native.is_some()
    }

    /// `int fact(int n)` style header
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("{} {}", ty, name))
            .collect();
        format!("{} {}({})", self.return_type, self.name, params.join(", "))
    }
}

/// A program variable declared in the outermost block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelVar {
    pub name: String,
    pub ty: VarType,
    pub slot: u16,
}

/// Translated program; immutable once produced
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub functions: Vec<Function>,
    pub constants: ConstantPool,
    pub natives: NativePool,
    pub top_level_vars: Vec<TopLevelVar>,
}

impl Code {
    pub fn new(
        functions: Vec<Function>,
        constants: ConstantPool,
        natives: NativePool,
        top_level_vars: Vec<TopLevelVar>,
    ) -> Self {
        Self {
            functions,
            constants,
            natives,
            top_level_vars,
        }
    }

    pub fn function(&self, id: u16) -> Option<&Function> {
        self.functions.get(id as usize)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn top(&self) -> Option<&Function> {
        self.function(0)
    }

    pub fn constant(&self, id: u16) -> Option<&str> {
        self.constants.get(id)
    }

    /// Write a listing of every function, optionally only those whose name matches `filter`
    pub fn disassemble(&self, out: &mut dyn Write, filter: Option<&Regex>) -> io::Result<()> {
        for function in &self.functions {
            if let Some(re) = filter {
                if !re.is_match(&function.name) {
                    continue;
                }
            }
            self.disassemble_function(out, function)?;
        }
        Ok(())
    }

    fn disassemble_function(&self, out: &mut dyn Write, function: &Function) -> io::Result<()> {
        writeln!(
            out,
            "function [{}] {} ; params {}, locals {}",
            function.id,
            function.signature(),
            function.params_count(),
            function.locals_count()
        )?;
        if let Some(native) = function.native.and_then(|id| self.natives.get(id)) {
            writeln!(out, "  native {} : {}", native.name, native.signature)?;
        }
        for item in function.bytecode.instructions() {
            match item {
                Ok((offset, insn)) => {
                    writeln!(out, "{}: {}", offset, self.format_insn(offset, &insn))?
                }
                Err(err) => {
                    writeln!(out, "  <{}>", err)?;
                    break;
                }
            }
        }
        writeln!(out)
    }

    fn format_insn(&self, offset: usize, insn: &Insn) -> String {
        let mnemonic = insn.op.mnemonic();
        match (insn.op, insn.operand) {
            (_, Operand::None) => mnemonic.to_string(),
            (_, Operand::Int(v)) => format!("{} {}", mnemonic, v),
            (_, Operand::Double(v)) => format!("{} {:?}", mnemonic, v),
            (Opcode::SLoad, Operand::Id(id)) => match self.constant(id) {
                Some(s) => format!("{} @{} {:?}", mnemonic, id, s),
                None => format!("{} @{} ???", mnemonic, id),
            },
            (Opcode::Call, Operand::Id(id)) => {
                let name = self.function(id).map_or("???", |f| f.name.as_str());
                format!("{} {} <{}>", mnemonic, id, name)
            }
            (Opcode::CallNative, Operand::Id(id)) => {
                let name = self.natives.get(id).map_or("???", |n| n.name.as_str());
                format!("{} {} <{}>", mnemonic, id, name)
            }
            (_, Operand::Id(slot)) => format!("{} {}", mnemonic, slot),
            (_, Operand::CtxSlot(ctx, slot)) => format!("{} {} {}", mnemonic, ctx, slot),
            (_, Operand::Offset(_)) => match insn.jump_target(offset) {
                Some(target) => format!("{} {}", mnemonic, target),
                None => format!("{} ???", mnemonic),
            },
        }
    }
}
