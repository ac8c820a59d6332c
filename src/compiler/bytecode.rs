// mathvm Bytecode Buffer
// Growable byte buffer for one function, little-endian operands

use super::opcode::Opcode;
use thiserror::Error;

/// Problems reading or patching a bytecode buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("unknown opcode {byte:#04x} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("truncated {op} instruction at offset {offset}")]
    Truncated { op: Opcode, offset: usize },

    #[error("offset {offset} is past the end of the bytecode")]
    OutOfBounds { offset: usize },
}

/// Decoded instruction operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    None,
    Double(f64),
    Int(i64),
    /// Constant id, slot, function id or native id
    Id(u16),
    /// Context id and slot
    CtxSlot(u16, u16),
    /// Jump displacement, relative to the displacement field
    Offset(i16),
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insn {
    pub op: Opcode,
    pub operand: Operand,
}

impl Insn {
    /// Absolute target of a jump instruction located at `offset`
    pub fn jump_target(&self, offset: usize) -> Option<usize> {
        match self.operand {
            Operand::Offset(disp) => {
                let field = offset as isize + 1;
                usize::try_from(field + disp as isize).ok()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bytecode {
    code: Vec<u8>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    pub fn from_bytes(code: Vec<u8>) -> Self {
        Self { code }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Current write position
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i16(&mut self, value: i16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i64(&mut self, value: i64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_f64(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Overwrite two bytes at `offset`; used to resolve jump placeholders
    pub fn patch_i16(&mut self, offset: usize, value: i16) -> Result<(), BytecodeError> {
        let slot = self
            .code
            .get_mut(offset..offset + 2)
            .ok_or(BytecodeError::OutOfBounds { offset })?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.code
            .get(offset..offset + N)
            .and_then(|bytes| bytes.try_into().ok())
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        self.read_array(offset).map(u16::from_le_bytes)
    }

    pub fn read_i16(&self, offset: usize) -> Option<i16> {
        self.read_array(offset).map(i16::from_le_bytes)
    }

    pub fn read_i64(&self, offset: usize) -> Option<i64> {
        self.read_array(offset).map(i64::from_le_bytes)
    }

    pub fn read_f64(&self, offset: usize) -> Option<f64> {
        self.read_array(offset).map(f64::from_le_bytes)
    }

    /// Decode the instruction at `pc`, returning it with the offset of the next one
    pub fn decode(&self, pc: usize) -> Result<(Insn, usize), BytecodeError> {
        let byte = *self
            .code
            .get(pc)
            .ok_or(BytecodeError::OutOfBounds { offset: pc })?;
        let op = Opcode::from_byte(byte).ok_or(BytecodeError::UnknownOpcode { byte, offset: pc })?;
        if op == Opcode::Invalid {
            return Err(BytecodeError::UnknownOpcode { byte, offset: pc });
        }

        let at = pc + 1;
        let truncated = BytecodeError::Truncated { op, offset: pc };
        let operand = match op {
            Opcode::DLoad => Operand::Double(self.read_f64(at).ok_or(truncated)?),
            Opcode::ILoad => Operand::Int(self.read_i64(at).ok_or(truncated)?),
            Opcode::LoadCtxDVar
            | Opcode::LoadCtxIVar
            | Opcode::LoadCtxSVar
            | Opcode::StoreCtxDVar
            | Opcode::StoreCtxIVar
            | Opcode::StoreCtxSVar => {
                let ctx = self.read_u16(at).ok_or(truncated.clone())?;
                let slot = self.read_u16(at + 2).ok_or(truncated)?;
                Operand::CtxSlot(ctx, slot)
            }
            op if op.is_jump() => Operand::Offset(self.read_i16(at).ok_or(truncated)?),
            op if op.size() == 3 => Operand::Id(self.read_u16(at).ok_or(truncated)?),
            _ => Operand::None,
        };

        Ok((Insn { op, operand }, pc + op.size()))
    }

    /// Iterate decoded instructions with their offsets, stopping at the first bad one
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            bytecode: self,
            pc: 0,
        }
    }
}

pub struct Instructions<'a> {
    bytecode: &'a Bytecode,
    pc: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<(usize, Insn), BytecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pc >= self.bytecode.len() {
            return None;
        }
        let at = self.pc;
        match self.bytecode.decode(at) {
            Ok((insn, next)) => {
                self.pc = next;
                Some(Ok((at, insn)))
            }
            Err(err) => {
                self.pc = self.bytecode.len();
                Some(Err(err))
            }
        }
    }
}
