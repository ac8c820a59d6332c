// mathvm Call Frames

use super::value::Value;
use crate::ast::VarType;
use smallvec::SmallVec;

/// Activation of one function: its context id and typed local slots
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub function: u16,
    pub slots: SmallVec<[Value; 8]>,
}

impl Frame {
    /// New frame with every slot set to the zero value of its declared type
    pub fn new(function: u16, locals: &[VarType]) -> Self {
        let slots = locals
            .iter()
            .map(|ty| Value::zero(*ty).unwrap_or(Value::Int(0)))
            .collect();
        Self { function, slots }
    }

    pub fn get(&self, slot: u16) -> Option<Value> {
        self.slots.get(slot as usize).copied()
    }

    pub fn slot_mut(&mut self, slot: u16) -> Option<&mut Value> {
        self.slots.get_mut(slot as usize)
    }
}

/// Where execution resumes after a RETURN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnSite {
    pub function: u16,
    pub pc: usize,
}

/// Index of the innermost active frame belonging to context `ctx`
///
/// Context ids equal function ids, so a reference to a variable of an enclosing
/// function always reaches that function's most recent activation, even during
/// recursion.
pub fn resolve_context(frames: &[Frame], ctx: u16) -> Option<usize> {
    frames.iter().rposition(|frame| frame.function == ctx)
}
