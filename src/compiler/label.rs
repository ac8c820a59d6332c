// mathvm Jump Labels
// Placeholders for jump targets, patched once a function body is complete

use super::bytecode::Bytecode;
use super::opcode::Opcode;
use crate::error::{MathvmError, MathvmResult, Span};

/// Handle to a jump target inside one function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Label table and relocation list of a single function
#[derive(Debug, Default)]
pub struct Labels {
    targets: Vec<Option<usize>>,
    relocations: Vec<(usize, Label)>,
}

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.targets.push(None);
        Label(self.targets.len() - 1)
    }

    /// Bind `label` to the current end of `code`
    pub fn bind(&mut self, label: Label, code: &Bytecode) -> MathvmResult<()> {
        let target = self.targets.get_mut(label.0).ok_or_else(|| {
            MathvmError::internal_error(format!("Unknown label {}", label.0), Span::default())
        })?;
        if let Some(offset) = target {
            return Err(MathvmError::internal_error(
                format!("Label {} already bound to offset {}", label.0, offset),
                Span::default(),
            ));
        }
        *target = Some(code.current_offset());
        Ok(())
    }

    /// Emit a jump to `label` with a placeholder displacement
    pub fn emit_branch(&mut self, code: &mut Bytecode, op: Opcode, label: Label) {
        code.emit(op);
        self.relocations.push((code.current_offset(), label));
        code.emit_i16(0);
    }

    /// Patch every recorded jump site; all labels used must be bound
    pub fn resolve(&mut self, code: &mut Bytecode) -> MathvmResult<()> {
        for (site, label) in self.relocations.drain(..) {
            let target = self
                .targets
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    MathvmError::internal_error(
                        format!("Jump at offset {} targets an unbound label", site - 1),
                        Span::default(),
                    )
                })?;

            let displacement = target as isize - site as isize;
            let displacement = i16::try_from(displacement).map_err(|_| {
                MathvmError::internal_error(
                    format!(
                        "Jump displacement {} at offset {} does not fit in 16 bits",
                        displacement,
                        site - 1
                    ),
                    Span::default(),
                )
            })?;

            code.patch_i16(site, displacement)
                .map_err(|e| MathvmError::internal_error(e.to_string(), Span::default()))?;
        }
        Ok(())
    }
}
