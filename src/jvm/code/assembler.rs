use super::{BranchInstruction, Instruction, Label, LabelGenerator};
use crate::jvm::class_file::Serialize;
use crate::jvm::Error;
use crate::util::Width;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Entry in a [`CodeBuffer`]
#[derive(Clone, Debug)]
pub enum CodeItem {
    /// Marks the position of a label (takes up no space)
    Place(Label),
    Instruction(Instruction),
    Branch(BranchInstruction<Label>),
}

/// Code array under construction, with symbolic jump targets
#[derive(Clone, Default)]
pub struct CodeBuffer {
    items: Vec<CodeItem>,
    labels: LabelGenerator,
}

/// Result of assembling a [`CodeBuffer`]
#[derive(Debug)]
pub struct AssembledCode {
    pub code: Vec<u8>,

    /// Final offset of every placed label
    pub label_offsets: HashMap<Label, u32>,
}

impl CodeBuffer {
    pub fn new() -> CodeBuffer {
        CodeBuffer::default()
    }

    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Place a label at the current end of the buffer
    pub fn place_label(&mut self, label: Label) {
        self.items.push(CodeItem::Place(label));
    }

    pub fn push_instruction(&mut self, insn: Instruction) {
        self.items.push(CodeItem::Instruction(insn));
    }

    pub fn push_branch_instruction(&mut self, insn: BranchInstruction<Label>) {
        self.items.push(CodeItem::Branch(insn));
    }

    pub fn items(&self) -> &[CodeItem] {
        &self.items
    }

    /// Lay out the code, resolve labels, and encode everything
    ///
    /// Branch widths are fixed by their instruction (`goto` vs. `goto_w`), so a single pass
    /// computes every offset. Jumps that do not fit their encoding are an error rather than being
    /// silently widened.
    pub fn assemble(mut self) -> Result<AssembledCode, Error> {
        // Compute offsets (and switch paddings, which depend on those offsets)
        let mut label_offsets: HashMap<Label, u32> = HashMap::new();
        let mut offset: usize = 0;
        for item in &mut self.items {
            match item {
                CodeItem::Place(label) => {
                    if label_offsets.insert(*label, offset as u32).is_some() {
                        return Err(Error::DuplicateLabel(*label));
                    }
                }
                CodeItem::Instruction(insn) => offset += insn.width(),
                CodeItem::Branch(branch) => {
                    match branch {
                        BranchInstruction::TableSwitch { padding, .. }
                        | BranchInstruction::LookupSwitch { padding, .. } => {
                            *padding = ((4 - (offset + 1) % 4) % 4) as u8;
                        }
                        _ => (),
                    }
                    offset += branch.width();
                }
            }
            if offset > u16::MAX as usize {
                return Err(Error::MethodCodeOverflow(offset));
            }
        }

        // Encode
        let mut code: Vec<u8> = Vec::with_capacity(offset);
        for item in &self.items {
            match item {
                CodeItem::Place(_) => (),
                CodeItem::Instruction(insn) => insn.serialize(&mut code)?,
                CodeItem::Branch(branch) => {
                    let here = code.len() as u32;
                    let short = branch.has_short_offset();
                    let relative = branch.try_map_labels(|label| {
                        let target = *label_offsets
                            .get(label)
                            .ok_or(Error::UnplacedLabel(*label))?;
                        let relative = target as i64 - here as i64;
                        let fits = if short {
                            i16::try_from(relative).is_ok()
                        } else {
                            i32::try_from(relative).is_ok()
                        };
                        if fits {
                            Ok(relative as i32)
                        } else {
                            Err(Error::JumpOutOfRange {
                                offset: here,
                                target,
                            })
                        }
                    })?;
                    relative.serialize(&mut code)?;
                }
            }
        }

        Ok(AssembledCode {
            code,
            label_offsets,
        })
    }
}
