//! Microprogram container and its listing format.

use anyhow::{Context, Result};

use crate::isa::{ControlLine, ControlLines, DebugOp, Instruction, MuxCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Inst(Instruction),
    /// Free text carried into listings. Never encoded.
    Comment(String),
}

/// An ordered microprogram under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationList {
    ops: Vec<Operation>,
}

impl OperationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one control-line set, rejecting mutually exclusive lines.
    pub fn add(&mut self, lines: impl IntoIterator<Item = ControlLine>) -> Result<()> {
        let lines: ControlLines = lines.into_iter().collect();
        self.push(Instruction::Control(lines))
    }

    /// Append one already built instruction.
    pub fn push(&mut self, inst: Instruction) -> Result<()> {
        if let Instruction::Control(lines) = inst {
            lines
                .validate()
                .with_context(|| format!("invalid instruction at index {}", self.len()))?;
        }
        self.ops.push(Operation::Inst(inst));
        Ok(())
    }

    pub fn nop(&mut self) {
        self.ops
            .push(Operation::Inst(Instruction::Control(ControlLines::empty())));
    }

    pub fn mux(&mut self, source: impl Into<MuxCode>) {
        self.ops
            .push(Operation::Inst(Instruction::Mux(source.into())));
    }

    pub fn debug(&mut self, op: DebugOp) {
        self.ops.push(Operation::Inst(Instruction::Debug(op)));
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.ops.push(Operation::Comment(text.into()));
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Instructions in program order, comments skipped.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.ops.iter().filter_map(|op| match op {
            Operation::Inst(inst) => Some(inst),
            Operation::Comment(_) => None,
        })
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the encoded program in bytes.
    pub fn byte_len(&self) -> usize {
        self.instructions().map(Instruction::byte_len).sum()
    }
}

impl FromIterator<Instruction> for OperationList {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().map(Operation::Inst).collect(),
        }
    }
}

impl std::fmt::Display for OperationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut addr = 0;
        for op in &self.ops {
            match op {
                Operation::Inst(inst) => {
                    writeln!(f, "{addr:04x}  {inst}")?;
                    addr += inst.byte_len();
                }
                Operation::Comment(text) => writeln!(f, "      # {text}")?,
            }
        }
        Ok(())
    }
}
