//! Byte encoding of microprograms for an 8-bit wide control store.
//!
//! A control word has bit 7 clear. Bit 6 is `REPEAT_FOR_ALL_BITS`, bit 5 is
//! `SHIFT_A_RIGHT` and the low five bits index a per-program table of the
//! remaining line sets. Multiplexer selects and debug operations take two
//! bytes, a prefix followed by the operand code.

use anyhow::{bail, Context, Result};

use crate::isa::{ControlLine, ControlLines, DebugOp, Instruction, MuxCode};
use crate::program::OperationList;

/// Fill byte of unprogrammed ROM cells.
pub const UNUSED_CODE: u8 = 0xff;
pub const MUX_PREFIX: u8 = 0x80;
pub const DEBUG_PREFIX: u8 = 0xc0;

const REPEAT_BIT: u8 = 0x40;
const SHIFT_A_BIT: u8 = 0x20;
const INDEX_MASK: u8 = 0x1f;
pub const CODE_TABLE_SIZE: usize = INDEX_MASK as usize + 1;

/// Smallest ROM generated, as a power of two.
const MIN_ROM_BITS: u32 = 9;

/// Line sets addressed by the low bits of a control word, in order of first
/// use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    entries: Vec<ControlLines>,
}

impl CodeTable {
    fn index_or_insert(&mut self, lines: ControlLines) -> Result<u8> {
        if let Some(index) = self.entries.iter().position(|e| *e == lines) {
            return Ok(index as u8);
        }
        if self.entries.len() == CODE_TABLE_SIZE {
            bail!(
                "code table exhausted: {lines} would be entry {}, only {CODE_TABLE_SIZE} available",
                CODE_TABLE_SIZE + 1
            );
        }
        self.entries.push(lines);
        Ok((self.entries.len() - 1) as u8)
    }

    pub fn get(&self, index: u8) -> Option<ControlLines> {
        self.entries.get(index as usize).copied()
    }

    pub fn entries(&self) -> &[ControlLines] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Display for CodeTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, lines) in self.entries.iter().enumerate() {
            writeln!(f, "{index:02x}  {lines}")?;
        }
        Ok(())
    }
}

/// An encoded program together with the table needed to decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub image: Vec<u8>,
    pub table: CodeTable,
}

impl Rom {
    pub fn decode(&self) -> Result<OperationList> {
        Ok(decode(&self.image, &self.table)?.into_iter().collect())
    }

    /// The image padded with [`UNUSED_CODE`] to a power-of-two ROM size.
    pub fn memory_image(&self) -> Vec<u8> {
        let bits = (self.image.len().max(1) as u64)
            .next_power_of_two()
            .trailing_zeros()
            .max(MIN_ROM_BITS);
        let mut image = self.image.clone();
        image.resize(1 << bits, UNUSED_CODE);
        image
    }
}

impl std::fmt::Display for Rom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "# code table")?;
        write!(f, "{}", self.table)?;
        writeln!(f, "# image")?;
        write!(f, "{}", hex_dump(&self.memory_image()))
    }
}

/// Sixteen space separated bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for chunk in bytes.chunks(16) {
        let line: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

/// Encode every instruction of `ops`. Deterministic: the code table is
/// assigned in program order.
pub fn encode(ops: &OperationList) -> Result<Rom> {
    let mut table = CodeTable::default();
    let mut image = Vec::with_capacity(ops.byte_len());

    for (index, inst) in ops.instructions().enumerate() {
        match inst {
            Instruction::Control(lines) => {
                let mut byte = 0;
                if lines.contains(ControlLine::RepeatForAllBits) {
                    byte |= REPEAT_BIT;
                }
                if lines.contains(ControlLine::ShiftARight) {
                    byte |= SHIFT_A_BIT;
                }
                let rest = lines
                    .without(ControlLine::RepeatForAllBits)
                    .without(ControlLine::ShiftARight);
                byte |= table
                    .index_or_insert(rest)
                    .with_context(|| format!("encoding instruction {index}"))?;
                image.push(byte);
            }
            Instruction::Mux(source) => image.extend([MUX_PREFIX, source.code()]),
            Instruction::Debug(op) => image.extend([DEBUG_PREFIX, op.code()]),
        }
    }

    tracing::debug!(
        "encoded {} instructions into {} bytes, {} code table entries",
        ops.len(),
        image.len(),
        table.len()
    );
    Ok(Rom { image, table })
}

pub fn decode(bytes: &[u8], table: &CodeTable) -> Result<Vec<Instruction>> {
    let mut insts = Vec::new();
    let mut it = bytes.iter().copied().enumerate();

    while let Some((addr, byte)) = it.next() {
        let inst = match byte {
            MUX_PREFIX | DEBUG_PREFIX => {
                let Some((_, operand)) = it.next() else {
                    bail!("truncated instruction at {addr:#06x}");
                };
                if byte == MUX_PREFIX {
                    let source = MuxCode::from_code(operand).with_context(|| {
                        format!("invalid mux code {operand:#04x} at {addr:#06x}")
                    })?;
                    Instruction::Mux(source)
                } else {
                    let op = DebugOp::from_code(operand).with_context(|| {
                        format!("invalid debug code {operand:#04x} at {addr:#06x}")
                    })?;
                    Instruction::Debug(op)
                }
            }
            b if b & 0x80 != 0 => bail!("invalid code {b:#04x} at {addr:#06x}"),
            b => {
                let Some(mut lines) = table.get(b & INDEX_MASK) else {
                    bail!("code {b:#04x} at {addr:#06x} is not in the code table");
                };
                if b & REPEAT_BIT != 0 {
                    lines.insert(ControlLine::RepeatForAllBits);
                }
                if b & SHIFT_A_BIT != 0 {
                    lines.insert(ControlLine::ShiftARight);
                }
                Instruction::Control(lines)
            }
        };
        insts.push(inst);
    }
    Ok(insts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Register;

    fn sample() -> Result<OperationList> {
        let mut ops = OperationList::new();
        ops.add([ControlLine::LoadI0FromInput])?;
        ops.mux(Register::I0);
        ops.add([
            ControlLine::ShiftARight,
            ControlLine::ShiftI0Right,
            ControlLine::RepeatForAllBits,
        ])?;
        ops.add([ControlLine::ShiftI0Right])?;
        ops.debug(DebugOp::AssertRZero);
        ops.mux(MuxCode::BankSwitch);
        ops.add([ControlLine::Restart])?;
        Ok(ops)
    }

    #[test]
    fn test_encode_layout() -> Result<()> {
        let rom = encode(&sample()?)?;
        assert_eq!(
            rom.image,
            vec![0x00, 0x80, 0x08, 0x61, 0x01, 0xc0, 0x03, 0x80, 0x0d, 0x02]
        );
        assert_eq!(rom.table.len(), 3);
        assert_eq!(rom.decode()?.instructions().count(), 7);
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let ops = sample()?;
        let rom = encode(&ops)?;
        let decoded = rom.decode()?;
        assert!(ops.instructions().eq(decoded.instructions()));
        assert_eq!(encode(&decoded)?, rom);
        Ok(())
    }

    #[test]
    fn test_code_table_exhausted() -> Result<()> {
        let mut ops = OperationList::new();
        let lines = &ControlLine::ALL[8..17];
        for mask in 0..33u32 {
            let set = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, l)| *l);
            ops.add(set)?;
        }
        assert!(encode(&ops).is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_bytes() {
        let table = CodeTable::default();
        assert!(decode(&[0x90], &table).is_err());
        assert!(decode(&[UNUSED_CODE], &table).is_err());
        assert!(decode(&[MUX_PREFIX], &table).is_err());
        assert!(decode(&[MUX_PREFIX, 12 + 2], &table).is_err());
        assert!(decode(&[0x00], &table).is_err());
    }

    #[test]
    fn test_memory_image() {
        let rom = Rom {
            image: vec![0; 513],
            table: CodeTable::default(),
        };
        let image = rom.memory_image();
        assert_eq!(image.len(), 1024);
        assert_eq!(image[513], UNUSED_CODE);

        let rom = Rom {
            image: vec![],
            table: CodeTable::default(),
        };
        assert_eq!(rom.memory_image().len(), 512);
    }
}
