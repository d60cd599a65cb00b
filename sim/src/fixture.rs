//! Binary cross-validation records.
//!
//! Each record is six little-endian 32-bit words: input, upper bandpass,
//! upper envelope, lower bandpass, lower envelope and decision. Values sit in
//! the top `W` bits of their word; the decision is all ones when the upper
//! tone is stronger.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};

use crate::compiler::DEMODULATOR_OUTPUTS;
use crate::fixed::Fixed;
use crate::isa::ALL_BITS;

pub const RECORD_WORDS: usize = 6;
pub const RECORD_BYTES: usize = RECORD_WORDS * 4;
const SHIFT: u32 = 32 - ALL_BITS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Record {
    pub input: Fixed,
    pub upper_bandpass: Fixed,
    pub upper_envelope: Fixed,
    pub lower_bandpass: Fixed,
    pub lower_envelope: Fixed,
    /// Upper tone stronger.
    pub decision: bool,
}

impl Record {
    /// Build a record from one demodulator cycle's outputs.
    pub fn from_outputs(input: Fixed, outputs: &[Fixed]) -> Result<Self> {
        let &[upper_bandpass, upper_envelope, lower_bandpass, lower_envelope, y] = outputs else {
            bail!(
                "expected {DEMODULATOR_OUTPUTS} outputs per input, got {}",
                outputs.len()
            );
        };
        Ok(Self {
            input,
            upper_bandpass,
            upper_envelope,
            lower_bandpass,
            lower_envelope,
            decision: y.sign(),
        })
    }

    pub fn taps(&self) -> [(&'static str, Fixed); 4] {
        [
            ("upper_bandpass", self.upper_bandpass),
            ("upper_envelope", self.upper_envelope),
            ("lower_bandpass", self.lower_bandpass),
            ("lower_envelope", self.lower_envelope),
        ]
    }

    fn to_words(self) -> [u32; RECORD_WORDS] {
        let word = |v: Fixed| (v.bits() as u32) << SHIFT;
        [
            word(self.input),
            word(self.upper_bandpass),
            word(self.upper_envelope),
            word(self.lower_bandpass),
            word(self.lower_envelope),
            if self.decision { !0 } else { 0 },
        ]
    }

    fn from_words(words: [u32; RECORD_WORDS]) -> Self {
        let value = |w: u32| Fixed::from_bits((w >> SHIFT) as u64);
        Self {
            input: value(words[0]),
            upper_bandpass: value(words[1]),
            upper_envelope: value(words[2]),
            lower_bandpass: value(words[3]),
            lower_envelope: value(words[4]),
            decision: (words[5] >> SHIFT) & 1 != 0,
        }
    }
}

pub fn write_records(mut writer: impl Write, records: &[Record]) -> Result<()> {
    for record in records {
        for word in record.to_words() {
            writer.write_all(&word.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn read_records(mut reader: impl Read) -> Result<Vec<Record>> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    ensure!(
        data.len() % RECORD_BYTES == 0,
        "truncated fixture: {} bytes is not a multiple of {RECORD_BYTES}",
        data.len()
    );

    let records = data
        .chunks_exact(RECORD_BYTES)
        .map(|chunk| {
            let mut words = [0u32; RECORD_WORDS];
            for (word, bytes) in words.iter_mut().zip(chunk.chunks_exact(4)) {
                *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            Record::from_words(words)
        })
        .collect();
    Ok(records)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("could not open fixture {}", path.display()))?;
    read_records(std::io::BufReader::new(file))
        .with_context(|| format!("could not read fixture {}", path.display()))
}

pub fn save(path: impl AsRef<Path>, records: &[Record]) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("could not create fixture {}", path.display()))?;
    write_records(std::io::BufWriter::new(file), records)
        .with_context(|| format!("could not write fixture {}", path.display()))
}
