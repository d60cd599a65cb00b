//! This module contains the validation suite for the microprograms and for
//! anything that executes them.
//!
//! The suite is written against [`Runner`], so the same checks apply to the
//! direct interpreter, to the decoded ROM image and to any external device
//! that can be driven with a sample stream.

/// On failure, keep the offending listing and bail.
macro_rules! test_ensure {
    ($cond:expr, $ops:expr, $($arg:tt)+) => {
        if !($cond) {
            std::fs::write("test-failure.lst", ($ops).to_string())?;
            anyhow::bail!("test failed: {}", format!($($arg)+));
        }
    };
}

mod diff;

pub use diff::{compare, DiffReport, ACCEPTANCE};

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};

use crate::encode::encode;
use crate::execute::{run_ops, run_rom};
use crate::fixed::Fixed;
use crate::program::OperationList;

/// Something that runs a microprogram over a sample stream.
pub trait Runner {
    fn name(&self) -> &'static str;
    fn run(&self, ops: &OperationList, inputs: &[Fixed]) -> Result<Vec<Fixed>>;
}

/// Interpret the operation list as built.
#[derive(Debug, Default, Clone, Copy)]
pub struct Direct;

impl Runner for Direct {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn run(&self, ops: &OperationList, inputs: &[Fixed]) -> Result<Vec<Fixed>> {
        run_ops(ops, inputs)
    }
}

/// Encode to a ROM image, then execute the decoded image.
#[derive(Debug, Default, Clone, Copy)]
pub struct RomImage;

impl Runner for RomImage {
    fn name(&self) -> &'static str {
        "rom"
    }

    fn run(&self, ops: &OperationList, inputs: &[Fixed]) -> Result<Vec<Fixed>> {
        run_rom(&encode(ops)?, inputs)
    }
}

pub struct Tester<R> {
    runner: R,
    rng: StdRng,
}

impl<R: Runner> Tester<R> {
    pub fn new(runner: R, seed: u64) -> Self {
        Self {
            runner,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Every randomized check `scale * 10` times, plus the fixed cases.
    pub fn test_all(&mut self, scale: usize) -> Result<()> {
        tracing::info!("testing {} runner", self.runner.name());
        self.test_pattern()?;
        self.test_restart()?;
        self.test_multiply_accumulate(scale * 10)?;
        self.test_bandpass_filter(scale * 10)?;
        self.test_max_hold(scale * 10)?;
        self.test_subtractor(scale * 10)?;
        Ok(())
    }
}
