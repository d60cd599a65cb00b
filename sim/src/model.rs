//! Word-level reference model of the demodulator and an FSK signal source.
//!
//! The model computes with whole integers what the microprogram computes one
//! bit at a time: products are summed at full precision, floored to `F`
//! fractional bits and wrapped to `W` bits.

use anyhow::Result;

use crate::fixed::{Coefficients, Fixed};
use crate::fixture::Record;
use crate::isa::FRACTIONAL_BITS;
use crate::settings::Settings;

/// Wrap to a `W`-bit signed value.
fn wrap(value: i64) -> i64 {
    Fixed::from_i64(value).to_i64()
}

fn quantize(value: f64) -> Result<i64> {
    Ok(Fixed::from_f64(value)?.to_i64())
}

/// `sum(a * b) >> F`, as moved out of `R`.
fn rescale(products: &[(i64, i64)]) -> i64 {
    let sum: i64 = products.iter().map(|(a, b)| a * b).sum();
    wrap(sum >> FRACTIONAL_BITS)
}

/// Filter constants as multiplied by the hardware.
#[derive(Debug, Clone, Copy)]
struct FilterConstants {
    b0: i64,
    b2: i64,
    neg_a1: i64,
    neg_a2: i64,
}

impl FilterConstants {
    fn new(c: &Coefficients) -> Result<Self> {
        Ok(Self {
            b0: quantize(c.b0)?,
            b2: quantize(c.b2)?,
            neg_a1: quantize(-c.a1)?,
            neg_a2: quantize(-c.a2)?,
        })
    }
}

/// One bank: bandpass filter followed by the envelope tracker.
#[derive(Debug, Clone)]
pub struct ChannelModel {
    filter: FilterConstants,
    decay: i64,
    o1: i64,
    o2: i64,
    level: i64,
}

impl ChannelModel {
    pub fn new(c: &Coefficients, decay: f64) -> Result<Self> {
        Ok(Self {
            filter: FilterConstants::new(c)?,
            decay: quantize(decay)?,
            o1: 0,
            o2: 0,
            level: 0,
        })
    }

    /// Biquad step. Returns the new output.
    pub fn filter_step(&mut self, i0: i64, i2: i64) -> i64 {
        let f = &self.filter;
        let o0 = rescale(&[
            (i0, f.b0),
            (i2, f.b2),
            (self.o1, f.neg_a1),
            (self.o2, f.neg_a2),
        ]);
        self.o2 = self.o1;
        self.o1 = o0;
        o0
    }

    /// Decay the level, then hold the maximum of it and `abs(O1)`.
    pub fn envelope_update(&mut self) -> i64 {
        self.level = rescale(&[(self.level, self.decay)]);
        let x = if self.o1 < 0 { wrap(-self.o1) } else { self.o1 };
        if wrap(x - self.level) >= 0 {
            self.level = x;
        }
        self.level
    }
}

/// The complete two-channel demodulator.
#[derive(Debug, Clone)]
pub struct DemodulatorModel {
    upper: ChannelModel,
    lower: ChannelModel,
    i1: i64,
    i2: i64,
}

impl DemodulatorModel {
    pub fn new(settings: &Settings) -> Result<Self> {
        let decay = settings.decay();
        Ok(Self {
            upper: ChannelModel::new(&settings.upper_filter(), decay)?,
            lower: ChannelModel::new(&settings.lower_filter(), decay)?,
            i1: 0,
            i2: 0,
        })
    }

    pub fn step(&mut self, input: Fixed) -> Record {
        let i0 = input.to_i64();
        let upper_bandpass = self.upper.filter_step(i0, self.i2);
        let upper_envelope = self.upper.envelope_update();
        let lower_bandpass = self.lower.filter_step(i0, self.i2);
        let lower_envelope = self.lower.envelope_update();
        self.i2 = self.i1;
        self.i1 = i0;

        Record {
            input,
            upper_bandpass: Fixed::from_i64(upper_bandpass),
            upper_envelope: Fixed::from_i64(upper_envelope),
            lower_bandpass: Fixed::from_i64(lower_bandpass),
            lower_envelope: Fixed::from_i64(lower_envelope),
            decision: wrap(lower_envelope - upper_envelope) < 0,
        }
    }

    pub fn run(&mut self, inputs: &[Fixed]) -> Vec<Record> {
        inputs.iter().map(|input| self.step(*input)).collect()
    }
}

const AMPLITUDE: f64 = 32766.0;
const LEAD_IN_BITS: usize = 16;

/// Line bits of an asynchronous serial frame for each byte, preceded by an
/// idle mark.
pub fn frame_bits(message: &[u8]) -> Vec<bool> {
    let mut bits = vec![true; LEAD_IN_BITS];
    for byte in message {
        bits.push(false);
        bits.extend((0..8).map(|i| byte >> i & 1 != 0));
        bits.push(true);
    }
    bits
}

/// Continuous phase FSK at 16-bit PCM. A mark is sent at the upper tone.
pub fn modulate(message: &[u8], settings: &Settings) -> Vec<i16> {
    let bits = frame_bits(message);
    let samples_per_bit = settings.samples_per_bit();
    let step = |frequency: f64| 2.0 * std::f64::consts::PI * frequency / settings.sample_rate;

    let mut samples = Vec::new();
    let mut phase = 0.0f64;
    for (k, bit) in bits.iter().enumerate() {
        let start = (k as f64 * samples_per_bit) as usize;
        let end = ((k + 1) as f64 * samples_per_bit) as usize;
        let delta = if *bit {
            step(settings.upper_frequency)
        } else {
            step(settings.lower_frequency)
        };
        for _ in start..end {
            samples.push((AMPLITUDE * phase.sin()).round() as i16);
            phase = (phase + delta) % (2.0 * std::f64::consts::PI);
        }
    }
    samples
}

/// Modulate `message` and record the model's response to it.
pub fn generate_fixture(message: &[u8], settings: &Settings) -> Result<Vec<Record>> {
    let inputs: Vec<Fixed> = modulate(message, settings)
        .into_iter()
        .map(Fixed::from_pcm)
        .collect();
    let records = DemodulatorModel::new(settings)?.run(&inputs);
    tracing::debug!(
        "generated {} records for {} message bytes",
        records.len(),
        message.len()
    );
    Ok(records)
}
