//! Fixed-point values as held by the general registers, and the biquad
//! bandpass design that produces the filter constants.

use anyhow::{ensure, Result};

use crate::isa::{ALL_BITS, ALL_MASK, FRACTIONAL_BITS};

const SCALE: f64 = (1u64 << FRACTIONAL_BITS) as f64;
const SIGN_BIT: u64 = 1 << (ALL_BITS - 1);

/// A `W`-bit two's complement number with `F` fractional bits, covering
/// `[-2, 2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fixed(u64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    /// One unit in the last place.
    pub const EPSILON: f64 = 1.0 / SCALE;

    /// Round half away from zero. Fails if `|x| >= 2`.
    pub fn from_f64(x: f64) -> Result<Self> {
        ensure!(x.abs() < 2.0, "fixed point value {x} out of range");
        let scaled = (x * SCALE).round() as i64;
        let limit = 1i64 << (ALL_BITS - 1);
        ensure!(
            (-limit..limit).contains(&scaled),
            "fixed point value {x} rounds out of range"
        );
        Ok(Self::from_i64(scaled))
    }

    /// Interpret the low `W` bits of `bits`.
    pub fn from_bits(bits: u64) -> Self {
        Self(bits & ALL_MASK)
    }

    /// Wrap a signed integer count of LSBs to `W` bits.
    pub fn from_i64(value: i64) -> Self {
        Self(value as u64 & ALL_MASK)
    }

    /// Scale a 16-bit PCM sample to amplitude +-0.5.
    pub fn from_pcm(sample: i16) -> Self {
        Self::from_i64((sample as i64) >> 2)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn to_i64(self) -> i64 {
        if self.sign() {
            self.0 as i64 - (1 << ALL_BITS)
        } else {
            self.0 as i64
        }
    }

    pub fn to_f64(self) -> f64 {
        self.to_i64() as f64 / SCALE
    }

    /// True if negative.
    pub fn sign(self) -> bool {
        self.0 & SIGN_BIT != 0
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.to_f64())
    }
}

/// Biquad constants, already normalized by `a0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b2: f64,
}

impl Coefficients {
    /// Round every coefficient to the representable grid.
    pub fn quantize(&self) -> Result<Self> {
        let q = |x: f64| Fixed::from_f64(x).map(Fixed::to_f64);
        Ok(Self {
            a1: q(self.a1)?,
            a2: q(self.a2)?,
            b0: q(self.b0)?,
            b2: q(self.b2)?,
        })
    }
}

/// Constant 0 dB peak gain bandpass centered on `frequency`, `width` Hz wide.
pub fn bandpass_coefficients(sample_rate: f64, frequency: f64, width: f64) -> Coefficients {
    let w0 = 2.0 * std::f64::consts::PI * frequency / sample_rate;
    let q = frequency / width;
    let alpha = w0.sin() / (2.0 * q);

    let a0 = 1.0 + alpha;
    Coefficients {
        a1: -2.0 * w0.cos() / a0,
        a2: (1.0 - alpha) / a0,
        b0: alpha / a0,
        b2: -alpha / a0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion() -> Result<()> {
        assert_eq!(Fixed::from_f64(1.0)?.bits(), 1 << FRACTIONAL_BITS);
        assert_eq!(Fixed::from_f64(-1.0)?.bits(), 0xc000);
        assert_eq!(Fixed::from_f64(-2.0 + Fixed::EPSILON / 4.0)?.to_i64(), -(1 << 15));
        assert_eq!(Fixed::from_f64(0.5)?.to_f64(), 0.5);
        assert!(Fixed::from_f64(-0.25)?.sign());
        assert!(!Fixed::from_f64(0.25)?.sign());
        Ok(())
    }

    #[test]
    fn test_rounding_half_away_from_zero() -> Result<()> {
        let half = Fixed::EPSILON / 2.0;
        assert_eq!(Fixed::from_f64(half)?.to_i64(), 1);
        assert_eq!(Fixed::from_f64(-half)?.to_i64(), -1);
        assert_eq!(Fixed::from_f64(3.0 * half)?.to_i64(), 2);
        Ok(())
    }

    #[test]
    fn test_out_of_range() {
        assert!(Fixed::from_f64(2.0).is_err());
        assert!(Fixed::from_f64(-2.0).is_err());
        assert!(Fixed::from_f64(2.0 - Fixed::EPSILON / 4.0).is_err());
        assert!(Fixed::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_pcm() {
        assert_eq!(Fixed::from_pcm(32767).to_f64(), 8191.0 / SCALE);
        assert_eq!(Fixed::from_pcm(-32768).to_f64(), -0.5);
        assert_eq!(Fixed::from_bits(0x1_0001), Fixed::from_i64(1));
    }

    #[test]
    fn test_bandpass() -> Result<()> {
        let c = bandpass_coefficients(48000.0, 1270.0, 100.0);
        // unity gain at the center frequency
        let w = 2.0 * std::f64::consts::PI * 1270.0 / 48000.0;
        let (re1, im1) = (w.cos(), -w.sin());
        let (re2, im2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num = (c.b0 + c.b2 * re2, c.b2 * im2);
        let den = (1.0 + c.a1 * re1 + c.a2 * re2, c.a1 * im1 + c.a2 * im2);
        let gain = (num.0.hypot(num.1)) / (den.0.hypot(den.1));
        assert!((gain - 1.0).abs() < 1e-9, "gain {gain}");
        assert_eq!(c.b0, -c.b2);

        let q = c.quantize()?;
        assert!((q.a1 - c.a1).abs() <= Fixed::EPSILON / 2.0);
        Ok(())
    }
}
