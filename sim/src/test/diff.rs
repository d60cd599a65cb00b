//! Test the demodulator by comparing its outputs with a "ground truth"
//! fixture.

use anyhow::{ensure, Context, Result};

use super::{Runner, Tester};
use crate::compiler::{demodulator, DEMODULATOR_OUTPUTS};
use crate::fixed::Fixed;
use crate::fixture::Record;
use crate::settings::Settings;

/// Fraction of decisions that must agree with the fixture.
pub const ACCEPTANCE: f64 = 0.99;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    pub samples: usize,
    /// Bandpass and envelope taps that differ.
    pub tap_mismatches: usize,
    pub decisions_matched: usize,
}

impl DiffReport {
    pub fn agreement(&self) -> f64 {
        if self.samples == 0 {
            return 1.0;
        }
        self.decisions_matched as f64 / self.samples as f64
    }

    pub fn accepted(&self) -> bool {
        self.tap_mismatches == 0 && self.agreement() >= ACCEPTANCE
    }
}

impl std::fmt::Display for DiffReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bits out of {} matched expectations ({:.2}%), {} tap mismatches",
            self.decisions_matched,
            self.samples,
            self.agreement() * 100.0,
            self.tap_mismatches
        )
    }
}

/// Compare raw demodulator outputs with the fixture they were produced from.
pub fn compare(expect: &[Record], outputs: &[Fixed]) -> Result<DiffReport> {
    ensure!(
        outputs.len() == expect.len() * DEMODULATOR_OUTPUTS,
        "{} outputs for {} samples",
        outputs.len(),
        expect.len()
    );

    let mut report = DiffReport {
        samples: expect.len(),
        ..Default::default()
    };
    for (i, (gt, out)) in expect
        .iter()
        .zip(outputs.chunks(DEMODULATOR_OUTPUTS))
        .enumerate()
    {
        let actual = Record::from_outputs(gt.input, out)?;
        for ((name, e), (_, a)) in gt.taps().into_iter().zip(actual.taps()) {
            if e != a {
                report.tap_mismatches += 1;
                tracing::warn!(
                    "step {i} {name}: expected {:04x} ({e}) got {:04x} ({a})",
                    e.bits(),
                    a.bits()
                );
            }
        }
        if gt.decision == actual.decision {
            report.decisions_matched += 1;
        } else {
            tracing::debug!("step {i}: decision expected {} got {}", gt.decision, actual.decision);
        }
    }
    Ok(report)
}

impl<R: Runner> Tester<R> {
    /// Replay the fixture inputs through the demodulator program.
    pub fn test_demodulator(&self, settings: &Settings, expect: &[Record]) -> Result<DiffReport> {
        let ops = demodulator(settings)?;
        let inputs: Vec<Fixed> = expect.iter().map(|r| r.input).collect();
        let outputs = self
            .runner
            .run(&ops, &inputs)
            .with_context(|| format!("running demodulator on {} runner", self.runner.name()))?;

        let report = compare(expect, &outputs)?;
        tracing::info!("{report}");
        test_ensure!(report.accepted(), ops, "demodulator: {report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(records: &[Record]) -> Vec<Fixed> {
        records
            .iter()
            .flat_map(|r| {
                let y = if r.decision { -1 } else { 1 };
                r.taps()
                    .into_iter()
                    .map(|(_, v)| v)
                    .chain([Fixed::from_i64(y)])
            })
            .collect()
    }

    fn records() -> Vec<Record> {
        (0..200)
            .map(|i| Record {
                input: Fixed::from_i64(i),
                upper_bandpass: Fixed::from_i64(i * 3),
                upper_envelope: Fixed::from_i64(i * 5),
                lower_bandpass: Fixed::from_i64(-i),
                lower_envelope: Fixed::from_i64(i * 7),
                decision: i % 2 == 0,
            })
            .collect()
    }

    #[test]
    fn test_exact_match_accepted() -> Result<()> {
        let expect = records();
        let report = compare(&expect, &outputs(&expect))?;
        assert_eq!(report.tap_mismatches, 0);
        assert_eq!(report.decisions_matched, expect.len());
        assert!(report.accepted());
        Ok(())
    }

    #[test]
    fn test_tap_mismatch_rejected() -> Result<()> {
        let expect = records();
        let mut actual = outputs(&expect);
        // one LSB off in a single upper bandpass output
        actual[DEMODULATOR_OUTPUTS * 10] = Fixed::from_i64(31);
        let report = compare(&expect, &actual)?;
        assert_eq!(report.tap_mismatches, 1);
        assert_eq!(report.agreement(), 1.0);
        assert!(!report.accepted());
        Ok(())
    }

    #[test]
    fn test_decision_agreement() -> Result<()> {
        let expect = records();
        let mut actual = outputs(&expect);
        actual[DEMODULATOR_OUTPUTS - 1] = Fixed::from_i64(1);
        assert!(compare(&expect, &actual)?.accepted());

        // odd records expect the lower tone
        for i in [1, 3, 5] {
            actual[DEMODULATOR_OUTPUTS * i + DEMODULATOR_OUTPUTS - 1] = Fixed::from_i64(-1);
        }
        let report = compare(&expect, &actual)?;
        assert_eq!(report.decisions_matched, expect.len() - 4);
        assert!(!report.accepted());
        assert!(compare(&expect, &actual[1..]).is_err());
        Ok(())
    }
}
