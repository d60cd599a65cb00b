//! Lowering of the filter arithmetic to control-line sequences.
//!
//! Every routine appends to an [`OperationList`]. Results are accumulated in
//! `R` at `2F` fractional bits and rescaled when moved out, so `R` must read
//! zero between filter steps.

use anyhow::{bail, ensure, Result};

use crate::fixed::{Coefficients, Fixed};
use crate::isa::{
    shift_line, DebugOp, MuxCode, Register, ALL_BITS, A_BITS, FRACTIONAL_BITS, R_BITS,
};
use crate::program::OperationList;
use crate::settings::Settings;

use crate::isa::ControlLine::*;

/// Outputs produced by one demodulator cycle.
pub const DEMODULATOR_OUTPUTS: usize = 5;
/// Outputs produced per input by [`output_pattern_from_input`].
pub const PATTERN_OUTPUTS: usize = 11;

impl OperationList {
    /// `R += source * value`. The source register is rotated a full turn and
    /// ends unchanged.
    pub fn fixed_multiply(&mut self, source: Register, value: f64) -> Result<()> {
        let shift_source = shift_line(source)?;
        ensure!(
            !matches!(source, Register::A | Register::R),
            "cannot multiply from {source}"
        );
        let constant = Fixed::from_f64(value)?;
        let negative = constant.sign();
        let mut ivalue = constant.bits();
        if negative {
            ivalue |= ((1 << ALL_BITS) - 1) << ALL_BITS;
        }
        self.comment(format!(
            "multiplication begins: {source} * {value:.6} ({ivalue:04x})"
        ));

        // clear the high half of A
        self.mux(Register::Zero);
        self.add([ShiftARight, RepeatForAllBits])?;

        // a negative constant also adds the low half, so clear it as well
        if negative {
            self.add([ShiftARight, RepeatForAllBits])?;
            self.debug(DebugOp::AssertALowZero);
        }

        self.mux(source);
        self.debug(DebugOp::AssertAHighZero);
        self.add([ShiftARight, shift_source])?;

        let mut next_bit = || {
            ivalue <<= 1;
            ivalue & (1 << A_BITS) != 0
        };

        // shift in the source, stopping before its sign bit
        for _ in 0..ALL_BITS - 2 {
            let mut lines = vec![shift_source, ShiftARight];
            if next_bit() {
                lines.push(AddAToR);
            }
            self.add(lines)?;
        }

        // the source now exposes its sign bit, which extends into A
        for _ in 0..A_BITS - (ALL_BITS - 2) - 1 {
            let mut lines = vec![ShiftARight];
            if next_bit() {
                lines.push(AddAToR);
            }
            self.add(lines)?;
        }

        // last step completes the rotation of the source
        let mut lines = vec![ShiftARight, shift_source];
        if next_bit() {
            lines.push(AddAToR);
        }
        self.add(lines)?;

        self.comment(format!("multiplication complete: {source} * {value:.6}"));
        Ok(())
    }

    /// Drop the fractional bits of `R` and move the next `W` bits to
    /// `target`, leaving `R` zero.
    fn move_r_to(&mut self, target: Register) -> Result<()> {
        let shift_target = shift_line(target)?;
        for _ in 0..FRACTIONAL_BITS {
            self.add([ShiftRRight])?;
        }
        self.mux(Register::R);
        if target == Register::X {
            self.add([SetXInToRegOut])?;
        }
        self.add([ShiftRRight, shift_target, RepeatForAllBits])?;
        for _ in 0..R_BITS - (FRACTIONAL_BITS + ALL_BITS) {
            self.add([ShiftRRight])?;
        }
        self.debug(DebugOp::AssertRZero);
        Ok(())
    }

    /// Copy `source` into `target` over `W` cycles. A source other than
    /// `ZERO` is rotated back to its value.
    pub fn move_reg(&mut self, source: Register, target: Register) -> Result<()> {
        ensure!(source != target, "cannot move {source} to itself");
        match target {
            Register::A | Register::R | Register::Y | Register::Zero | Register::One => {
                bail!("cannot move into {target}")
            }
            _ => {}
        }
        self.comment(format!("move {source} to {target}"));

        match source {
            Register::R => return self.move_r_to(target),
            Register::A | Register::One => bail!("cannot move from {source}"),
            _ => {}
        }
        let shift_target = shift_line(target)?;

        self.mux(source);
        if target == Register::X {
            self.add([SetXInToRegOut])?;
        }
        if source == Register::X {
            self.add([SetXInToXAndClearYBorrow])?;
        }
        if source == Register::Zero {
            self.add([shift_target, RepeatForAllBits])
        } else {
            self.add([shift_target, shift_line(source)?, RepeatForAllBits])
        }
    }

    /// One biquad step: `O1 = I0*b0 + I2*b2 - O1*a1 - O2*a2`, with the old
    /// `O1` moved to `O2`.
    pub fn filter_step(&mut self, c: &Coefficients) -> Result<()> {
        self.debug(DebugOp::AssertRZero);
        self.fixed_multiply(Register::I0, c.b0)?;
        self.fixed_multiply(Register::I2, c.b2)?;
        self.fixed_multiply(Register::O1, -c.a1)?;
        self.fixed_multiply(Register::O2, -c.a2)?;
        self.move_reg(Register::O1, Register::O2)?;
        self.move_reg(Register::R, Register::O1)
    }

    pub fn set_x_to_abs_o1(&mut self) -> Result<()> {
        self.comment("set X = abs(O1)");
        self.mux(Register::O1);
        self.add([SetXInToAbsO1RegOut])?;
        self.add([ShiftXRight, ShiftO1Right, RepeatForAllBits])?;
        self.debug(DebugOp::AssertXIsAbsO1);
        Ok(())
    }

    /// `Y = X - source`, holding `X`.
    pub fn set_y_to_x_minus(&mut self, source: Register) -> Result<()> {
        let shift_source = shift_line(source)?;
        ensure!(
            !matches!(source, Register::X | Register::Y | Register::A | Register::R),
            "cannot subtract {source} from X"
        );
        self.comment(format!("set Y = X - {source}"));
        self.mux(source);
        self.add([SetXInToXAndClearYBorrow])?;
        self.add([ShiftXRight, ShiftYRight, shift_source, RepeatForAllBits])
    }

    /// `L = X` unless `Y` is negative.
    pub fn move_x_to_l_if_y_not_negative(&mut self) -> Result<()> {
        self.comment("if Y >= 0 then set L = X");
        self.mux(MuxCode::LOrX);
        self.add([SetXInToXAndClearYBorrow])?;
        self.add([ShiftLRight, ShiftXRight, RepeatForAllBits])
    }

    /// Decay `L`, then raise it to `abs(O1)` if that is larger.
    pub fn envelope_update(&mut self, decay: f64) -> Result<()> {
        self.comment("decay L");
        self.debug(DebugOp::AssertRZero);
        self.fixed_multiply(Register::L, decay)?;
        self.move_reg(Register::R, Register::L)?;
        self.debug(DebugOp::AssertRZero);

        self.comment("max L");
        self.set_x_to_abs_o1()?;
        self.set_y_to_x_minus(Register::L)?;
        self.debug(DebugOp::AssertXIsAbsO1);
        self.debug(DebugOp::AssertYIsXMinusL);
        self.move_x_to_l_if_y_not_negative()?;

        self.debug(DebugOp::AssertXIsAbsO1);
        self.debug(DebugOp::AssertRZero);
        Ok(())
    }

    /// Load a sample, multiply it by each value in turn, accumulating in `R`,
    /// and send the sum out through `O1`.
    pub fn multiply_accumulate(&mut self, values: &[f64]) -> Result<()> {
        self.comment(format!("multiply accumulate {values:?}"));
        self.debug(DebugOp::AssertRZero);
        for value in values {
            self.add([LoadI0FromInput])?;
            self.fixed_multiply(Register::I0, *value)?;
        }
        self.move_reg(Register::R, Register::O1)?;
        self.debug(DebugOp::SendO1ToOutput);
        Ok(())
    }

    /// As [`Self::multiply_accumulate`], but every operand travels through
    /// other registers and the running sum is rescaled after each product.
    pub fn multiply_accumulate_via_regs(&mut self, values: &[f64]) -> Result<()> {
        self.comment(format!("multiply accumulate via registers {values:?}"));
        self.debug(DebugOp::AssertRZero);
        for value in values {
            self.add([LoadI0FromInput])?;
            self.move_reg(Register::I0, Register::I1)?;
            self.move_reg(Register::I1, Register::I2)?;
            self.fixed_multiply(Register::I2, *value)?;
            self.move_reg(Register::R, Register::O1)?;
            self.move_reg(Register::O1, Register::O2)?;
            self.fixed_multiply(Register::O2, 1.0)?;
        }
        self.debug(DebugOp::SendO1ToOutput);
        Ok(())
    }

    /// Emit the sign of `Y` after shifting in one bit from `source`.
    /// Requires `X` to be zero.
    fn output_bit(&mut self, source: Register) -> Result<()> {
        self.mux(source);
        self.add([SetXInToXAndClearYBorrow])?;
        if source == Register::I0 {
            self.add([ShiftYRight, ShiftI0Right])?;
        } else {
            self.add([ShiftYRight])?;
        }
        self.add([SendYToOutput])
    }
}

/// The two-channel demodulator. Per input sample it outputs the upper
/// bandpass output and level, the lower bandpass output and level, and `Y`,
/// which is negative when the upper tone is stronger.
pub fn demodulator(settings: &Settings) -> Result<OperationList> {
    let mut ops = OperationList::new();
    let decay = settings.decay();

    ops.add([LoadI0FromInput])?;

    // first bank
    ops.comment(format!(
        "bandpass filter for {:.0} Hz",
        settings.upper_frequency
    ));
    ops.filter_step(&settings.upper_filter())?;
    ops.envelope_update(decay)?;
    ops.debug(DebugOp::SendO1ToOutput);
    ops.debug(DebugOp::SendLToOutput);

    // second bank
    ops.mux(MuxCode::BankSwitch);
    ops.comment(format!(
        "bandpass filter for {:.0} Hz",
        settings.lower_frequency
    ));
    ops.filter_step(&settings.lower_filter())?;
    ops.envelope_update(decay)?;
    ops.debug(DebugOp::SendO1ToOutput);
    ops.debug(DebugOp::SendLToOutput);

    // X = lower level, then back to the first bank
    ops.move_reg(Register::L, Register::X)?;
    ops.mux(MuxCode::BankSwitch);

    ops.set_y_to_x_minus(Register::L)?;
    ops.debug(DebugOp::AssertYIsXMinusL);
    ops.add([SendYToOutput])?;

    ops.move_reg(Register::I1, Register::I2)?;
    ops.move_reg(Register::I0, Register::I1)?;
    ops.add([Restart])?;

    tracing::debug!(
        "compiled demodulator: {} instructions, {} bytes",
        ops.len(),
        ops.byte_len()
    );
    Ok(ops)
}

/// Serialize each input byte as a line idle bit, a start bit, eight data
/// bits from the least significant, and a stop bit.
pub fn output_pattern_from_input() -> Result<OperationList> {
    let mut ops = OperationList::new();
    ops.add([LoadI0FromInput])?;
    ops.move_reg(Register::Zero, Register::X)?;

    ops.output_bit(Register::One)?;
    ops.add([RepeatForAllBits])?;

    ops.output_bit(Register::Zero)?;
    for _ in 0..8 {
        ops.output_bit(Register::I0)?;
    }
    ops.output_bit(Register::One)?;

    ops.add([RepeatForAllBits])?;
    ops.add([Restart])?;
    Ok(ops)
}
