//! Instruction set of the bit-serial filter processor: registers, multiplexer
//! sources, control lines and debug operations, plus the tables relating them.

use anyhow::Result;

pub const FRACTIONAL_BITS: u32 = 14;
pub const NON_FRACTIONAL_BITS: u32 = 2;
/// Width `W` of the general registers.
pub const ALL_BITS: u32 = FRACTIONAL_BITS + NON_FRACTIONAL_BITS;
/// Width of the wide accumulator `A`.
pub const A_BITS: u32 = (FRACTIONAL_BITS * 2) + NON_FRACTIONAL_BITS;
/// Width of the result accumulator `R`.
pub const R_BITS: u32 = A_BITS;

pub const ALL_MASK: u64 = (1 << ALL_BITS) - 1;
pub const A_MASK: u64 = (1 << A_BITS) - 1;
pub const R_MASK: u64 = (1 << R_BITS) - 1;

/// Defines a closed enumeration together with its numeric code and the
/// name used in listings and hardware descriptions.
macro_rules! define_code {
    {
        $(#[$att:meta])*
        pub enum $name:ident {
            $( $(#[$vatt:meta])* $var:ident = $code:literal => $text:literal, )*
        }
    } => {
        $(#[$att])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $(#[$vatt])* $var = $code, )*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$var, )* ];

            pub fn code(self) -> u8 {
                self as u8
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $( $code => Some($name::$var), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$var => $text, )*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $text => Some($name::$var), )*
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_code! {
    /// Architectural registers. Codes below 12 double as multiplexer codes;
    /// the shadow bank has no bus access.
    pub enum Register {
        Zero = 0 => "ZERO",
        R = 1 => "R",
        A = 2 => "A",
        Y = 3 => "Y",
        O1 = 4 => "O1",
        O2 = 5 => "O2",
        X = 6 => "X",
        L = 7 => "L",
        I0 = 8 => "I0",
        I1 = 9 => "I1",
        I2 = 10 => "I2",
        One = 11 => "ONE",
        LS = 12 => "LS",
        O1S = 13 => "O1S",
        O2S = 14 => "O2S",
    }
}

pub const NUM_REGISTERS: usize = Register::ALL.len();

impl Register {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn width(self) -> u32 {
        match self {
            Register::A => A_BITS,
            Register::R => R_BITS,
            _ => ALL_BITS,
        }
    }

    pub fn mask(self) -> u64 {
        (1 << self.width()) - 1
    }

    /// Whether the register can drive the shared bus.
    pub fn is_selectable(self) -> bool {
        !matches!(self, Register::LS | Register::O1S | Register::O2S)
    }
}

const MUX_L_OR_X: u8 = 12;
const MUX_BANK_SWITCH: u8 = 13;

/// Second byte of a multiplexer instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuxCode {
    /// Drive the bus from a register.
    Select(Register),
    /// Select `L` if `Y` is negative, `X` otherwise.
    LOrX,
    /// Swap `(L, O1, O2)` with `(LS, O1S, O2S)`.
    BankSwitch,
}

impl MuxCode {
    pub fn code(self) -> u8 {
        match self {
            MuxCode::Select(reg) => reg.code(),
            MuxCode::LOrX => MUX_L_OR_X,
            MuxCode::BankSwitch => MUX_BANK_SWITCH,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            MUX_L_OR_X => Some(MuxCode::LOrX),
            MUX_BANK_SWITCH => Some(MuxCode::BankSwitch),
            _ => Register::from_code(code)
                .filter(|reg| reg.is_selectable())
                .map(MuxCode::Select),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "L_OR_X" => Some(MuxCode::LOrX),
            "BANK_SWITCH" => Some(MuxCode::BankSwitch),
            _ => Register::from_name(name)
                .filter(|reg| reg.is_selectable())
                .map(MuxCode::Select),
        }
    }
}

impl From<Register> for MuxCode {
    fn from(reg: Register) -> Self {
        MuxCode::Select(reg)
    }
}

impl std::fmt::Display for MuxCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MuxCode::Select(reg) => write!(f, "{reg}"),
            MuxCode::LOrX => f.write_str("L_OR_X"),
            MuxCode::BankSwitch => f.write_str("BANK_SWITCH"),
        }
    }
}

define_code! {
    /// A single control signal, asserted for one clock cycle.
    pub enum ControlLine {
        AddAToR = 0 => "ADD_A_TO_R",
        SetXInToXAndClearYBorrow = 1 => "SET_X_IN_TO_X_AND_CLEAR_Y_BORROW",
        SetXInToRegOut = 2 => "SET_X_IN_TO_REG_OUT",
        SetXInToAbsO1RegOut = 3 => "SET_X_IN_TO_ABS_O1_REG_OUT",
        LoadI0FromInput = 4 => "LOAD_I0_FROM_INPUT",
        SendYToOutput = 5 => "SEND_Y_TO_OUTPUT",
        Restart = 6 => "RESTART",
        ShiftARight = 7 => "SHIFT_A_RIGHT",
        ShiftXRight = 8 => "SHIFT_X_RIGHT",
        ShiftYRight = 9 => "SHIFT_Y_RIGHT",
        ShiftI0Right = 10 => "SHIFT_I0_RIGHT",
        ShiftI1Right = 11 => "SHIFT_I1_RIGHT",
        ShiftI2Right = 12 => "SHIFT_I2_RIGHT",
        ShiftLRight = 13 => "SHIFT_L_RIGHT",
        ShiftO1Right = 14 => "SHIFT_O1_RIGHT",
        ShiftO2Right = 15 => "SHIFT_O2_RIGHT",
        ShiftRRight = 16 => "SHIFT_R_RIGHT",
        RepeatForAllBits = 17 => "REPEAT_FOR_ALL_BITS",
    }
}

define_code! {
    /// Simulator-only operations. They have no effect on the datapath.
    pub enum DebugOp {
        AssertXIsAbsO1 = 0 => "ASSERT_X_IS_ABS_O1",
        AssertAHighZero = 1 => "ASSERT_A_HIGH_ZERO",
        AssertALowZero = 2 => "ASSERT_A_LOW_ZERO",
        AssertRZero = 3 => "ASSERT_R_ZERO",
        AssertYIsXMinusL = 4 => "ASSERT_Y_IS_X_MINUS_L",
        SendO1ToOutput = 5 => "SEND_O1_TO_OUTPUT",
        SendLToOutput = 6 => "SEND_L_TO_OUTPUT",
    }
}

/// Which line shifts which register.
pub const SHIFT_LINES: [(Register, ControlLine); 10] = [
    (Register::A, ControlLine::ShiftARight),
    (Register::X, ControlLine::ShiftXRight),
    (Register::Y, ControlLine::ShiftYRight),
    (Register::I0, ControlLine::ShiftI0Right),
    (Register::I1, ControlLine::ShiftI1Right),
    (Register::I2, ControlLine::ShiftI2Right),
    (Register::L, ControlLine::ShiftLRight),
    (Register::O1, ControlLine::ShiftO1Right),
    (Register::O2, ControlLine::ShiftO2Right),
    (Register::R, ControlLine::ShiftRRight),
];

/// Groups of lines that drive the same next-state input. At most one line
/// of each group may be asserted in a cycle.
pub const EXCLUSIVE_LINES: [&[ControlLine]; 4] = [
    &[
        ControlLine::SetXInToXAndClearYBorrow,
        ControlLine::SetXInToRegOut,
        ControlLine::SetXInToAbsO1RegOut,
    ],
    &[ControlLine::AddAToR, ControlLine::ShiftRRight],
    &[ControlLine::LoadI0FromInput, ControlLine::ShiftI0Right],
    &[ControlLine::Restart, ControlLine::RepeatForAllBits],
];

pub fn shift_line(reg: Register) -> Result<ControlLine> {
    SHIFT_LINES
        .iter()
        .find(|(r, _)| *r == reg)
        .map(|(_, line)| *line)
        .ok_or_else(|| anyhow::anyhow!("register {reg} cannot be shifted"))
}

/// Inverse of [`shift_line`].
pub fn shifted_register(line: ControlLine) -> Option<Register> {
    SHIFT_LINES
        .iter()
        .find(|(_, l)| *l == line)
        .map(|(reg, _)| *reg)
}

/// An unordered set of control lines, asserted together for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlLines(u32);

impl ControlLines {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, line: ControlLine) -> Self {
        self.insert(line);
        self
    }

    pub fn without(self, line: ControlLine) -> Self {
        Self(self.0 & !(1 << line.code()))
    }

    pub fn insert(&mut self, line: ControlLine) {
        self.0 |= 1 << line.code();
    }

    pub fn contains(self, line: ControlLine) -> bool {
        self.0 & (1 << line.code()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Lines in code order.
    pub fn iter(self) -> impl Iterator<Item = ControlLine> {
        ControlLine::ALL
            .iter()
            .copied()
            .filter(move |line| self.contains(*line))
    }

    /// Check the exclusivity table.
    pub fn validate(self) -> Result<()> {
        for group in EXCLUSIVE_LINES {
            let mut asserted = group.iter().filter(|line| self.contains(**line));
            if let (Some(first), Some(second)) = (asserted.next(), asserted.next()) {
                anyhow::bail!("control lines {first} and {second} are mutually exclusive");
            }
        }
        Ok(())
    }
}

impl FromIterator<ControlLine> for ControlLines {
    fn from_iter<T: IntoIterator<Item = ControlLine>>(iter: T) -> Self {
        let mut lines = Self::empty();
        for line in iter {
            lines.insert(line);
        }
        lines
    }
}

impl std::fmt::Display for ControlLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("NOP");
        }
        for (i, line) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(line.name())?;
        }
        Ok(())
    }
}

/// One encodable micro-instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Control(ControlLines),
    Mux(MuxCode),
    Debug(DebugOp),
}

impl Instruction {
    /// Number of bytes in the control store.
    pub fn byte_len(&self) -> usize {
        match self {
            Instruction::Control(_) => 1,
            Instruction::Mux(_) | Instruction::Debug(_) => 2,
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Control(lines) => write!(f, "{lines}"),
            Instruction::Mux(source) => write!(f, "SET MUX {source}"),
            Instruction::Debug(op) => write!(f, "{op}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for reg in Register::ALL {
            assert_eq!(Register::from_code(reg.code()), Some(*reg));
            assert_eq!(Register::from_name(reg.name()), Some(*reg));
        }
        for line in ControlLine::ALL {
            assert_eq!(ControlLine::from_name(line.name()), Some(*line));
        }
        for code in 0..16 {
            if let Some(mux) = MuxCode::from_code(code) {
                assert_eq!(mux.code(), code);
                assert_eq!(MuxCode::from_name(&mux.to_string()), Some(mux));
            }
        }
        assert_eq!(MuxCode::from_code(Register::LS.code()), None);
        assert_eq!(MuxCode::from_code(14), None);
    }

    #[test]
    fn test_shift_table() -> anyhow::Result<()> {
        for (reg, line) in SHIFT_LINES {
            assert_eq!(shift_line(reg)?, line);
            assert_eq!(shifted_register(line), Some(reg));
        }
        assert!(shift_line(Register::Zero).is_err());
        assert!(shift_line(Register::One).is_err());
        Ok(())
    }

    #[test]
    fn test_exclusive_lines() {
        let ok = ControlLines::empty()
            .with(ControlLine::AddAToR)
            .with(ControlLine::ShiftARight)
            .with(ControlLine::ShiftI0Right);
        assert!(ok.validate().is_ok());

        let bad = ok.with(ControlLine::LoadI0FromInput);
        assert!(bad.validate().is_err());

        let bad = ControlLines::empty()
            .with(ControlLine::SetXInToRegOut)
            .with(ControlLine::SetXInToAbsO1RegOut);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_lines_display() {
        let lines: ControlLines = [ControlLine::ShiftRRight, ControlLine::AddAToR]
            .into_iter()
            .collect();
        assert_eq!(lines.to_string(), "ADD_A_TO_R,SHIFT_R_RIGHT");
        assert_eq!(ControlLines::empty().to_string(), "NOP");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.without(ControlLine::AddAToR).len(), 1);
    }

    #[test]
    fn test_instruction_bytes() {
        assert_eq!(Instruction::Control(ControlLines::empty()).byte_len(), 1);
        assert_eq!(Instruction::Mux(MuxCode::LOrX).byte_len(), 2);
        assert_eq!(Instruction::Debug(DebugOp::AssertRZero).byte_len(), 2);
    }
}
