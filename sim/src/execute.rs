//! Cycle-level interpreter of microprograms.
//!
//! Every transition computes a fresh [`State`] from the previous one; all
//! lines asserted in a cycle observe the register values from the start of
//! that cycle.

use std::collections::VecDeque;

use anyhow::{bail, ensure, Context, Result};

use crate::encode::{decode, Rom};
use crate::fixed::Fixed;
use crate::isa::{
    ControlLine, ControlLines, DebugOp, Instruction, MuxCode, Register, ALL_BITS, ALL_MASK,
    A_BITS, NUM_REGISTERS, SHIFT_LINES,
};
use crate::program::OperationList;

/// Input of the `X` shift register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XSelect {
    /// Recirculate `X`.
    #[default]
    PassthroughX,
    PassthroughRegOut,
    /// Two's complement negation of the bus, one bit per cycle.
    NegateRegOut,
}

/// Register file plus the side registers of the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    regs: [u64; NUM_REGISTERS],
    pub x_select: XSelect,
    pub x_borrow: bool,
    pub y_borrow: bool,
    /// Register driving the bus.
    pub mux_select: Register,
    pub repeat_counter: u32,
}

impl Default for State {
    fn default() -> Self {
        let mut regs = [0; NUM_REGISTERS];
        regs[Register::One.index()] = 1;
        Self {
            regs,
            x_select: XSelect::default(),
            x_borrow: false,
            y_borrow: false,
            mux_select: Register::Zero,
            repeat_counter: 0,
        }
    }
}

impl State {
    pub fn get(&self, reg: Register) -> u64 {
        self.regs[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: u64) {
        self.regs[reg.index()] = value & reg.mask();
    }

    /// The low `W` bits of a register as a fixed point number.
    pub fn fixed(&self, reg: Register) -> Fixed {
        Fixed::from_bits(self.get(reg))
    }

    /// Current bus bit.
    pub fn reg_out(&self) -> u64 {
        self.get(self.mux_select) & 1
    }

    /// Registers whose value differs in `other`.
    pub fn changes<'a>(&'a self, other: &'a State) -> impl Iterator<Item = Register> + 'a {
        Register::ALL
            .iter()
            .copied()
            .filter(move |r| self.get(*r) != other.get(*r))
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, reg) in Register::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(if i % 5 == 0 { "\n" } else { " " })?;
            }
            if reg.width() > ALL_BITS {
                write!(f, "{:>3}={:08x}", reg.name(), self.get(*reg))?;
            } else {
                write!(f, "{:>3}={:04x}", reg.name(), self.get(*reg))?;
            }
        }
        write!(
            f,
            "\nmux={} x_select={:?} x_borrow={} y_borrow={} repeat={}",
            self.mux_select,
            self.x_select,
            self.x_borrow as u8,
            self.y_borrow as u8,
            self.repeat_counter
        )
    }
}

/// Input and output sample queues of one run.
#[derive(Debug, Default)]
pub struct Streams {
    input: VecDeque<Fixed>,
    output: Vec<Fixed>,
}

impl Streams {
    pub fn new(input: &[Fixed]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    pub fn output(&self) -> &[Fixed] {
        &self.output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Next,
    /// Execute the same instruction again.
    Repeat,
    Restart,
}

/// One bit of `x - y - borrow`, returning the difference and borrow out.
pub fn subtractor(x: u64, y: u64, borrow: bool) -> (u64, bool) {
    let b = borrow as u64;
    ((x ^ y ^ b) & 1, x < y + b)
}

fn shift_in(value: u64, bit: u64, width: u32) -> u64 {
    (value | (bit << width)) >> 1
}

pub fn execute_control(
    prev: &State,
    lines: ControlLines,
    io: &mut Streams,
) -> Result<(NextStep, State)> {
    let mut next = prev.clone();
    let reg_out = prev.reg_out();

    if lines.contains(ControlLine::AddAToR) {
        next.set(Register::R, prev.get(Register::R) + prev.get(Register::A));
    }
    if lines.contains(ControlLine::SetXInToXAndClearYBorrow) {
        next.x_select = XSelect::PassthroughX;
        next.y_borrow = false;
    }
    if lines.contains(ControlLine::SetXInToRegOut) {
        next.x_select = XSelect::PassthroughRegOut;
    }
    if lines.contains(ControlLine::SetXInToAbsO1RegOut) {
        next.x_select = if prev.fixed(Register::O1).sign() {
            XSelect::NegateRegOut
        } else {
            XSelect::PassthroughRegOut
        };
        next.x_borrow = false;
    }
    if lines.contains(ControlLine::LoadI0FromInput) {
        let Some(sample) = io.input.pop_front() else {
            bail!("no input left to load");
        };
        next.set(Register::I0, sample.bits());
    }
    if lines.contains(ControlLine::SendYToOutput) {
        io.output.push(prev.fixed(Register::Y));
    }

    for (reg, line) in SHIFT_LINES {
        if !lines.contains(line) {
            continue;
        }
        let old = prev.get(reg);
        let value = match reg {
            Register::R => old >> 1,
            Register::A => shift_in(old, reg_out, A_BITS),
            Register::X => {
                let x_in = match prev.x_select {
                    XSelect::PassthroughRegOut => reg_out,
                    XSelect::PassthroughX => old & 1,
                    XSelect::NegateRegOut => {
                        let (d, borrow) = subtractor(0, reg_out, prev.x_borrow);
                        next.x_borrow = borrow;
                        d
                    }
                };
                shift_in(old, x_in, ALL_BITS)
            }
            Register::Y => {
                let x_bit = prev.get(Register::X) & 1;
                let (d, borrow) = subtractor(x_bit, reg_out, prev.y_borrow);
                next.y_borrow = borrow;
                shift_in(old, d, ALL_BITS)
            }
            _ => shift_in(old, reg_out, ALL_BITS),
        };
        next.set(reg, value);
    }

    if lines.contains(ControlLine::RepeatForAllBits) {
        next.repeat_counter = (prev.repeat_counter + 1) % ALL_BITS;
        if next.repeat_counter != 0 {
            return Ok((NextStep::Repeat, next));
        }
    }
    if lines.contains(ControlLine::Restart) {
        return Ok((NextStep::Restart, next));
    }
    Ok((NextStep::Next, next))
}

pub fn execute_mux(prev: &State, source: MuxCode) -> State {
    let mut next = prev.clone();
    match source {
        MuxCode::Select(reg) => next.mux_select = reg,
        MuxCode::LOrX => {
            next.mux_select = if prev.fixed(Register::Y).sign() {
                Register::L
            } else {
                Register::X
            };
        }
        MuxCode::BankSwitch => {
            for (live, shadow) in [
                (Register::L, Register::LS),
                (Register::O1, Register::O1S),
                (Register::O2, Register::O2S),
            ] {
                next.set(live, prev.get(shadow));
                next.set(shadow, prev.get(live));
            }
        }
    }
    next
}

/// Check an invariant or emit a diagnostic tap. Never changes the state.
pub fn execute_debug(state: &State, op: DebugOp, io: &mut Streams) -> Result<()> {
    match op {
        DebugOp::AssertXIsAbsO1 => {
            let o1 = state.fixed(Register::O1);
            let x = state.fixed(Register::X);
            ensure!(
                o1.to_f64().abs() == x.to_f64(),
                "X = {x} is not abs(O1) = abs({o1})"
            );
        }
        DebugOp::AssertAHighZero => {
            ensure!(state.get(Register::A) >> ALL_BITS == 0, "high half of A is not zero")
        }
        DebugOp::AssertALowZero => {
            ensure!(state.get(Register::A) & ALL_MASK == 0, "low half of A is not zero")
        }
        DebugOp::AssertRZero => ensure!(state.get(Register::R) == 0, "R is not zero"),
        DebugOp::AssertYIsXMinusL => {
            let expect = state
                .get(Register::X)
                .wrapping_sub(state.get(Register::L))
                & ALL_MASK;
            ensure!(
                state.get(Register::Y) == expect,
                "Y = {:04x} is not X - L = {expect:04x}",
                state.get(Register::Y)
            );
        }
        DebugOp::SendO1ToOutput => io.output.push(state.fixed(Register::O1)),
        DebugOp::SendLToOutput => io.output.push(state.fixed(Register::L)),
    }
    Ok(())
}

/// Execute one instruction.
pub fn step(prev: &State, inst: &Instruction, io: &mut Streams) -> Result<(NextStep, State)> {
    match inst {
        Instruction::Control(lines) => execute_control(prev, *lines, io),
        Instruction::Mux(source) => Ok((NextStep::Next, execute_mux(prev, *source))),
        Instruction::Debug(op) => {
            execute_debug(prev, *op, io)?;
            Ok((NextStep::Next, prev.clone()))
        }
    }
}

fn is_restart(inst: &Instruction) -> bool {
    matches!(inst, Instruction::Control(lines) if lines.contains(ControlLine::Restart))
}

/// Run `insts` until every input is consumed, returning the outputs.
pub fn run(insts: &[Instruction], inputs: &[Fixed]) -> Result<Vec<Fixed>> {
    ensure!(
        insts.iter().any(is_restart),
        "program must contain RESTART"
    );
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let mut addresses = Vec::with_capacity(insts.len());
    let mut addr = 0;
    for inst in insts {
        addresses.push(addr);
        addr += inst.byte_len();
    }

    let mut io = Streams::new(inputs);
    let mut state = State::default();
    let mut index = 0;
    let mut cycles: u64 = 0;
    let mut pending = io.input.len();

    loop {
        let Some(inst) = insts.get(index) else {
            bail!("execution ran past the end of the program at {addr:#06x}\n{state}");
        };
        let (next_step, next) = step(&state, inst, &mut io).with_context(|| {
            format!(
                "instruction {index} at {:#06x} ({inst}) failed\n{state}",
                addresses[index]
            )
        })?;
        cycles += 1;

        if tracing::enabled!(tracing::Level::TRACE) {
            let changes: Vec<String> = state
                .changes(&next)
                .map(|r| format!("{r}: {:x} -> {:x}", state.get(r), next.get(r)))
                .collect();
            tracing::trace!("{:04x} {inst} {}", addresses[index], changes.join(", "));
        }
        state = next;

        match next_step {
            NextStep::Next => index += 1,
            NextStep::Repeat => {}
            NextStep::Restart => {
                if io.input.is_empty() {
                    break;
                }
                ensure!(
                    io.input.len() < pending,
                    "program restarted without loading an input"
                );
                pending = io.input.len();
                index = 0;
            }
        }
    }

    tracing::debug!(
        "ran {} inputs in {cycles} cycles, {} outputs",
        inputs.len(),
        io.output.len()
    );
    Ok(io.output)
}

pub fn run_ops(ops: &OperationList, inputs: &[Fixed]) -> Result<Vec<Fixed>> {
    let insts: Vec<Instruction> = ops.instructions().copied().collect();
    run(&insts, inputs)
}

/// Decode the ROM image and run it.
pub fn run_rom(rom: &Rom, inputs: &[Fixed]) -> Result<Vec<Fixed>> {
    let insts = decode(&rom.image, &rom.table).context("decoding ROM image")?;
    run(&insts, inputs)
}
