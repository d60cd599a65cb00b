//! Offline bus allocation.
//!
//! Control lines that a program only ever asserts in different cycles can
//! share a multiplexer. Groups are formed by repeatedly taking a maximal
//! clique of the "used separately, never together" graph.

use anyhow::{bail, Context, Result};

use crate::isa::{ControlLine, ControlLines, Instruction};
use crate::program::OperationList;

/// Multiplexer groups for the control lines of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusPlan {
    /// Each group also contains an implicit "nothing" input.
    pub groups: Vec<Vec<ControlLine>>,
    pub unused: Vec<ControlLine>,
}

impl std::fmt::Display for BusPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            writeln!(f, "multiplexer {i} has {} inputs", group.len() + 1)?;
            writeln!(f, "  NOTHING")?;
            for line in group {
                writeln!(f, "  {line}")?;
            }
        }
        for line in &self.unused {
            writeln!(f, "unused: {line}")?;
        }
        Ok(())
    }
}

/// First maximal clique found, as a bitmask over `adjacent`.
fn bron_kerbosch(r: u32, mut p: u32, mut x: u32, adjacent: &[u32]) -> Option<u32> {
    if p == 0 && x == 0 {
        return Some(r);
    }
    while p != 0 {
        let v = p.trailing_zeros() as usize;
        let bit = 1 << v;
        if let Some(clique) = bron_kerbosch(r | bit, p & adjacent[v], x & adjacent[v], adjacent) {
            return Some(clique);
        }
        p &= !bit;
        x |= bit;
    }
    None
}

pub fn plan(ops: &OperationList) -> Result<BusPlan> {
    let sets: Vec<ControlLines> = ops
        .instructions()
        .filter_map(|inst| match inst {
            Instruction::Control(lines) => Some(*lines),
            _ => None,
        })
        .collect();

    let (mut remaining, unused): (Vec<ControlLine>, Vec<ControlLine>) = ControlLine::ALL
        .iter()
        .copied()
        .partition(|line| sets.iter().any(|s| s.contains(*line)));

    let mut groups = Vec::new();
    while !remaining.is_empty() {
        let mut adjacent = vec![0u32; remaining.len()];
        for i in 0..remaining.len() {
            for j in i + 1..remaining.len() {
                let (a, b) = (remaining[i], remaining[j]);
                let mut together = false;
                let mut separately = false;
                for s in sets.iter().filter(|s| s.contains(a) || s.contains(b)) {
                    if s.contains(a) && s.contains(b) {
                        together = true;
                    } else {
                        separately = true;
                    }
                }
                if together && !separately {
                    bail!("control lines {a} and {b} are always used together");
                }
                if separately && !together {
                    adjacent[i] |= 1 << j;
                    adjacent[j] |= 1 << i;
                }
            }
        }

        let all = (1u32 << remaining.len()) - 1;
        let clique = bron_kerbosch(0, all, 0, &adjacent).context("no maximal clique")?;
        let (group, rest): (Vec<_>, Vec<_>) = remaining
            .iter()
            .enumerate()
            .partition(|(i, _)| clique & (1 << *i) != 0);
        groups.push(group.into_iter().map(|(_, l)| *l).collect());
        remaining = rest.into_iter().map(|(_, l)| *l).collect();
    }

    tracing::debug!(
        "{} control lines in {} multiplexers, {} unused",
        ControlLine::ALL.len() - unused.len(),
        groups.len(),
        unused.len()
    );
    Ok(BusPlan { groups, unused })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::demodulator;
    use crate::settings::Settings;
    use crate::isa::ControlLine::*;

    #[test]
    fn test_separate_lines_share() -> Result<()> {
        let mut ops = OperationList::new();
        ops.add([ShiftXRight, ShiftYRight])?;
        ops.add([ShiftXRight])?;
        ops.add([ShiftLRight])?;
        ops.add([Restart])?;
        let plan = plan(&ops)?;

        // X and Y share a cycle, L and RESTART never meet either
        assert_eq!(plan.groups[0], vec![Restart, ShiftXRight, ShiftLRight]);
        assert_eq!(plan.groups[1], vec![ShiftYRight]);
        assert_eq!(plan.unused.len(), ControlLine::ALL.len() - 4);
        Ok(())
    }

    #[test]
    fn test_always_together() -> Result<()> {
        let mut ops = OperationList::new();
        ops.add([ShiftXRight, ShiftYRight])?;
        ops.add([Restart])?;
        assert!(plan(&ops).is_err());
        Ok(())
    }

    #[test]
    fn test_demodulator_plan() -> Result<()> {
        let ops = demodulator(&Settings::default())?;
        let plan = plan(&ops)?;
        let assigned: usize = plan.groups.iter().map(Vec::len).sum();
        assert_eq!(assigned + plan.unused.len(), ControlLine::ALL.len());
        for group in &plan.groups {
            for set in ops.instructions().filter_map(|i| match i {
                Instruction::Control(l) => Some(*l),
                _ => None,
            }) {
                assert!(group.iter().filter(|l| set.contains(**l)).count() <= 1);
            }
        }
        Ok(())
    }
}
