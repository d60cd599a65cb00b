//! This module parses microprogram listings back into operation lists.
use anyhow::{bail, Context, Result};

use pest::Parser;
use pest_derive::Parser;

use crate::isa::{ControlLine, ControlLines, DebugOp, Instruction, MuxCode};
use crate::program::OperationList;

#[derive(Parser)]
#[grammar = "src/listing.pest"] // relative to the package root
pub struct ListingParser;

pub fn parse(src: &str) -> Result<pest::iterators::Pairs<'_, Rule>> {
    let mut pairs = ListingParser::parse(Rule::main, src).context("fail to parse listing")?;
    let main = pairs.next().context("empty parse tree")?;
    Ok(main.into_inner())
}

fn ident_inst(names: &[&str]) -> Result<Instruction> {
    if let [name] = names {
        if let Some(op) = DebugOp::from_name(name) {
            return Ok(Instruction::Debug(op));
        }
    }
    let mut lines = ControlLines::empty();
    for name in names {
        let Some(line) = ControlLine::from_name(name) else {
            bail!("unknown control line {name}");
        };
        lines.insert(line);
    }
    Ok(Instruction::Control(lines))
}

/// Rebuild an operation list from its listing. Addresses in the text are
/// ignored.
pub fn assemble(src: &str) -> Result<OperationList> {
    let mut ops = OperationList::new();

    for line in parse(src)?.filter(|p| p.as_rule() == Rule::line) {
        let (row, _) = line.line_col();
        let Some(pair) = line.into_inner().find(|p| p.as_rule() != Rule::address) else {
            continue;
        };
        match pair.as_rule() {
            Rule::comment => {
                let text = pair.into_inner().next().map_or("", |p| p.as_str());
                ops.comment(text);
            }
            Rule::mux => {
                let name = pair.into_inner().next().map_or("", |p| p.as_str());
                let source = MuxCode::from_name(name)
                    .with_context(|| format!("line {row}: unknown mux source {name}"))?;
                ops.mux(source);
            }
            Rule::nop => ops.nop(),
            Rule::lines => {
                let names: Vec<&str> = pair.into_inner().map(|p| p.as_str()).collect();
                let inst = ident_inst(&names).with_context(|| format!("line {row}"))?;
                ops.push(inst).with_context(|| format!("line {row}"))?;
            }
            rule => bail!("line {row}: unexpected {rule:?}"),
        }
    }
    tracing::debug!("assembled {} instructions", ops.len());
    Ok(ops)
}
