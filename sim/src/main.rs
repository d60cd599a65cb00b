use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use binutils::{clap, verbose};
use clap::{Parser, ValueEnum};
use fsk_sim::{
    analysis, demodulator, encode, encode::hex_dump, output_pattern_from_input,
    settings::SettingsArgs,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Program {
    /// Dual bandpass FSK demodulator
    Demodulator,
    /// Emits a framed bit pattern of every input byte
    Pattern,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// Annotated operation listing
    Listing,
    /// Hex dump of the padded memory image
    Hex,
    /// Raw memory image
    Bin,
    /// Code table followed by the hex dump
    Rom,
}

/// Microcode compiler for the bit-serial FSK demodulator.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
)]
struct Args {
    /// Program to compile
    #[arg(value_enum, default_value_t = Program::Demodulator)]
    program: Program,

    /// Output filename (default is stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Listing)]
    format: Format,

    /// Print the control line bus allocation to stderr
    #[arg(long)]
    plan: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Print logs during compilation
    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    let settings = args.settings.settings();
    let ops = match args.program {
        Program::Demodulator => demodulator(&settings),
        Program::Pattern => output_pattern_from_input(),
    }
    .with_context(|| format!("could not compile {:?}", args.program))?;
    tracing::info!("{} instructions, {} bytes", ops.len(), ops.byte_len());

    if args.plan {
        let plan = analysis::plan(&ops)?;
        eprintln!("{plan}");
    }

    let content = match args.format {
        Format::Listing => ops.to_string().into_bytes(),
        Format::Hex => hex_dump(&encode(&ops)?.memory_image()).into_bytes(),
        Format::Bin => encode(&ops)?.memory_image(),
        Format::Rom => encode(&ops)?.to_string().into_bytes(),
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("could not write file `{}`", path.display()))?;
            println!("writing to file `{}`", path.display());
        }
        None => std::io::stdout()
            .write_all(&content)
            .context("could not write to stdout")?,
    }
    Ok(())
}
