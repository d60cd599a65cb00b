use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use binutils::{clap, verbose};
use clap::Parser;
use fsk_sim::{
    demodulator, fixture, model,
    settings::SettingsArgs,
    test::{compare, Direct, RomImage, Runner},
    Fixed,
};

/// Run the demodulator microprogram against a recorded fixture.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the fixture file
    fixture: PathBuf,

    /// Execute the decoded ROM image instead of the operation list
    #[arg(long)]
    rom: bool,

    /// Only replay the first N samples
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Write a fixture of MESSAGE, modulated and demodulated by the
    /// reference model, instead of running one
    #[arg(long, value_name = "MESSAGE")]
    generate: Option<String>,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Print logs during simulation
    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    let settings = args.settings.settings();

    if let Some(message) = &args.generate {
        let mut records = model::generate_fixture(message.as_bytes(), &settings)?;
        if let Some(limit) = args.limit {
            records.truncate(limit);
        }
        fixture::save(&args.fixture, &records)?;
        println!(
            "writing {} records to file `{}`",
            records.len(),
            args.fixture.display()
        );
        return Ok(());
    }

    let mut records = fixture::load(&args.fixture)?;
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    let runner: Box<dyn Runner> = if args.rom {
        Box::new(RomImage)
    } else {
        Box::new(Direct)
    };
    let ops = demodulator(&settings)?;
    let inputs: Vec<Fixed> = records.iter().map(|r| r.input).collect();
    let outputs = runner
        .run(&ops, &inputs)
        .with_context(|| format!("running demodulator on {} runner", runner.name()))?;

    let report = compare(&records, &outputs)?;
    println!("{report}");
    ensure!(report.accepted(), "demodulator output rejected: {report}");
    Ok(())
}
