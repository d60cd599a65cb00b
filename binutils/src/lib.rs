//! Command line plumbing shared by the binaries of this workspace.

pub use clap;

pub mod verbose {
    pub use clap_verbosity_flag::{Level, Verbosity};
}

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Colour scheme of the help messages.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// `-v` flags are shifted by one so that a single `-v` already shows the
/// compiler summaries and `-vvv` shows every executed micro-operation.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr unless `log_file` is given, in which case they are
/// written to it as JSON lines. Calling this twice keeps the first
/// subscriber.
pub fn logging_setup(level: &tracing::Level, log_file: Option<&std::fs::File>) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false);

    let result = match log_file.and_then(|f| f.try_clone().ok()) {
        Some(file) => builder
            .json()
            .with_writer(std::sync::Mutex::new(file))
            .try_init(),
        None => builder
            .with_writer(std::io::stderr)
            .without_time()
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("logging is already set up: {e}");
    }
}
