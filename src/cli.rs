//! Command-line interface for PitchPerfect
//!
//! Handles argument parsing and logging configuration.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// PitchPerfect - record your voice and play it back with effects
#[derive(Parser, Debug)]
#[command(name = "pitchperfect")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = also PipeWire internals
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Where to store the recording (overwritten on every take)
    #[arg(long, value_name = "PATH")]
    pub recording: Option<PathBuf>,

    /// Capture sample rate in Hz
    #[arg(long, value_name = "HZ", default_value_t = 44100,
          value_parser = clap::value_parser!(u32).range(8000..=192000))]
    pub sample_rate: u32,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Keep dependencies quiet unless asked
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("pitchperfect", args.log_level());

    if args.verbose >= 4 {
        builder.filter_module("pipewire", args.log_level());
        builder.filter_module("libspa", args.log_level());
    }

    builder.format_timestamp_millis().init();
}
