//! PitchPerfect - record a voice clip and play it back through effects
//!
//! This is the main entry point for the PitchPerfect terminal recorder.

mod app;
mod audio;
mod cli;
mod error;
mod events;
mod models;
mod settings;
mod tokio_runtime;

use anyhow::Context;
use app::App;
use audio::{AudioCapture, AudioPlayer, PlaybackEngine, Recorder};
use clap::Parser;
use events::Notifier;
use log::{error, info};
use settings::Settings;

fn main() {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting PitchPerfect");

    if let Err(e) = run(Settings::from_args(&args)) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(settings: Settings) -> anyhow::Result<()> {
    let runtime = tokio_runtime::build().context("Failed to start the event loop")?;

    runtime.block_on(async move {
        let (notifier, events) = Notifier::channel();
        let recorder = Recorder::new(
            AudioCapture::new(),
            settings.recording_path,
            settings.capture,
            notifier.clone(),
        );
        let engine = PlaybackEngine::new(AudioPlayer::new(), notifier);

        App::new(recorder, engine, events).run().await
    })
}
