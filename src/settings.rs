//! Runtime configuration
//!
//! There is no persisted settings store: everything comes from the command
//! line, with the recording kept at a fixed app-private location.

use std::path::PathBuf;

use crate::audio::CaptureConfig;
use crate::cli::Args;

pub const RECORDING_NAME: &str = "recordedVoice.wav";

#[derive(Debug, Clone)]
pub struct Settings {
    pub recording_path: PathBuf,
    pub capture: CaptureConfig,
}

impl Settings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            recording_path: args
                .recording
                .clone()
                .unwrap_or_else(Self::default_recording_path),
            capture: CaptureConfig {
                sample_rate: args.sample_rate,
                channels: 1,
            },
        }
    }

    /// `~/.local/share/pitchperfect/recordedVoice.wav` on Linux
    pub fn default_recording_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pitchperfect")
            .join(RECORDING_NAME)
    }
}
