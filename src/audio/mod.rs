//! Audio recording and effect playback
//!
//! This module provides:
//! - Microphone capture via PipeWire, written to a WAV file with hound
//! - A pull-based node graph with time/pitch, echo and reverb stages
//! - The playback engine that runs the graph and stops it at end of clip

mod capture;
mod effects;
mod engine;
mod format;
mod graph;
mod playback;
mod recorder;

#[cfg(test)]
mod testing;

pub use capture::{AudioCapture, CaptureConfig, CaptureDevice};
pub use engine::{PlaybackEngine, PlaybackState, SessionId};
pub use playback::{AudioPlayer, OutputDevice};
pub use recorder::Recorder;
