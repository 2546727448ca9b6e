use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// A finalized recording on disk
///
/// Immutable once created. A new recording overwrites the same file and
/// produces a fresh clip.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub path: PathBuf,
    pub sample_rate: u32,
    /// Total length in frames
    pub length: u64,
    pub channels: u16,
    pub recorded_at: DateTime<Utc>,
}

impl AudioClip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.length as f64 / self.sample_rate as f64)
    }
}

/// The effect buttons offered on the playback screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectPreset {
    Slow,
    Fast,
    Chipmunk,
    Vader,
    Echo,
    Reverb,
}

/// Slowest and fastest playback rates the time/pitch unit accepts
pub const MIN_RATE: f32 = 1.0 / 32.0;
pub const MAX_RATE: f32 = 32.0;

/// Clamp a playback rate into the supported range; non-finite rates play at 1.0
pub fn clamp_rate(rate: f32) -> f32 {
    if rate.is_finite() {
        rate.clamp(MIN_RATE, MAX_RATE)
    } else {
        1.0
    }
}

/// Resolved effect parameters; `None` leaves the time/pitch unit untouched
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PresetParams {
    pub rate: Option<f32>,
    /// Pitch shift in cents
    pub pitch: Option<f32>,
    pub echo: bool,
    pub reverb: bool,
}

impl PresetParams {
    /// Playback rate used for timing, 1.0 when unset
    pub fn effective_rate(&self) -> f32 {
        self.rate.map_or(1.0, clamp_rate)
    }

    pub fn pitch_cents(&self) -> f32 {
        self.pitch.unwrap_or(0.0)
    }
}

impl EffectPreset {
    pub const ALL: [EffectPreset; 6] = [
        EffectPreset::Slow,
        EffectPreset::Fast,
        EffectPreset::Chipmunk,
        EffectPreset::Vader,
        EffectPreset::Echo,
        EffectPreset::Reverb,
    ];

    pub fn params(self) -> PresetParams {
        let none = PresetParams::default();
        match self {
            EffectPreset::Slow => PresetParams { rate: Some(0.5), ..none },
            EffectPreset::Fast => PresetParams { rate: Some(1.5), ..none },
            EffectPreset::Chipmunk => PresetParams { pitch: Some(1000.0), ..none },
            EffectPreset::Vader => PresetParams { pitch: Some(-1000.0), ..none },
            EffectPreset::Echo => PresetParams { echo: true, ..none },
            EffectPreset::Reverb => PresetParams { reverb: true, ..none },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EffectPreset::Slow => "Slow",
            EffectPreset::Fast => "Fast",
            EffectPreset::Chipmunk => "Chipmunk",
            EffectPreset::Vader => "Vader",
            EffectPreset::Echo => "Echo",
            EffectPreset::Reverb => "Reverb",
        }
    }

    /// Map a front-end button index (0-based) to a preset
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}
