//! Error taxonomy for recording and playback
//!
//! Every failure is terminal for the operation that raised it. The UI shows
//! most of them as an alert; see [`AudioError::alert`].

use std::path::PathBuf;
use thiserror::Error;

/// Alert titles shown to the user
pub mod alerts {
    pub const SESSION_ERROR: &str = "Audio Session Error";
    pub const RECORDING_DISABLED: &str = "Recording Disabled";
    pub const RECORDING_DISABLED_MESSAGE: &str =
        "You've disabled this app from recording your microphone. Check Settings.";
    pub const RECORDER_ERROR: &str = "Audio Recorder Error";
    pub const FILE_ERROR: &str = "Audio File Error";
    pub const ENGINE_ERROR: &str = "Audio Engine Error";
    pub const RECORDING_FAILED: &str = "Recording Failed";
    pub const RECORDING_FAILED_MESSAGE: &str = "Something went wrong with your recording.";
}

#[derive(Error, Debug)]
pub enum AudioError {
    /// The capture or output session was refused by the platform
    #[error("audio session could not be configured: {0}")]
    SessionConfig(String),

    /// The session was refused because microphone access is denied
    #[error("microphone access denied: {0}")]
    MicrophoneDenied(String),

    /// The recording destination could not be opened for writing
    #[error("cannot write recording to {}: {source}", path.display())]
    RecorderInit {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// The recorded file is unreadable or corrupt
    #[error("cannot load recording {}: {source}", path.display())]
    FileLoad {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// The processing graph could not start on the output device
    #[error("audio engine failed to start: {0}")]
    EngineStart(String),

    /// Capture ended without producing a usable file
    #[error("recording did not finish successfully: {0}")]
    RecordingIncomplete(String),

    #[error("no recording in progress")]
    NotRecording,
}

impl AudioError {
    /// A session failure, classified as a denial when the platform says so
    pub fn session(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let lower = reason.to_lowercase();
        if ["permission denied", "access denied", "not allowed", "eacces"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            AudioError::MicrophoneDenied(reason)
        } else {
            AudioError::SessionConfig(reason)
        }
    }

    /// The `(title, message)` pair for user display.
    ///
    /// Returns `None` for outcomes that are logged but never alerted.
    pub fn alert(&self) -> Option<(&'static str, String)> {
        let title = match self {
            AudioError::MicrophoneDenied(_) => {
                return Some((alerts::RECORDING_DISABLED, alerts::RECORDING_DISABLED_MESSAGE.to_string()))
            }
            AudioError::SessionConfig(_) => alerts::SESSION_ERROR,
            AudioError::RecorderInit { .. } => alerts::RECORDER_ERROR,
            AudioError::FileLoad { .. } => alerts::FILE_ERROR,
            AudioError::EngineStart(_) => alerts::ENGINE_ERROR,
            AudioError::RecordingIncomplete(_) | AudioError::NotRecording => return None,
        };
        Some((title, self.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_titles() {
        let err = AudioError::EngineStart("no device".into());
        let (title, message) = err.alert().unwrap();
        assert_eq!(title, alerts::ENGINE_ERROR);
        assert!(message.contains("no device"));

        let err = AudioError::RecorderInit {
            path: PathBuf::from("/nope/recordedVoice.wav"),
            source: hound::Error::IoError(std::io::ErrorKind::PermissionDenied.into()),
        };
        assert_eq!(err.alert().unwrap().0, alerts::RECORDER_ERROR);
    }

    #[test]
    fn test_denied_session_gets_its_own_alert() {
        let err = AudioError::session("Failed to connect to PipeWire: Permission denied");
        assert!(matches!(err, AudioError::MicrophoneDenied(_)));
        assert_eq!(
            err.alert(),
            Some((alerts::RECORDING_DISABLED, alerts::RECORDING_DISABLED_MESSAGE.to_string()))
        );

        let err = AudioError::session("Failed to connect to PipeWire: Host is down");
        assert!(matches!(err, AudioError::SessionConfig(_)));
        assert_eq!(err.alert().unwrap().0, alerts::SESSION_ERROR);
    }

    #[test]
    fn test_incomplete_recording_is_not_alerted() {
        assert!(AudioError::RecordingIncomplete("empty".into()).alert().is_none());
        assert!(AudioError::NotRecording.alert().is_none());
    }
}
