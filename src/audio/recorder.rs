//! Voice recording to a WAV file using hound
//!
//! Captured samples stream straight into a 32-bit float WAV at a fixed
//! location; each new recording overwrites the previous one.

use hound::{WavSpec, WavWriter};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::capture::{CaptureConfig, CaptureDevice, SampleSink};
use crate::error::{AudioError, Result};
use crate::events::{Notifier, UiEvent};
use crate::models::AudioClip;

/// The file being written by an active recording
struct Take {
    writer: Option<WavWriter<BufWriter<File>>>,
    frames: u64,
    /// First write failure; marks the recording unsuccessful
    failure: Option<String>,
}

impl Take {
    fn write(&mut self, samples: &[f32]) {
        if self.failure.is_some() {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        for &sample in samples {
            if let Err(e) = writer.write_sample(sample) {
                self.failure = Some(format!("Failed to write sample: {}", e));
                return;
            }
        }
        self.frames += samples.len() as u64;
    }
}

/// Records the microphone into a single clip
pub struct Recorder<C: CaptureDevice> {
    device: C,
    config: CaptureConfig,
    spec: WavSpec,
    destination: PathBuf,
    notifier: Notifier,
    take: Option<Arc<Mutex<Take>>>,
}

impl<C: CaptureDevice> Recorder<C> {
    pub fn new(device: C, destination: PathBuf, config: CaptureConfig, notifier: Notifier) -> Self {
        let spec = WavSpec {
            channels: config.channels,
            sample_rate: config.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        Self {
            device,
            config,
            spec,
            destination,
            notifier,
            take: None,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_recording(&self) -> bool {
        self.take.is_some()
    }

    /// Start recording, replacing any previous clip.
    ///
    /// On failure the UI gets an alert and capture is left inactive.
    pub fn start(&mut self) -> Result<()> {
        if self.is_recording() {
            warn!("Recording already in progress, discarding it");
            self.device.deactivate();
            self.take = None;
        }

        match self.begin() {
            Ok(take) => {
                self.take = Some(take);
                info!("Recording to {}", self.destination.display());
                self.notifier.send(UiEvent::RecordingStarted);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.notifier.alert(&e);
                Err(e)
            }
        }
    }

    fn begin(&mut self) -> Result<Arc<Mutex<Take>>> {
        self.device.activate(&self.config)?;

        let writer = match open_writer(&self.destination, self.spec) {
            Ok(writer) => writer,
            Err(e) => {
                self.device.deactivate();
                return Err(e);
            }
        };

        let take = Arc::new(Mutex::new(Take {
            writer: Some(writer),
            frames: 0,
            failure: None,
        }));

        let sink_take = take.clone();
        let sink: SampleSink = Box::new(move |samples: &[f32]| {
            if let Ok(mut take) = sink_take.lock() {
                take.write(samples);
            }
        });

        if let Err(e) = self.device.start(sink) {
            self.device.deactivate();
            return Err(e);
        }

        Ok(take)
    }

    /// Finalize the recording and hand back the clip.
    ///
    /// Must only follow a successful [`Recorder::start`]; otherwise this is a
    /// no-op returning [`AudioError::NotRecording`].
    pub fn stop(&mut self) -> Result<AudioClip> {
        let Some(take) = self.take.take() else {
            error!("stop() called with no recording in progress");
            return Err(AudioError::NotRecording);
        };

        if self.device.is_active() {
            self.device.deactivate();
        } else {
            warn!("Capture session ended before stop");
        }

        let (writer, frames, failure) = {
            let mut take = take.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            (take.writer.take(), take.frames, take.failure.take())
        };

        let outcome = match (writer, failure) {
            (_, Some(failure)) => Err(AudioError::RecordingIncomplete(failure)),
            (None, None) => Err(AudioError::RecordingIncomplete("Recording file was lost".to_string())),
            (Some(writer), None) => writer
                .finalize()
                .map_err(|e| AudioError::RecordingIncomplete(format!("Failed to finalize WAV file: {}", e)))
                .and_then(|()| {
                    if frames == 0 {
                        Err(AudioError::RecordingIncomplete("No audio was captured".to_string()))
                    } else {
                        Ok(self.clip(frames))
                    }
                }),
        };

        match &outcome {
            Ok(clip) => {
                info!(
                    "Recording finished: {} frames ({:.2}s)",
                    clip.length,
                    clip.duration().as_secs_f64()
                );
                self.notifier.send(UiEvent::RecordingFinished(clip.clone()));
            }
            Err(e) => {
                warn!("Recording was not successful: {}", e);
                self.notifier.send(UiEvent::RecordingFailed(e.to_string()));
            }
        }

        outcome
    }

    fn clip(&self, frames: u64) -> AudioClip {
        AudioClip {
            path: self.destination.clone(),
            sample_rate: self.spec.sample_rate,
            length: frames / self.spec.channels.max(1) as u64,
            channels: self.spec.channels,
            recorded_at: chrono::Utc::now(),
        }
    }
}

/// Create (or truncate) the destination WAV
fn open_writer(path: &Path, spec: WavSpec) -> Result<WavWriter<BufWriter<File>>> {
    let init_error = |source: hound::Error| AudioError::RecorderInit {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| init_error(hound::Error::IoError(e)))?;
    }

    debug!("Opening {} for writing", path.display());
    WavWriter::create(path, spec).map_err(init_error)
}

/// Load a WAV file as mono samples
///
/// Returns the samples and sample rate. Multi-channel files are mixed down.
pub fn read_mono(path: impl AsRef<Path>) -> std::result::Result<(Vec<f32>, u32), hound::Error> {
    let reader = hound::WavReader::open(path.as_ref())?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono = if channels == 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeCapture;
    use crate::error::alerts;
    use crate::events::{drain, Notifier};

    fn recorder(
        fake: &FakeCapture,
        destination: PathBuf,
    ) -> (
        Recorder<FakeCapture>,
        tokio::sync::mpsc::UnboundedReceiver<UiEvent>,
    ) {
        let (notifier, rx) = Notifier::channel();
        let config = CaptureConfig {
            sample_rate: 16000,
            channels: 1,
        };
        (Recorder::new(fake.clone(), destination, config, notifier), rx)
    }

    #[test]
    fn test_record_and_stop_produces_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordedVoice.wav");
        let fake = FakeCapture::new();
        let (mut rec, mut rx) = recorder(&fake, path.clone());

        rec.start().unwrap();
        assert!(fake.is_capturing());
        fake.feed(&[0.25; 8000]);
        fake.feed(&[-0.25; 8000]);
        let clip = rec.stop().unwrap();

        assert!(!fake.is_active());
        assert_eq!(clip.path, path);
        assert_eq!(clip.length, 16000);
        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.channels, 1);

        let (samples, rate) = read_mono(&path).unwrap();
        assert_eq!(rate, 16000);
        assert_eq!(samples.len(), 16000);
        assert_eq!(samples[0], 0.25);
        assert_eq!(samples[15999], -0.25);

        let events = drain(&mut rx);
        assert_eq!(events, vec![UiEvent::RecordingStarted, UiEvent::RecordingFinished(clip)]);
    }

    #[test]
    fn test_new_recording_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordedVoice.wav");
        let fake = FakeCapture::new();
        let (mut rec, _rx) = recorder(&fake, path.clone());

        rec.start().unwrap();
        fake.feed(&[0.1; 32000]);
        rec.stop().unwrap();

        rec.start().unwrap();
        fake.feed(&[0.2; 4000]);
        let clip = rec.stop().unwrap();

        assert_eq!(clip.length, 4000);
        let (samples, _) = read_mono(&path).unwrap();
        assert_eq!(samples.len(), 4000);
    }

    #[test]
    fn test_unwritable_destination_reports_recorder_init() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let fake = FakeCapture::new();
        let (mut rec, mut rx) = recorder(&fake, blocker.join("recordedVoice.wav"));

        let err = rec.start().unwrap_err();
        assert!(matches!(err, AudioError::RecorderInit { .. }));
        assert!(!rec.is_recording());
        assert!(!fake.is_active());
        assert!(!fake.is_capturing());

        match drain(&mut rx).as_slice() {
            [UiEvent::Alert { title, .. }] => assert_eq!(title, alerts::RECORDER_ERROR),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_denied_microphone_reports_recording_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordedVoice.wav");
        let fake = FakeCapture::denying();
        let (mut rec, mut rx) = recorder(&fake, path.clone());

        let err = rec.start().unwrap_err();
        assert!(matches!(err, AudioError::MicrophoneDenied(_)));
        assert!(!path.exists());
        assert!(!fake.is_capturing());

        match drain(&mut rx).as_slice() {
            [UiEvent::Alert { title, message }] => {
                assert_eq!(title, alerts::RECORDING_DISABLED);
                assert_eq!(message, alerts::RECORDING_DISABLED_MESSAGE);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_unavailable_session_reports_session_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordedVoice.wav");
        let fake = FakeCapture::unavailable();
        let (mut rec, mut rx) = recorder(&fake, path.clone());

        let err = rec.start().unwrap_err();
        assert!(matches!(err, AudioError::SessionConfig(_)));
        assert!(!path.exists());
        assert!(!fake.is_active());

        match drain(&mut rx).as_slice() {
            [UiEvent::Alert { title, .. }] => assert_eq!(title, alerts::SESSION_ERROR),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_stop_without_start_is_guarded() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeCapture::new();
        let (mut rec, mut rx) = recorder(&fake, dir.path().join("recordedVoice.wav"));

        assert!(matches!(rec.stop(), Err(AudioError::NotRecording)));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_empty_recording_fails_without_alert() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeCapture::new();
        let (mut rec, mut rx) = recorder(&fake, dir.path().join("recordedVoice.wav"));

        rec.start().unwrap();
        let err = rec.stop().unwrap_err();
        assert!(matches!(err, AudioError::RecordingIncomplete(_)));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], UiEvent::RecordingFailed(_)));
    }

    #[test]
    fn test_read_mono_mixes_down_int_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, rate) = read_mono(&path).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(samples.len(), 100);
        assert!((samples[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_read_mono_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not a wav file").unwrap();
        assert!(read_mono(&path).is_err());
    }
}
