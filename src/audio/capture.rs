//! Microphone capture
//!
//! [`CaptureDevice`] is the seam between the recorder and the platform. The
//! production implementation, [`AudioCapture`], runs a PipeWire capture
//! stream on its own loop thread and hands every buffer to a sink.

use log::{debug, info, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::pod::Pod;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::format::{f32_format_pod, update_format, STREAM_READY_TIMEOUT};
use crate::error::{AudioError, Result};

/// Receives mono `f32` samples as they are captured
pub type SampleSink = Box<dyn FnMut(&[f32]) + Send>;

/// Audio capture configuration
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
        }
    }
}

pub trait CaptureDevice {
    /// Prepare the capture session. Fails when the microphone is refused.
    fn activate(&mut self, config: &CaptureConfig) -> Result<()>;

    /// Begin delivering samples to `sink`.
    fn start(&mut self, sink: SampleSink) -> Result<()>;

    /// Stop delivery and release the session. Safe to call when inactive.
    fn deactivate(&mut self);

    fn is_active(&self) -> bool;
}

enum PipeWireCommand {
    Stop,
}

/// Audio capture using PipeWire
pub struct AudioCapture {
    config: Option<CaptureConfig>,
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<PipeWireCommand>>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self {
            config: None,
            is_running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            sender: None,
        }
    }
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for AudioCapture {
    fn activate(&mut self, config: &CaptureConfig) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(AudioError::SessionConfig("Capture already running".to_string()));
        }
        probe_session().map_err(AudioError::session)?;
        debug!(
            "Capture session ready: {} Hz, {} channel(s)",
            config.sample_rate, config.channels
        );
        self.config = Some(config.clone());
        Ok(())
    }

    fn start(&mut self, sink: SampleSink) -> Result<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| AudioError::SessionConfig("Capture session not active".to_string()))?;

        let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();
        let is_running = self.is_running.clone();
        is_running.store(true, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            if let Err(e) = run_capture_loop(config, sink, receiver, ready_tx.clone()) {
                let _ = ready_tx.send(Err(e));
            }
            is_running.store(false, Ordering::SeqCst);
        });

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => {
                self.sender = Some(sender);
                self.thread_handle = Some(handle);
                info!("Microphone capture started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = sender.send(PipeWireCommand::Stop);
                let _ = handle.join();
                Err(AudioError::session(e))
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = sender.send(PipeWireCommand::Stop);
                let _ = handle.join();
                Err(AudioError::SessionConfig(
                    "Capture stream never started; is a microphone available?".to_string(),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(AudioError::SessionConfig("Capture thread exited".to_string()))
            }
        }
    }

    fn deactivate(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PipeWireCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("Microphone capture stopped");
        }
        self.is_running.store(false, Ordering::SeqCst);
        self.config = None;
    }

    fn is_active(&self) -> bool {
        self.config.is_some() || self.is_running.load(Ordering::SeqCst)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Check that a PipeWire session can be opened from this process
fn probe_session() -> std::result::Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;
    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;
    let _core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    Ok(())
}

/// Run the PipeWire capture loop until a stop command arrives
fn run_capture_loop(
    config: CaptureConfig,
    sink: SampleSink,
    receiver: pw::channel::Receiver<PipeWireCommand>,
    ready: mpsc::Sender<std::result::Result<(), String>>,
) -> std::result::Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        sink: SampleSink,
        mono: Vec<f32>,
        ready: Option<mpsc::Sender<std::result::Result<(), String>>>,
    }

    let user_data = UserData {
        format: Default::default(),
        sink,
        mono: Vec::with_capacity(4096),
        ready: Some(ready),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "PitchPerfect",
    };

    let stream = pw::stream::StreamBox::new(&core, "pitchperfect-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let failed_loop = mainloop.downgrade();

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(move |_, user_data, old, new| {
            debug!("Capture stream state: {:?} -> {:?}", old, new);
            match new {
                pw::stream::StreamState::Streaming => {
                    if let Some(ready) = user_data.ready.take() {
                        let _ = ready.send(Ok(()));
                    }
                }
                pw::stream::StreamState::Error(message) => {
                    warn!("Capture stream failed: {}", message);
                    if let Some(ready) = user_data.ready.take() {
                        let _ = ready.send(Err(format!("Capture stream failed: {}", message)));
                    }
                    if let Some(mainloop) = failed_loop.upgrade() {
                        mainloop.quit();
                    }
                }
                _ => {}
            }
        })
        .param_changed(|_, user_data, id, param| {
            update_format(&mut user_data.format, id, param);
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let n_samples = data.chunk().size() as usize / std::mem::size_of::<f32>();

            let Some(raw) = data.data() else {
                return;
            };

            // First channel of each frame
            user_data.mono.clear();
            for i in (0..n_samples).step_by(n_channels) {
                let start = i * std::mem::size_of::<f32>();
                let end = start + std::mem::size_of::<f32>();
                match raw.get(start..end) {
                    Some(bytes) => user_data
                        .mono
                        .push(f32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))),
                    None => break,
                }
            }

            if !user_data.mono.is_empty() {
                (user_data.sink)(&user_data.mono);
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    let values = f32_format_pod(config.sample_rate, config.channels as u32)?;
    let mut params = [Pod::from_bytes(&values).ok_or("Invalid audio format pod")?];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    mainloop.run();

    Ok(())
}
