//! Audio output
//!
//! [`OutputDevice`] is the seam between the playback engine and the
//! platform. [`AudioPlayer`] renders a [`Graph`] into a PipeWire playback
//! stream on the stream's own loop thread.

use log::{debug, info, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::pod::Pod;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};

use super::format::{f32_format_pod, update_format, STREAM_READY_TIMEOUT};
use super::graph::Graph;
use crate::error::{AudioError, Result};

/// Output stream format
#[derive(Clone, Debug, PartialEq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

pub trait OutputDevice {
    /// Acquire the device and start pulling frames from `graph`.
    ///
    /// May block briefly while the device is acquired. If the stream dies
    /// later, the graph is dropped so the player's scheduling confirmation
    /// never stays pending.
    fn start(&mut self, graph: Graph, config: &OutputConfig) -> Result<Box<dyn OutputStream>>;
}

/// A running output; owns the graph until stopped
pub trait OutputStream {
    /// Halt rendering and release the graph and all of its nodes.
    fn stop(self: Box<Self>);
}

enum PlaybackCommand {
    Stop,
}

/// Audio output using PipeWire
#[derive(Default)]
pub struct AudioPlayer;

impl AudioPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDevice for AudioPlayer {
    fn start(&mut self, graph: Graph, config: &OutputConfig) -> Result<Box<dyn OutputStream>> {
        let (sender, receiver) = pw::channel::channel::<PlaybackCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();
        let config = config.clone();

        let handle = thread::spawn(move || {
            if let Err(e) = run_playback_loop(graph, config, receiver, ready_tx.clone()) {
                let _ = ready_tx.send(Err(e));
            }
        });

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => {
                info!("Output stream started");
                Ok(Box::new(PlayerStream {
                    sender,
                    thread_handle: Some(handle),
                }))
            }
            Ok(Err(e)) => {
                let _ = sender.send(PlaybackCommand::Stop);
                let _ = handle.join();
                Err(AudioError::EngineStart(e))
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = sender.send(PlaybackCommand::Stop);
                let _ = handle.join();
                Err(AudioError::EngineStart(
                    "Output stream never started; is an output device available?".to_string(),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(AudioError::EngineStart("Playback thread exited".to_string()))
            }
        }
    }
}

struct PlayerStream {
    sender: pw::channel::Sender<PlaybackCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PlayerStream {
    fn shutdown(&mut self) {
        let Some(handle) = self.thread_handle.take() else {
            return;
        };
        if self.sender.send(PlaybackCommand::Stop).is_err() {
            debug!("Playback loop already gone");
        }
        let _ = handle.join();
        info!("Output stream stopped");
    }
}

impl OutputStream for PlayerStream {
    fn stop(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for PlayerStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run the PipeWire playback loop until a stop command arrives
fn run_playback_loop(
    graph: Graph,
    config: OutputConfig,
    receiver: pw::channel::Receiver<PlaybackCommand>,
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
        PlaybackCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        graph: Graph,
        mono: Vec<f32>,
        ready: Option<mpsc::Sender<std::result::Result<(), String>>>,
    }

    let user_data = UserData {
        format: Default::default(),
        graph,
        mono: Vec::with_capacity(4096),
        ready: Some(ready),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Music",
        *pw::keys::APP_NAME => "PitchPerfect",
    };

    let stream = pw::stream::StreamBox::new(&core, "pitchperfect-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let fallback_channels = config.channels.max(1) as usize;
    let failed_loop = mainloop.downgrade();

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(move |_, user_data, old, new| {
            debug!("Playback stream state: {:?} -> {:?}", old, new);
            match new {
                pw::stream::StreamState::Streaming => {
                    if let Some(ready) = user_data.ready.take() {
                        let _ = ready.send(Ok(()));
                    }
                }
                pw::stream::StreamState::Error(message) => {
                    warn!("Playback stream failed: {}", message);
                    if let Some(ready) = user_data.ready.take() {
                        let _ = ready.send(Err(format!("Output stream failed: {}", message)));
                    }
                    // Leaving the loop drops the graph with the listener
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
        .process(move |stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = match user_data.format.channels() as usize {
                0 => fallback_channels,
                n => n,
            };
            let sample_size = std::mem::size_of::<f32>();
            let stride = sample_size * n_channels;

            let Some(slice) = data.data() else {
                return;
            };

            let n_frames = slice.len() / stride;
            user_data.mono.resize(n_frames, 0.0);
            user_data.graph.render(&mut user_data.mono);

            // Same mono signal on every channel
            for (frame, &sample) in slice.chunks_exact_mut(stride).zip(&user_data.mono) {
                let bytes = sample.to_le_bytes();
                for channel in frame.chunks_exact_mut(sample_size) {
                    channel.copy_from_slice(&bytes);
                }
            }

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = (n_frames * stride) as u32;
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    let values = f32_format_pod(config.sample_rate, config.channels as u32)?;
    let mut params = [Pod::from_bytes(&values).ok_or("Invalid audio format pod")?];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Runs until stopped or failed; the graph is dropped with the listener afterwards
    mainloop.run();

    Ok(())
}
