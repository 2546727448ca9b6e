//! Playback engine
//!
//! Turns a clip and an effect preset into a running graph
//! (player -> time/pitch -> [echo] -> [reverb] -> output) and stops it when the
//! clip has played out. At most one [`PlaybackSession`] exists at a time.
//!
//! The engine lives on the UI's single-threaded runtime. The end-of-clip
//! timer is a task on that runtime which posts the expiring session id back
//! to the engine; ids that no longer match the live session are ignored.

use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::effects::{Echo, EchoSettings, Reverb, ReverbSettings, TimePitch};
use super::graph::{Graph, Node, NodeKind, PlayerHandle, PlayerNode};
use super::playback::{OutputConfig, OutputDevice, OutputStream};
use super::recorder::read_mono;
use crate::error::{AudioError, Result};
use crate::events::{Notifier, UiEvent};
use crate::models::{clamp_rate, AudioClip, EffectPreset, PresetParams};

/// Identifies one playback attempt in logs and timer callbacks
pub type SessionId = Uuid;

const OUTPUT_CHANNELS: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// Wall-clock time until the clip ends.
///
/// `rendered` is the player's render-time offset in source frames; `rate`
/// is the effective playback rate.
pub fn completion_delay(total_frames: u64, rendered: u64, sample_rate: u32, rate: f32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let remaining = total_frames.saturating_sub(rendered) as f64;
    let seconds = remaining / sample_rate as f64 / clamp_rate(rate) as f64;
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
}

/// Build the node chain for `params`. Echo always precedes reverb.
pub fn build_graph(player: PlayerNode, params: &PresetParams, sample_rate: u32) -> Graph {
    let mut stages: Vec<Box<dyn Node>> = vec![
        Box::new(player),
        Box::new(TimePitch::new(params.effective_rate(), params.pitch_cents())),
    ];
    if params.echo {
        stages.push(Box::new(Echo::new(&EchoSettings::multi_echo(), sample_rate)));
    }
    if params.reverb {
        stages.push(Box::new(Reverb::new(ReverbSettings::cathedral(), sample_rate)));
    }
    Graph::chain(stages)
}

/// One-shot timer that posts its session id when the clip should end
struct StopTimer {
    task: JoinHandle<()>,
}

impl StopTimer {
    /// Wait for the player to confirm scheduling, then sleep until the end
    /// of the clip measured from the confirmed render offset.
    fn arm(
        session: SessionId,
        confirmation: oneshot::Receiver<u64>,
        total_frames: u64,
        sample_rate: u32,
        rate: f32,
        expired: UnboundedSender<SessionId>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let delay = match confirmation.await {
                Ok(rendered) => completion_delay(total_frames, rendered, sample_rate, rate),
                Err(_) => {
                    warn!("Playback {} was never scheduled, stopping now", session);
                    Duration::ZERO
                }
            };
            debug!("Playback {} ends in {:.3}s", session, delay.as_secs_f64());
            tokio::time::sleep(delay).await;
            let _ = expired.send(session);
        });
        Self { task }
    }

    fn cancel(self) {
        self.task.abort();
    }
}

/// Live resources of one playback attempt
struct PlaybackSession {
    id: SessionId,
    topology: Vec<NodeKind>,
    rate: f32,
    player: PlayerHandle,
    stream: Box<dyn OutputStream>,
    timer: StopTimer,
}

pub struct PlaybackEngine<O: OutputDevice> {
    output: O,
    notifier: Notifier,
    timer_tx: UnboundedSender<SessionId>,
    timer_rx: UnboundedReceiver<SessionId>,
    session: Option<PlaybackSession>,
}

impl<O: OutputDevice> PlaybackEngine<O> {
    pub fn new(output: O, notifier: Notifier) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            output,
            notifier,
            timer_tx,
            timer_rx,
            session: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        match self.session {
            Some(_) => PlaybackState::Playing,
            None => PlaybackState::Idle,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Node chain of the live session
    pub fn topology(&self) -> Option<&[NodeKind]> {
        self.session.as_ref().map(|s| s.topology.as_slice())
    }

    /// Playback rate of the live session
    pub fn rate(&self) -> Option<f32> {
        self.session.as_ref().map(|s| s.rate)
    }

    pub fn play(&mut self, clip: &AudioClip, preset: EffectPreset) -> Result<()> {
        info!("Playing {} with {} preset", clip.path.display(), preset.label());
        self.play_with(clip, preset.params())
    }

    /// Play `clip` through the effects in `params`.
    ///
    /// Any live session is torn down first. Must run inside the UI runtime.
    pub fn play_with(&mut self, clip: &AudioClip, params: PresetParams) -> Result<()> {
        self.stop();

        match self.start_session(clip, &params) {
            Ok(session) => {
                info!(
                    "Playback {} started: {:?} at rate {}",
                    session.id, session.topology, session.rate
                );
                self.session = Some(session);
                self.notifier.send(UiEvent::PlaybackStarted);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start playback: {}", e);
                self.notifier.alert(&e);
                Err(e)
            }
        }
    }

    fn start_session(&mut self, clip: &AudioClip, params: &PresetParams) -> Result<PlaybackSession> {
        let (samples, sample_rate) = read_mono(&clip.path).map_err(|source| AudioError::FileLoad {
            path: clip.path.clone(),
            source,
        })?;
        let total_frames = samples.len() as u64;

        let (mut player, handle) = PlayerNode::new();
        let confirmation = player.schedule(samples);
        let graph = build_graph(player, params, sample_rate);
        let topology = graph.topology();
        debug!("Graph connections: {:?}", graph.connections());

        let config = OutputConfig {
            sample_rate,
            channels: OUTPUT_CHANNELS,
        };
        // On failure the graph is dropped with the error; nothing keeps running
        let stream = self.output.start(graph, &config)?;
        handle.play();

        let id = Uuid::new_v4();
        let rate = params.effective_rate();
        let timer = StopTimer::arm(
            id,
            confirmation,
            total_frames,
            sample_rate,
            rate,
            self.timer_tx.clone(),
        );

        Ok(PlaybackSession {
            id,
            topology,
            rate,
            player: handle,
            stream,
            timer,
        })
    }

    /// Stop playback and release the graph. A no-op when idle.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.player.halt();
        session.timer.cancel();
        session.stream.stop();

        info!(
            "Playback {} stopped at frame {}",
            session.id,
            session.player.sample_time()
        );
        self.notifier.send(UiEvent::PlaybackStopped);
    }

    /// Wait for the next end-of-clip timer to fire
    pub async fn next_expired_timer(&mut self) -> Option<SessionId> {
        self.timer_rx.recv().await
    }

    /// Handle an expired end-of-clip timer
    pub fn on_stop_timer(&mut self, id: SessionId) {
        if self.session_id() == Some(id) {
            debug!("Playback {} reached the end of the clip", id);
            self.stop();
        } else {
            debug!("Ignoring stale stop timer for {}", id);
        }
    }
}

impl<O: OutputDevice> Drop for PlaybackEngine<O> {
    fn drop(&mut self) {
        self.stop();
    }
}
