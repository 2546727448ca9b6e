//! Notifications from the audio core to the front end
//!
//! The core never calls into the UI directly; it posts [`UiEvent`]s to the
//! UI's event loop over an unbounded channel.

use log::trace;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::AudioError;
use crate::models::AudioClip;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    RecordingStarted,
    RecordingFinished(AudioClip),
    /// The recording did not complete; no playback should follow
    RecordingFailed(String),
    PlaybackStarted,
    PlaybackStopped,
    Alert { title: String, message: String },
}

/// Cloneable handle used by the core to post events
#[derive(Clone)]
pub struct Notifier {
    tx: UnboundedSender<UiEvent>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: UiEvent) {
        trace!("ui event: {:?}", event);
        // The UI may already be gone during shutdown
        let _ = self.tx.send(event);
    }

    /// Post an alert for `err`, if it is one the user should see
    pub fn alert(&self, err: &AudioError) {
        if let Some((title, message)) = err.alert() {
            self.send(UiEvent::Alert {
                title: title.to_string(),
                message,
            });
        }
    }
}

#[cfg(test)]
pub fn drain(rx: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
