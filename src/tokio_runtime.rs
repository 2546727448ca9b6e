//! The runtime that hosts the front end and the audio core
//!
//! A current-thread runtime: recorder callbacks, playback stop timers and
//! user commands are all serialized on one thread, so the core needs no
//! locking of its own.

use tokio::runtime::{Builder, Runtime};

pub fn build() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}
