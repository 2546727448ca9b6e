//! Effect nodes for the playback graph

mod echo;
mod reverb;
mod time_pitch;

pub use echo::{Echo, EchoSettings};
pub use reverb::{Reverb, ReverbSettings};
pub use time_pitch::TimePitch;
