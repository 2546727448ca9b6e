//! Independent rate and pitch control
//!
//! Granular overlap-add: grains of `GRAIN` frames are read from the input at
//! the pitch ratio and laid down every `HOP` output frames, while the read
//! position advances `HOP * rate` input frames per grain. Rate therefore
//! changes duration only, pitch changes frequency only.

use std::collections::VecDeque;

use crate::audio::graph::{Node, NodeKind, Pull};
use crate::models::clamp_rate;

const GRAIN: usize = 2048;
const HOP: usize = GRAIN / 2;
/// Frames pulled from upstream per request
const BLOCK: usize = 256;

pub fn cents_to_ratio(cents: f32) -> f32 {
    2.0_f32.powf(cents / 1200.0)
}

pub struct TimePitch {
    rate: f64,
    pitch_ratio: f64,
    window: Vec<f32>,
    /// Buffered upstream frames; `input[0]` is absolute frame `input_base`
    input: Vec<f32>,
    input_base: usize,
    /// Absolute input frame where the next grain starts
    read_pos: f64,
    overlap: Vec<f32>,
    ready: VecDeque<f32>,
}

impl TimePitch {
    /// `rate` scales playback speed, `cents` shifts pitch.
    pub fn new(rate: f32, cents: f32) -> Self {
        // periodic Hann, sums to 1 at 50% overlap
        let window = (0..GRAIN)
            .map(|j| 0.5 - 0.5 * (std::f32::consts::TAU * j as f32 / GRAIN as f32).cos())
            .collect();
        Self {
            rate: clamp_rate(rate) as f64,
            pitch_ratio: cents_to_ratio(cents) as f64,
            window,
            input: Vec::with_capacity(GRAIN * 4),
            input_base: 0,
            read_pos: 0.0,
            overlap: vec![0.0; GRAIN],
            ready: VecDeque::with_capacity(HOP),
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.rate == 1.0 && self.pitch_ratio == 1.0
    }

    fn next_grain(&mut self, input: &mut Pull<'_>) {
        let start = self.read_pos - self.input_base as f64;
        let span = (GRAIN - 1) as f64 * self.pitch_ratio + 2.0;
        let needed = (start + span).ceil() as usize;

        let mut block = [0.0f32; BLOCK];
        while self.input.len() < needed {
            input(&mut block);
            self.input.extend_from_slice(&block);
        }

        for (j, (acc, w)) in self.overlap.iter_mut().zip(&self.window).enumerate() {
            let pos = start + j as f64 * self.pitch_ratio;
            let i = pos as usize;
            let frac = (pos - i as f64) as f32;
            let s = self.input[i] * (1.0 - frac) + self.input[i + 1] * frac;
            *acc += s * w;
        }

        // The first hop is complete: no later grain reaches back into it
        self.ready.extend(self.overlap[..HOP].iter().copied());
        self.overlap.copy_within(HOP.., 0);
        self.overlap[GRAIN - HOP..].fill(0.0);

        self.read_pos += HOP as f64 * self.rate;
        let consumed = (self.read_pos.floor() as usize)
            .saturating_sub(self.input_base)
            .min(self.input.len());
        self.input.drain(..consumed);
        self.input_base += consumed;
    }
}

impl Node for TimePitch {
    fn kind(&self) -> NodeKind {
        NodeKind::TimePitch
    }

    fn render(&mut self, input: &mut Pull<'_>, out: &mut [f32]) {
        if self.is_bypassed() {
            input(out);
            return;
        }

        let mut written = 0;
        while written < out.len() {
            if self.ready.is_empty() {
                self.next_grain(input);
            }
            let n = (out.len() - written).min(self.ready.len());
            for (dst, s) in out[written..written + n].iter_mut().zip(self.ready.drain(..n)) {
                *dst = s;
            }
            written += n;
        }
    }
}
