use crate::audio::graph::{Node, NodeKind, Pull};

/// Delay line lengths in frames at 44.1 kHz
const COMB_TUNING: [usize; 4] = [1557, 1617, 1491, 1422];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const ALLPASS_GAIN: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbSettings {
    /// Comb feedback; larger is a longer tail
    pub decay: f32,
    /// High-frequency loss per pass, 0.0 - 1.0
    pub damping: f32,
    /// Scales the delay lines
    pub size: f32,
    /// Wet share of the output in percent
    pub wet_dry_mix: f32,
}

impl ReverbSettings {
    /// Large, long-tailed space at a 50/50 mix
    pub fn cathedral() -> Self {
        Self {
            decay: 0.88,
            damping: 0.2,
            size: 1.5,
            wet_dry_mix: 50.0,
        }
    }
}

struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
            filter_store: 0.0,
        }
    }

    fn tick(&mut self, input: f32, decay: f32, damping: f32) -> f32 {
        let out = self.buffer[self.pos];
        self.filter_store = out * (1.0 - damping) + self.filter_store * damping;
        self.buffer[self.pos] = input + self.filter_store * decay;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            pos: 0,
        }
    }

    fn tick(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let out = delayed - input;
        self.buffer[self.pos] = input + delayed * ALLPASS_GAIN;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

/// Schroeder reverb: parallel damped combs into series allpasses
pub struct Reverb {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    decay: f32,
    damping: f32,
    mix: f32,
}

impl Reverb {
    pub fn new(settings: ReverbSettings, sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        let comb_scale = scale * settings.size.max(0.1);
        Self {
            combs: COMB_TUNING
                .iter()
                .map(|&len| Comb::new((len as f32 * comb_scale) as usize))
                .collect(),
            allpasses: ALLPASS_TUNING
                .iter()
                .map(|&len| Allpass::new((len as f32 * scale) as usize))
                .collect(),
            decay: settings.decay.clamp(0.0, 0.98),
            damping: settings.damping.clamp(0.0, 1.0),
            mix: (settings.wet_dry_mix / 100.0).clamp(0.0, 1.0),
        }
    }

    fn process(&mut self, buf: &mut [f32]) {
        let comb_gain = 1.0 / self.combs.len() as f32;
        for sample in buf.iter_mut() {
            let dry = *sample;
            let mut wet: f32 = self
                .combs
                .iter_mut()
                .map(|c| c.tick(dry, self.decay, self.damping))
                .sum::<f32>()
                * comb_gain;
            for ap in &mut self.allpasses {
                wet = ap.tick(wet);
            }
            *sample = dry * (1.0 - self.mix) + wet * self.mix;
        }
    }
}

impl Node for Reverb {
    fn kind(&self) -> NodeKind {
        NodeKind::Reverb
    }

    fn render(&mut self, input: &mut Pull<'_>, out: &mut [f32]) {
        input(out);
        self.process(out);
    }
}
