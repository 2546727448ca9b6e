use crate::audio::graph::{Node, NodeKind, Pull};

#[derive(Debug, Clone, PartialEq)]
pub struct EchoSettings {
    /// Tap times in seconds
    pub taps: Vec<f32>,
    /// Gain of each successive tap
    pub tap_decay: f32,
    pub feedback: f32,
    /// Wet share of the output, 0.0 - 1.0
    pub mix: f32,
}

impl EchoSettings {
    /// Closely spaced repeats, like a "multi echo" factory preset
    pub fn multi_echo() -> Self {
        Self {
            taps: vec![0.09, 0.18, 0.27],
            tap_decay: 0.6,
            feedback: 0.35,
            mix: 0.5,
        }
    }
}

/// Multi-tap feedback delay
pub struct Echo {
    buffer: Vec<f32>,
    write_pos: usize,
    /// (delay in frames, gain)
    taps: Vec<(usize, f32)>,
    feedback: f32,
    mix: f32,
}

impl Echo {
    pub fn new(settings: &EchoSettings, sample_rate: u32) -> Self {
        let taps: Vec<(usize, f32)> = settings
            .taps
            .iter()
            .scan(1.0f32, |gain, &secs| {
                let tap = (((secs * sample_rate as f32) as usize).max(1), *gain);
                *gain *= settings.tap_decay;
                Some(tap)
            })
            .collect();
        let longest = taps.iter().map(|(d, _)| *d).max().unwrap_or(1);

        Self {
            buffer: vec![0.0; longest + 1],
            write_pos: 0,
            taps,
            feedback: settings.feedback.clamp(0.0, 0.9),
            mix: settings.mix.clamp(0.0, 1.0),
        }
    }

    fn process(&mut self, buf: &mut [f32]) {
        let len = self.buffer.len();
        for sample in buf.iter_mut() {
            let delayed: f32 = self
                .taps
                .iter()
                .map(|&(delay, gain)| self.buffer[(self.write_pos + len - delay) % len] * gain)
                .sum();
            // only the longest tap feeds back
            let tail = self
                .taps
                .last()
                .map(|&(delay, _)| self.buffer[(self.write_pos + len - delay) % len])
                .unwrap_or(0.0);

            self.buffer[self.write_pos] = *sample + tail * self.feedback;
            self.write_pos = (self.write_pos + 1) % len;

            *sample = *sample * (1.0 - self.mix) + delayed * self.mix;
        }
    }
}

impl Node for Echo {
    fn kind(&self) -> NodeKind {
        NodeKind::Echo
    }

    fn render(&mut self, input: &mut Pull<'_>, out: &mut [f32]) {
        input(out);
        self.process(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_impulse_repeats_at_each_tap() {
        let settings = EchoSettings {
            taps: vec![0.01, 0.02],
            tap_decay: 0.5,
            feedback: 0.0,
            mix: 0.5,
        };
        let mut echo = Echo::new(&settings, 1000);

        let mut buf = vec![0.0f32; 40];
        buf[0] = 1.0;
        echo.process(&mut buf);

        assert_relative_eq!(buf[0], 0.5);
        assert_relative_eq!(buf[10], 0.5);
        assert_relative_eq!(buf[20], 0.25);
        assert_relative_eq!(buf[5], 0.0);
        assert_relative_eq!(buf[30], 0.0);
    }

    #[test]
    fn test_feedback_recirculates() {
        let settings = EchoSettings {
            taps: vec![0.01],
            tap_decay: 1.0,
            feedback: 0.5,
            mix: 1.0,
        };
        let mut echo = Echo::new(&settings, 1000);

        let mut buf = vec![0.0f32; 25];
        buf[0] = 1.0;
        echo.process(&mut buf);

        assert_relative_eq!(buf[10], 1.0);
        assert_relative_eq!(buf[20], 0.5);
    }

    #[test]
    fn test_multi_echo_preset_is_stable() {
        let mut echo = Echo::new(&EchoSettings::multi_echo(), 44100);
        let mut buf = vec![0.0f32; 44100 * 2];
        buf[0] = 1.0;
        echo.process(&mut buf);
        assert!(buf.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
        assert!(buf[4000..].iter().any(|s| s.abs() > 0.0));
    }
}
