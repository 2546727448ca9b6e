//! Pull-based audio node graph
//!
//! A graph is an ordered chain of nodes ending in the output stage. Rendering
//! pulls from the last node, which pulls from the node before it, and so on
//! down to the player. Nodes that change the time base (time/pitch) simply
//! pull more or fewer frames from upstream than they produce.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// The kinds of stage a graph can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Player,
    TimePitch,
    Echo,
    Reverb,
    Output,
}

/// Upstream pull: fill the buffer with the next frames of the chain
pub type Pull<'a> = dyn FnMut(&mut [f32]) + 'a;

/// A processing stage. Buffers are mono `f32` frames.
pub trait Node: Send {
    fn kind(&self) -> NodeKind;

    /// Fill `out`, pulling from `input` as needed.
    fn render(&mut self, input: &mut Pull<'_>, out: &mut [f32]);
}

fn render_chain(nodes: &mut [Box<dyn Node>], out: &mut [f32]) {
    match nodes.split_last_mut() {
        Some((last, upstream)) => last.render(&mut |buf: &mut [f32]| render_chain(upstream, buf), out),
        None => out.fill(0.0),
    }
}

/// An ordered chain of nodes, source first
pub struct Graph {
    nodes: Vec<Box<dyn Node>>,
}

impl Graph {
    /// Wire `stages` in order and terminate the chain with the output stage.
    pub fn chain(stages: impl IntoIterator<Item = Box<dyn Node>>) -> Self {
        let nodes = stages
            .into_iter()
            .chain(std::iter::once(Box::new(OutputNode) as Box<dyn Node>))
            .collect();
        Self { nodes }
    }

    pub fn topology(&self) -> Vec<NodeKind> {
        self.nodes.iter().map(|n| n.kind()).collect()
    }

    /// Each consecutive `(from, to)` connection in the chain
    pub fn connections(&self) -> Vec<(NodeKind, NodeKind)> {
        self.topology().windows(2).map(|w| (w[0], w[1])).collect()
    }

    pub fn render(&mut self, out: &mut [f32]) {
        render_chain(&mut self.nodes, out);
    }
}

struct PlayerShared {
    playing: AtomicBool,
    /// Frames of the scheduled buffer rendered so far
    position: AtomicU64,
}

/// Control side of a [`PlayerNode`], kept by the engine while the node itself
/// lives on the render thread.
#[derive(Clone)]
pub struct PlayerHandle {
    shared: Arc<PlayerShared>,
}

impl PlayerHandle {
    pub fn play(&self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    pub fn halt(&self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    /// Render position in source frames
    pub fn sample_time(&self) -> u64 {
        self.shared.position.load(Ordering::Acquire)
    }
}

/// Source node playing a single scheduled buffer
pub struct PlayerNode {
    samples: Vec<f32>,
    position: usize,
    confirm: Option<oneshot::Sender<u64>>,
    shared: Arc<PlayerShared>,
}

impl PlayerNode {
    pub fn new() -> (Self, PlayerHandle) {
        let shared = Arc::new(PlayerShared {
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0),
        });
        let node = Self {
            samples: Vec::new(),
            position: 0,
            confirm: None,
            shared: shared.clone(),
        };
        (node, PlayerHandle { shared })
    }

    /// Schedule `samples` to play from the beginning.
    ///
    /// The returned receiver yields the render-time sample offset once the
    /// render thread first picks the buffer up.
    pub fn schedule(&mut self, samples: Vec<f32>) -> oneshot::Receiver<u64> {
        let (tx, rx) = oneshot::channel();
        self.samples = samples;
        self.position = 0;
        self.confirm = Some(tx);
        self.shared.position.store(0, Ordering::Release);
        rx
    }
}

impl Node for PlayerNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Player
    }

    fn render(&mut self, _input: &mut Pull<'_>, out: &mut [f32]) {
        if !self.shared.playing.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }
        if let Some(confirm) = self.confirm.take() {
            let _ = confirm.send(self.position as u64);
        }

        let n = self.samples.len().saturating_sub(self.position).min(out.len());
        out[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        out[n..].fill(0.0);
        self.position += n;
        self.shared.position.store(self.position as u64, Ordering::Release);
    }
}

/// Final stage before the device; keeps samples in range
pub struct OutputNode;

impl Node for OutputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    fn render(&mut self, input: &mut Pull<'_>, out: &mut [f32]) {
        input(out);
        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Multiplies its input, to make ordering observable
    struct Gain(f32, NodeKind);

    impl Node for Gain {
        fn kind(&self) -> NodeKind {
            self.1
        }

        fn render(&mut self, input: &mut Pull<'_>, out: &mut [f32]) {
            input(out);
            out.iter_mut().for_each(|s| *s *= self.0);
        }
    }

    #[test]
    fn test_chain_wires_consecutive_pairs() {
        let (player, _handle) = PlayerNode::new();
        let graph = Graph::chain(vec![
            Box::new(player) as Box<dyn Node>,
            Box::new(Gain(1.0, NodeKind::Echo)),
            Box::new(Gain(1.0, NodeKind::Reverb)),
        ]);
        assert_eq!(
            graph.topology(),
            vec![NodeKind::Player, NodeKind::Echo, NodeKind::Reverb, NodeKind::Output]
        );
        assert_eq!(
            graph.connections(),
            vec![
                (NodeKind::Player, NodeKind::Echo),
                (NodeKind::Echo, NodeKind::Reverb),
                (NodeKind::Reverb, NodeKind::Output),
            ]
        );
    }

    #[test]
    fn test_player_silent_until_played() {
        let (mut player, handle) = PlayerNode::new();
        let mut confirmed = player.schedule(vec![0.5; 8]);
        let mut graph = Graph::chain(vec![Box::new(player) as Box<dyn Node>]);

        let mut out = [1.0f32; 4];
        graph.render(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert!(confirmed.try_recv().is_err());

        handle.play();
        graph.render(&mut out);
        assert_eq!(out, [0.5; 4]);
        assert_eq!(confirmed.try_recv().unwrap(), 0);
        assert_eq!(handle.sample_time(), 4);
    }

    #[test]
    fn test_player_pads_with_silence_at_end() {
        let (mut player, handle) = PlayerNode::new();
        let _confirmed = player.schedule(vec![0.25; 3]);
        handle.play();
        let mut graph = Graph::chain(vec![
            Box::new(player) as Box<dyn Node>,
            Box::new(Gain(2.0, NodeKind::TimePitch)),
        ]);

        let mut out = [1.0f32; 5];
        graph.render(&mut out);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.0, 0.0]);
        assert_eq!(handle.sample_time(), 3);
    }

    #[test]
    fn test_output_clamps() {
        let (mut player, handle) = PlayerNode::new();
        let _confirmed = player.schedule(vec![0.8, -0.8]);
        handle.play();
        let mut graph = Graph::chain(vec![
            Box::new(player) as Box<dyn Node>,
            Box::new(Gain(2.0, NodeKind::Echo)),
        ]);

        let mut out = [0.0f32; 2];
        graph.render(&mut out);
        assert_eq!(out, [1.0, -1.0]);
    }

    #[test]
    fn test_halt_silences_player() {
        let (mut player, handle) = PlayerNode::new();
        let _confirmed = player.schedule(vec![0.5; 8]);
        handle.play();
        let mut graph = Graph::chain(vec![Box::new(player) as Box<dyn Node>]);

        let mut out = [0.0f32; 2];
        graph.render(&mut out);
        handle.halt();
        graph.render(&mut out);
        assert_eq!(out, [0.0; 2]);
        assert_eq!(handle.sample_time(), 2);
    }
}
