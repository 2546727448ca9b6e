//! In-memory capture and output devices for tests

use std::sync::{Arc, Mutex, MutexGuard};

use super::capture::{CaptureConfig, CaptureDevice, SampleSink};
use super::graph::{Graph, NodeKind};
use super::playback::{OutputConfig, OutputDevice, OutputStream};
use crate::error::{AudioError, Result};

#[derive(Clone, Copy)]
enum Refusal {
    Denied,
    Unavailable,
}

#[derive(Default)]
struct CaptureInner {
    refusal: Option<Refusal>,
    active: bool,
    sink: Option<SampleSink>,
}

/// A microphone the test feeds by hand
#[derive(Clone, Default)]
pub struct FakeCapture {
    inner: Arc<Mutex<CaptureInner>>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose microphone access is always denied
    pub fn denying() -> Self {
        let fake = Self::default();
        fake.lock().refusal = Some(Refusal::Denied);
        fake
    }

    /// A device whose session cannot be set up at all
    pub fn unavailable() -> Self {
        let fake = Self::default();
        fake.lock().refusal = Some(Refusal::Unavailable);
        fake
    }

    fn lock(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap()
    }

    pub fn feed(&self, samples: &[f32]) {
        if let Some(sink) = self.lock().sink.as_mut() {
            sink(samples);
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().sink.is_some()
    }
}

impl CaptureDevice for FakeCapture {
    fn activate(&mut self, _config: &CaptureConfig) -> Result<()> {
        let mut inner = self.lock();
        match inner.refusal {
            Some(Refusal::Denied) => return Err(AudioError::MicrophoneDenied("access denied".to_string())),
            Some(Refusal::Unavailable) => {
                return Err(AudioError::SessionConfig("no capture device".to_string()))
            }
            None => {}
        }
        inner.active = true;
        Ok(())
    }

    fn start(&mut self, sink: SampleSink) -> Result<()> {
        self.lock().sink = Some(sink);
        Ok(())
    }

    fn deactivate(&mut self) {
        let mut inner = self.lock();
        inner.sink = None;
        inner.active = false;
    }

    fn is_active(&self) -> bool {
        self.lock().active
    }
}

#[derive(Default)]
struct OutputInner {
    fail: bool,
    graph: Option<Graph>,
    config: Option<OutputConfig>,
    starts: usize,
    live: usize,
    max_live: usize,
}

/// An output device rendered on demand by the test
#[derive(Clone, Default)]
pub struct FakeOutput {
    inner: Arc<Mutex<OutputInner>>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that can never be acquired
    pub fn failing() -> Self {
        let fake = Self::default();
        fake.lock().fail = true;
        fake
    }

    fn lock(&self) -> MutexGuard<'_, OutputInner> {
        self.inner.lock().unwrap()
    }

    /// Pull `frames` from the running graph, or silence if none
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        if let Some(graph) = self.lock().graph.as_mut() {
            graph.render(&mut out);
        }
        out
    }

    /// The stream dies on its own: the graph is released without a stop
    pub fn fail_stream(&self) {
        self.lock().graph = None;
    }

    pub fn is_running(&self) -> bool {
        self.lock().graph.is_some()
    }

    pub fn topology(&self) -> Option<Vec<NodeKind>> {
        self.lock().graph.as_ref().map(|g| g.topology())
    }

    pub fn config(&self) -> Option<OutputConfig> {
        self.lock().config.clone()
    }

    pub fn starts(&self) -> usize {
        self.lock().starts
    }

    /// Most streams ever running at once
    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }
}

impl OutputDevice for FakeOutput {
    fn start(&mut self, graph: Graph, config: &OutputConfig) -> Result<Box<dyn OutputStream>> {
        let mut inner = self.lock();
        if inner.fail {
            return Err(AudioError::EngineStart("no output device".to_string()));
        }
        inner.graph = Some(graph);
        inner.config = Some(config.clone());
        inner.starts += 1;
        inner.live += 1;
        inner.max_live = inner.max_live.max(inner.live);
        Ok(Box::new(FakeStream {
            inner: self.inner.clone(),
        }))
    }
}

struct FakeStream {
    inner: Arc<Mutex<OutputInner>>,
}

impl OutputStream for FakeStream {
    fn stop(self: Box<Self>) {
        let mut inner = self.inner.lock().unwrap();
        inner.graph = None;
        inner.live -= 1;
    }
}
