//! Terminal front end
//!
//! Reads single-key commands from stdin, forwards them to the recorder and
//! the playback engine, and renders the events they post back.

use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::audio::{CaptureDevice, OutputDevice, PlaybackEngine, PlaybackState, Recorder};
use crate::error::alerts;
use crate::events::UiEvent;
use crate::models::{AudioClip, EffectPreset};

const HELP: &str = "\
  r        record
  s        stop recording
  1-6      play: 1 slow, 2 fast, 3 chipmunk, 4 vader, 5 echo, 6 reverb
  x        stop playback
  q        quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Record,
    StopRecording,
    Play(EffectPreset),
    StopPlayback,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut chars = line.trim().chars();
    let key = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    match key {
        'r' => Some(Command::Record),
        's' => Some(Command::StopRecording),
        'x' => Some(Command::StopPlayback),
        'h' | '?' => Some(Command::Help),
        'q' => Some(Command::Quit),
        d => d
            .to_digit(10)
            .and_then(|n| (n as usize).checked_sub(1))
            .and_then(EffectPreset::from_index)
            .map(Command::Play),
    }
}

/// Which buttons are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Controls {
    record: bool,
    stop_recording: bool,
    play: bool,
    stop_playback: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            record: true,
            stop_recording: false,
            play: false,
            stop_playback: false,
        }
    }
}

impl Controls {
    fn set_recording(&mut self, recording: bool) {
        self.record = !recording;
        self.stop_recording = recording;
    }

    fn set_playing(&mut self, playing: bool) {
        self.play = !playing;
        self.stop_playback = playing;
    }

    fn render(&self) -> String {
        let button = |label: &str, enabled: bool| {
            if enabled {
                format!("[{}]", label)
            } else {
                format!(" {} ", label)
            }
        };
        [
            button("record", self.record),
            button("stop rec", self.stop_recording),
            button("play 1-6", self.play),
            button("stop", self.stop_playback),
        ]
        .join(" ")
    }
}

pub struct App<C: CaptureDevice, O: OutputDevice> {
    recorder: Recorder<C>,
    engine: PlaybackEngine<O>,
    events: UnboundedReceiver<UiEvent>,
    controls: Controls,
    clip: Option<AudioClip>,
}

impl<C: CaptureDevice, O: OutputDevice> App<C, O> {
    pub fn new(recorder: Recorder<C>, engine: PlaybackEngine<O>, events: UnboundedReceiver<UiEvent>) -> Self {
        Self {
            recorder,
            engine,
            events,
            controls: Controls::default(),
            clip: None,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        println!("Recording to {}\n{}", self.recorder.destination().display(), HELP);
        println!("Tap to record    {}", self.controls.render());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match parse_command(&line) {
                        Some(Command::Quit) => break,
                        Some(command) => self.handle_command(command),
                        None if line.trim().is_empty() => {}
                        None => println!("Unknown command {:?}, press h for help", line.trim()),
                    }
                }
                Some(event) = self.events.recv() => self.handle_event(event),
                Some(id) = self.engine.next_expired_timer() => self.engine.on_stop_timer(id),
            }
        }

        if self.recorder.is_recording() {
            let _ = self.recorder.stop();
        }
        self.engine.stop();
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        debug!("command: {:?}", command);
        match command {
            Command::Record => {
                self.engine.stop();
                let _ = self.recorder.start();
            }
            Command::StopRecording if self.recorder.is_recording() => {
                let _ = self.recorder.stop();
            }
            Command::StopRecording => println!("Not recording"),
            Command::Play(preset) => match &self.clip {
                Some(clip) if !self.recorder.is_recording() => {
                    let _ = self.engine.play(clip, preset);
                }
                Some(_) => println!("Stop recording first"),
                None => println!("Record something first"),
            },
            Command::StopPlayback if self.engine.state() == PlaybackState::Idle => println!("Nothing is playing"),
            Command::StopPlayback => self.engine.stop(),
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
        }
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::RecordingStarted => {
                self.controls.set_recording(true);
                self.controls.play = false;
                println!("Recording in progress    {}", self.controls.render());
            }
            UiEvent::RecordingFinished(clip) => {
                self.controls.set_recording(false);
                self.controls.set_playing(false);
                println!(
                    "Recorded {:.1}s    {}",
                    clip.duration().as_secs_f64(),
                    self.controls.render()
                );
                self.clip = Some(clip);
            }
            UiEvent::RecordingFailed(reason) => {
                self.controls.set_recording(false);
                self.clip = None;
                println!("{}: {} ({})", alerts::RECORDING_FAILED, alerts::RECORDING_FAILED_MESSAGE, reason);
                println!("Tap to record    {}", self.controls.render());
            }
            UiEvent::PlaybackStarted => {
                self.controls.set_playing(true);
                let chain = self
                    .engine
                    .topology()
                    .map(|kinds| format!("{:?}", kinds))
                    .unwrap_or_default();
                let rate = self.engine.rate().unwrap_or(1.0);
                println!("Playing {} at {}x    {}", chain, rate, self.controls.render());
            }
            UiEvent::PlaybackStopped => {
                self.controls.set_playing(false);
                println!("Stopped    {}", self.controls.render());
            }
            UiEvent::Alert { title, message } => {
                eprintln!("{}: {}", title, message);
                if !self.recorder.is_recording() {
                    self.controls.set_recording(false);
                }
            }
        }
    }
}
