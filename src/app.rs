//! Host controller for Murmur
//!
//! Owns the capture session, the output context and the render loop and is
//! the only place their state changes. Device threads and the processing
//! task reach it through channels; everything is multiplexed in one
//! `select!` so the frame loop keeps ticking while a reply is in flight.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::api::SpeechService;
use crate::audio::{
    AnalyserConfig, AudioChunk, AudioInput, AudioOutput, CaptureEvent, ChunkSink, OutputContext,
    PendingGrant, SignalTap,
};
use crate::error::{DeviceError, PipelineError};
use crate::pipeline::{Outcome, Pipeline};
use crate::render::{RenderLoop, Viewport, VisualSink};
use crate::session::{CaptureSession, GrantOutcome, SessionState, StopOutcome};
use crate::settings::Settings;

/// User input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start if idle, stop if recording
    Toggle,
    /// Hold begins
    Press,
    /// Hold ends
    Release,
    Quit,
}

/// Parse one line of stdin into a command
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "" | "t" | "toggle" => Some(Command::Toggle),
        "p" | "press" => Some(Command::Press),
        "r" | "release" => Some(Command::Release),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

type Processed = Result<Result<Outcome, PipelineError>, JoinError>;

/// Everything the controller reacts to
pub enum Event<T> {
    /// `None` once the command source is gone
    Command(Option<Command>),
    Granted(Result<T, DeviceError>),
    Chunk(AudioChunk),
    /// The microphone failed after it was granted
    DeviceLost(DeviceError),
    Processed(Processed),
    Frame,
}

impl<T> From<CaptureEvent> for Event<T> {
    fn from(event: CaptureEvent) -> Self {
        match event {
            CaptureEvent::Chunk(chunk) => Event::Chunk(chunk),
            CaptureEvent::Lost(error) => Event::DeviceLost(error),
        }
    }
}

pub struct App<D: AudioInput, S: SpeechService, O: AudioOutput> {
    session: CaptureSession<D>,
    chunks: mpsc::UnboundedReceiver<CaptureEvent>,
    grant: Option<PendingGrant<D::Stream>>,
    pipeline: Arc<Pipeline<S>>,
    processing: Option<JoinHandle<Result<Outcome, PipelineError>>>,
    output: OutputContext,
    _playback: O::Handle,
    render: RenderLoop,
    sink: Box<dyn VisualSink>,
    /// Last user-visible error, shown with every frame and cleared when a
    /// recording starts
    status: Option<String>,
    started: Instant,
}

impl<D: AudioInput, S: SpeechService, O: AudioOutput> App<D, S, O> {
    pub fn new(
        input: D,
        playback: &O,
        pipeline: Pipeline<S>,
        settings: &Settings,
        sink: Box<dyn VisualSink>,
    ) -> Self {
        let input_tap = SignalTap::new("input");
        let (chunk_sink, chunks) = ChunkSink::new(input_tap.clone());
        let session = CaptureSession::new(input, chunk_sink, settings.audio.capture_rate);

        let output = OutputContext::new(settings.audio.playback_rate);
        let handle = playback.open(output.timeline());

        let mut render = RenderLoop::new(
            AnalyserConfig::default().with_fft_size(settings.audio.fft_size),
            settings.render.smoothing,
            Viewport::new(settings.render.width, settings.render.height),
        );
        render.bind_input(input_tap);
        render.bind_output(output.tap());

        Self {
            session,
            chunks,
            grant: None,
            pipeline: Arc::new(pipeline),
            processing: None,
            output,
            _playback: handle,
            render,
            sink,
            status: None,
            started: Instant::now(),
        }
    }

    /// Drive the controller until quit or until the command source closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, fps: u32) {
        let mut frames = time::interval(frame_period(fps));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let event = self.next_event(&mut commands, &mut frames).await;
            if !self.handle(event) {
                break;
            }
        }

        self.shutdown();
    }

    /// Wait for the next thing to react to.
    ///
    /// Commands are polled before device chunks; a stop drains whatever
    /// chunks are already queued before it ends the recording.
    pub async fn next_event(
        &mut self,
        commands: &mut mpsc::Receiver<Command>,
        frames: &mut Interval,
    ) -> Event<D::Stream> {
        let event = tokio::select! {
            biased;
            command = commands.recv() => Event::Command(command),
            granted = wait_grant(&mut self.grant) => Event::Granted(granted),
            Some(capture) = self.chunks.recv() => Event::from(capture),
            processed = wait_task(&mut self.processing) => Event::Processed(processed),
            _ = frames.tick() => Event::Frame,
        };

        // Resolved futures must not be polled again
        match &event {
            Event::Granted(_) => self.grant = None,
            Event::Processed(_) => self.processing = None,
            _ => {}
        }
        event
    }

    /// Apply one event. Returns false when the controller should exit.
    pub fn handle(&mut self, event: Event<D::Stream>) -> bool {
        match event {
            Event::Command(Some(command)) => return self.on_command(command),
            Event::Command(None) => {
                debug!("Command source closed");
                return false;
            }
            Event::Granted(result) => self.on_granted(result),
            Event::Chunk(chunk) => {
                self.session.on_chunk(chunk);
            }
            Event::DeviceLost(e) => self.on_lost(e),
            Event::Processed(result) => self.on_processed(result),
            Event::Frame => self.on_frame(),
        }
        true
    }

    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Toggle => match self.session.state() {
                SessionState::Idle => self.begin(),
                // A second toggle before the grant undoes the first stop
                SessionState::Acquiring if self.session.stop_requested() => self.begin(),
                SessionState::Acquiring | SessionState::Recording => self.end(),
                state => debug!("Toggle ignored while {:?}", state),
            },
            Command::Press => self.begin(),
            Command::Release => self.end(),
            Command::Quit => {
                info!("Quit requested");
                return false;
            }
        }
        true
    }

    fn begin(&mut self) {
        if let Some(grant) = self.session.start() {
            self.grant = Some(grant);
        }
    }

    fn end(&mut self) {
        // Chunks the device delivered before the stop still belong to the
        // recording
        while let Ok(capture) = self.chunks.try_recv() {
            match capture {
                CaptureEvent::Chunk(chunk) => {
                    self.session.on_chunk(chunk);
                }
                CaptureEvent::Lost(e) => self.on_lost(e),
            }
        }

        match self.session.stop() {
            StopOutcome::Captured(audio) => {
                info!(
                    "Session {}: captured {:.2}s, processing",
                    audio.session,
                    audio.duration_seconds()
                );
                let pipeline = self.pipeline.clone();
                self.processing = Some(tokio::spawn(async move { pipeline.process(audio).await }));
            }
            StopOutcome::CancelRequested => {
                debug!("Stop arrived before the microphone was granted");
            }
            StopOutcome::Ignored => {}
        }
    }

    fn on_granted(&mut self, result: Result<D::Stream, DeviceError>) {
        match self.session.on_granted(result) {
            Ok(GrantOutcome::Recording) => self.status = None,
            Ok(GrantOutcome::Aborted) | Ok(GrantOutcome::Ignored) => {}
            Err(e) => self.fail(format!("Error: {}", e)),
        }
    }

    fn on_lost(&mut self, error: DeviceError) {
        if let Err(e) = self.session.on_lost(error) {
            self.fail(format!("Error: {}", e));
        }
    }

    fn on_processed(&mut self, result: Processed) {
        match result {
            Ok(Ok(Outcome::Reply { buffer, transcript })) => {
                let segment = self.output.schedule(&buffer);
                info!(
                    "Reply scheduled at {:.2}s until {:.2}s",
                    segment.start,
                    segment.end()
                );
                if let Some(transcript) = transcript {
                    debug!("Reply transcript: {}", transcript);
                }
            }
            Ok(Ok(Outcome::NoAudio { transcript })) => {
                debug!("Nothing to play (transcript: {:?})", transcript);
            }
            Ok(Ok(Outcome::Skipped { duration })) => {
                debug!("Skipped {} ms recording", duration.as_millis());
            }
            Ok(Err(e)) => {
                error!("Processing failed: {}", e);
                self.fail(e.user_message());
            }
            Err(e) => {
                error!("Processing task failed: {}", e);
                self.fail("Failed to process audio.".to_string());
            }
        }
        self.session.finish();
    }

    fn on_frame(&mut self) {
        let time_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let params = self.render.tick(time_ms);
        self.sink
            .present(&params, self.render.volume(), self.status.as_deref());
    }

    fn fail(&mut self, message: String) {
        error!("{}", message);
        self.status = Some(message);
    }

    /// Release the microphone and abandon in-flight work
    fn shutdown(&mut self) {
        if let StopOutcome::Captured(audio) = self.session.stop() {
            info!(
                "Discarding {:.2}s recording on exit",
                audio.duration_seconds()
            );
        }
        self.grant = None;
        if let Some(task) = self.processing.take() {
            task.abort();
        }
    }
}

fn frame_period(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

async fn wait_grant<T>(grant: &mut Option<PendingGrant<T>>) -> Result<T, DeviceError> {
    match grant {
        Some(grant) => grant.await,
        None => std::future::pending().await,
    }
}

async fn wait_task<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}
