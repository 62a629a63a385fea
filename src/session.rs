//! Capture session state machine
//!
//! ```text
//! Idle ──start──▶ Acquiring ──granted──▶ Recording ──stop──▶ Stopping ──▶ Processing ──finish──▶ Idle
//!                    │  ╰─granted after cancel: release stream──▶ Idle
//!                    ╰─denied / failed──▶ Idle (DeviceError)
//! ```
//!
//! A stop signal that arrives while the device request is still pending
//! sets the cancellation flag. The flag is checked exactly once, when the
//! grant resolves: the granted stream is then released immediately and the
//! session never enters `Recording`. A start signal before that point
//! withdraws the cancellation and the pending request carries on.
//!
//! A device that dies while recording ends the session without processing.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::{AudioChunk, AudioInput, ChunkSink, PendingGrant, SampleBuffer};
use crate::error::DeviceError;

/// Lifecycle of one record → encode → transmit → play cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Recording,
    Stopping,
    Processing,
}

/// Short identifier used to correlate log lines of one session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Cooperative cancellation flag for a pending device request
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Samples captured by a finished recording
#[derive(Clone, Debug)]
pub struct CapturedAudio {
    pub session: SessionId,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl CapturedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// What a stop signal did
#[derive(Debug)]
pub enum StopOutcome {
    /// Nothing to stop
    Ignored,
    /// Device request still pending; it will be released when it resolves
    CancelRequested,
    /// Recording ended and the session is now processing
    Captured(CapturedAudio),
}

/// What a resolved device request did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantOutcome {
    Recording,
    /// Stop arrived before the grant; stream released, back to idle
    Aborted,
    /// No request was pending
    Ignored,
}

/// The single live capture session
pub struct CaptureSession<D: AudioInput> {
    device: D,
    sink: ChunkSink,
    sample_rate: u32,
    state: SessionState,
    buffer: SampleBuffer,
    stream: Option<D::Stream>,
    cancel: CancelToken,
    session: Option<(SessionId, DateTime<Utc>)>,
}

impl<D: AudioInput> CaptureSession<D> {
    pub fn new(device: D, sink: ChunkSink, sample_rate: u32) -> Self {
        Self {
            device,
            sink,
            sample_rate,
            state: SessionState::Idle,
            buffer: SampleBuffer::new(),
            stream: None,
            cancel: CancelToken::default(),
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.map(|(id, _)| id)
    }

    /// A stop arrived while the device request is still pending
    pub fn stop_requested(&self) -> bool {
        self.state == SessionState::Acquiring && self.cancel.is_cancelled()
    }

    fn transition(&mut self, to: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    /// Start signal: begin acquiring the microphone.
    ///
    /// Returns the pending device request the host must await and feed back
    /// through [`CaptureSession::on_granted`]. Ignored unless idle; while
    /// acquiring it withdraws an earlier stop instead.
    pub fn start(&mut self) -> Option<PendingGrant<D::Stream>> {
        if self.stop_requested() {
            self.cancel = CancelToken::default();
            debug!("Start re-signalled before the grant, keeping the request");
            return None;
        }
        if self.state != SessionState::Idle {
            debug!("Start ignored while {:?}", self.state);
            return None;
        }

        let id = SessionId::new();
        self.session = Some((id, Utc::now()));
        self.buffer.clear();
        self.cancel = CancelToken::default();
        self.transition(SessionState::Acquiring);
        info!("Session {} requesting microphone", id);

        Some(self.device.acquire(self.sink.clone()))
    }

    /// The pending device request resolved
    pub fn on_granted(
        &mut self,
        result: Result<D::Stream, DeviceError>,
    ) -> Result<GrantOutcome, DeviceError> {
        if self.state != SessionState::Acquiring {
            // Dropping a stray stream releases it
            warn!("Device grant arrived while {:?}", self.state);
            return Ok(GrantOutcome::Ignored);
        }

        match result {
            Err(e) => {
                self.transition(SessionState::Idle);
                Err(e)
            }
            Ok(stream) if self.cancel.is_cancelled() => {
                drop(stream);
                self.transition(SessionState::Idle);
                info!("Start released before the microphone was granted");
                Ok(GrantOutcome::Aborted)
            }
            Ok(stream) => {
                self.stream = Some(stream);
                self.transition(SessionState::Recording);
                if let Some(id) = self.session_id() {
                    info!("Session {} recording", id);
                }
                Ok(GrantOutcome::Recording)
            }
        }
    }

    /// The granted stream died. Ends a recording without processing it.
    pub fn on_lost(&mut self, error: DeviceError) -> Result<(), DeviceError> {
        if self.state != SessionState::Recording {
            debug!("Device loss ignored while {:?}", self.state);
            return Ok(());
        }
        self.stream = None;
        self.buffer.clear();
        self.transition(SessionState::Idle);
        Err(error)
    }

    /// A device callback's chunk; dropped unless recording
    pub fn on_chunk(&mut self, chunk: AudioChunk) -> bool {
        if self.state != SessionState::Recording {
            return false;
        }
        self.buffer.push(chunk);
        true
    }

    /// Stop signal: end the recording, or cancel a pending start
    pub fn stop(&mut self) -> StopOutcome {
        match self.state {
            SessionState::Acquiring => {
                self.cancel.cancel();
                StopOutcome::CancelRequested
            }
            SessionState::Recording => {
                self.transition(SessionState::Stopping);
                // Tear down the device before anything else
                self.stream = None;
                debug!(
                    "Merging {} chunks ({} samples)",
                    self.buffer.chunk_count(),
                    self.buffer.len()
                );
                let samples = self.buffer.merge();
                self.transition(SessionState::Processing);

                let session = self.session_id().unwrap_or_default();
                StopOutcome::Captured(CapturedAudio {
                    session,
                    samples,
                    sample_rate: self.sample_rate,
                })
            }
            _ => {
                debug!("Stop ignored while {:?}", self.state);
                StopOutcome::Ignored
            }
        }
    }

    /// Processing finished (successfully or not)
    pub fn finish(&mut self) {
        if self.state == SessionState::Processing {
            if let Some((id, started_at)) = self.session {
                let elapsed = Utc::now() - started_at;
                info!("Session {} finished after {} ms", id, elapsed.num_milliseconds());
            }
            self.transition(SessionState::Idle);
        }
    }
}
