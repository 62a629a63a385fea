//! Microphone capture
//!
//! [`AudioInput`] is the device boundary used by the capture session. The
//! PipeWire backend runs its main loop on a dedicated thread and reports the
//! device grant once the stream is actually streaming.

use log::{debug, error, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::buffer::AudioChunk;
use super::tap::SignalTap;
use crate::error::DeviceError;

/// An in-flight device access request
pub type PendingGrant<S> = Pin<Box<dyn Future<Output = Result<S, DeviceError>> + Send>>;

/// Source of live mono microphone audio.
///
/// The granted stream is released when it is dropped.
pub trait AudioInput {
    type Stream: Send + 'static;

    /// Request exclusive audio-only capture, delivering chunks into `sink`
    fn acquire(&self, sink: ChunkSink) -> PendingGrant<Self::Stream>;
}

/// What a granted stream reports back to the controller
#[derive(Debug)]
pub enum CaptureEvent {
    Chunk(AudioChunk),
    /// The device failed after the grant; no more chunks will arrive
    Lost(DeviceError),
}

/// Where device callbacks deliver captured audio
#[derive(Clone)]
pub struct ChunkSink {
    sender: mpsc::UnboundedSender<CaptureEvent>,
    tap: SignalTap,
}

impl ChunkSink {
    pub fn new(tap: SignalTap) -> (Self, mpsc::UnboundedReceiver<CaptureEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, tap }, receiver)
    }

    /// Hand one callback's samples to the session and the input tap
    pub fn deliver(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        self.tap.write(samples);
        // Receiver gone means the controller is shutting down
        let _ = self
            .sender
            .send(CaptureEvent::Chunk(AudioChunk::from(samples.to_vec())));
    }

    /// Report that a running stream died
    pub fn lost(&self, error: DeviceError) {
        let _ = self.sender.send(CaptureEvent::Lost(error));
    }
}

/// Audio capture configuration
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Sample rate (default: 16000)
    pub sample_rate: u32,
    /// How long to wait for the stream to start before giving up
    pub grant_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            grant_timeout: Duration::from_secs(5),
        }
    }
}

/// PipeWire microphone backend
#[derive(Clone, Debug, Default)]
pub struct PipeWireInput {
    config: CaptureConfig,
}

impl PipeWireInput {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

/// A live PipeWire capture stream; dropping it stops the stream and joins
/// its thread
pub struct PipeWireStream {
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<CaptureCommand>>,
}

enum CaptureCommand {
    Stop,
}

impl PipeWireStream {
    fn stop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(CaptureCommand::Stop);
        }
        if let Some(handle) = self.thread_handle.take() {
            reap(handle);
        }
    }
}

/// Join a device thread without parking the async thread on it.
///
/// Inside a runtime the join moves to the blocking pool; outside one it
/// happens inline.
pub(super) fn reap(handle: JoinHandle<()>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(move || {
                let _ = handle.join();
            });
        }
        Err(_) => {
            let _ = handle.join();
        }
    }
}

impl Drop for PipeWireStream {
    fn drop(&mut self) {
        self.stop();
        debug!("Capture stream released");
    }
}

/// One-shot grant notification shared by the stream callbacks and the
/// capture thread
#[derive(Clone)]
struct GrantSlot {
    inner: Arc<Mutex<Option<oneshot::Sender<Result<(), DeviceError>>>>>,
}

impl GrantSlot {
    fn new() -> (Self, oneshot::Receiver<Result<(), DeviceError>>) {
        let (sender, receiver) = oneshot::channel();
        let slot = Self {
            inner: Arc::new(Mutex::new(Some(sender))),
        };
        (slot, receiver)
    }

    /// First resolution wins; returns false once the grant was already
    /// decided
    fn resolve(&self, result: Result<(), DeviceError>) -> bool {
        let sender = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                let _ = sender.send(result);
                true
            }
            None => false,
        }
    }
}

impl AudioInput for PipeWireInput {
    type Stream = PipeWireStream;

    fn acquire(&self, sink: ChunkSink) -> PendingGrant<PipeWireStream> {
        let (grant, granted) = GrantSlot::new();
        let (sender, receiver) = pw::channel::channel::<CaptureCommand>();
        let sample_rate = self.config.sample_rate;
        let timeout = self.config.grant_timeout;

        let handle = thread::spawn(move || {
            let result = run_capture_loop(sink, sample_rate, grant.clone(), receiver);
            if let Err(e) = result {
                error!("Capture error: {}", e);
                grant.resolve(Err(e));
            } else {
                grant.resolve(Err(DeviceError::Backend(
                    "capture stopped before it started".to_string(),
                )));
            }
        });

        let mut stream = PipeWireStream {
            thread_handle: Some(handle),
            sender: Some(sender),
        };

        Box::pin(async move {
            let outcome = match tokio::time::timeout(timeout, granted).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(DeviceError::Backend("capture thread exited".to_string())),
                Err(_) => Err(DeviceError::NoDevice),
            };
            match outcome {
                Ok(()) => Ok(stream),
                Err(e) => {
                    // Release whatever was partially acquired before surfacing
                    stream.stop();
                    Err(e)
                }
            }
        })
    }
}

/// Classify a PipeWire stream error message
fn device_error(message: &str) -> DeviceError {
    let lower = message.to_lowercase();
    if lower.contains("denied") || lower.contains("permission") || lower.contains("not allowed") {
        DeviceError::PermissionDenied(message.to_string())
    } else if lower.contains("busy") {
        DeviceError::Busy(message.to_string())
    } else if lower.contains("no such") || lower.contains("not found") {
        DeviceError::NoDevice
    } else {
        DeviceError::Backend(message.to_string())
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    sink: ChunkSink,
    sample_rate: u32,
    grant: GrantSlot,
    receiver: pw::channel::Receiver<CaptureCommand>,
) -> Result<(), DeviceError> {
    pw::init();

    let backend = |what: &str, e: &dyn std::fmt::Display| {
        DeviceError::Backend(format!("Failed to {}: {}", what, e))
    };

    let mainloop =
        pw::main_loop::MainLoopRc::new(None).map_err(|e| backend("create main loop", &e))?;

    let context =
        pw::context::ContextRc::new(&mainloop, None).map_err(|e| backend("create context", &e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| backend("connect to PipeWire", &e))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        CaptureCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        sink: ChunkSink,
        grant: GrantSlot,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        sink,
        grant,
        mainloop_weak: mainloop.downgrade(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Murmur",
    };

    let stream = pw::stream::StreamBox::new(&core, "murmur-capture", props)
        .map_err(|e| backend("create stream", &e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Capture stream state: {:?} -> {:?}", old, new);
            match new {
                pw::stream::StreamState::Streaming => {
                    user_data.grant.resolve(Ok(()));
                }
                pw::stream::StreamState::Error(message) => {
                    warn!("Capture stream error: {}", message);
                    let error = device_error(&message);
                    if !user_data.grant.resolve(Err(error.clone())) {
                        user_data.sink.lost(error);
                    }
                    if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                        mainloop.quit();
                    }
                }
                _ => {}
            }
        })
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if let Err(e) = user_data.format.parse(param) {
                error!("Failed to parse capture format: {:?}", e);
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let sample_size = std::mem::size_of::<f32>();
            let size = data.chunk().size() as usize;

            let Some(raw) = data.data() else {
                return;
            };
            let raw = &raw[..size.min(raw.len())];

            // Convert bytes to f32 and mix down to mono
            let mono: Vec<f32> = raw
                .chunks_exact(sample_size * n_channels)
                .map(|frame| {
                    let sum: f32 = frame
                        .chunks_exact(sample_size)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .sum();
                    sum / n_channels as f32
                })
                .collect();

            user_data.sink.deliver(&mono);
        })
        .register()
        .map_err(|e| backend("register stream listener", &e))?;

    // Request F32LE mono at the capture rate; PipeWire converts as needed
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(sample_rate);
    audio_info.set_channels(1);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| DeviceError::Backend(format!("Failed to serialize audio format: {:?}", e)))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| DeviceError::Backend("Failed to build audio format pod".to_string()))?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| backend("connect stream", &e))?;

    // Run until stopped
    mainloop.run();

    Ok(())
}
