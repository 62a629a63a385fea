//! Audio playback using PipeWire
//!
//! Renders a [`SharedTimeline`] continuously for the lifetime of the output
//! context. Silence is rendered while nothing is scheduled so the timeline
//! clock keeps tracking real time.

use log::{debug, error};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::thread::{self, JoinHandle};

use super::capture::reap;
use super::output::SharedTimeline;

/// A playback device that renders a timeline for as long as the returned
/// handle lives
pub trait AudioOutput {
    type Handle: Send + 'static;

    fn open(&self, timeline: SharedTimeline) -> Self::Handle;
}

/// The default PipeWire sink
#[derive(Clone, Copy, Debug, Default)]
pub struct PipeWirePlayback;

impl AudioOutput for PipeWirePlayback {
    type Handle = PipeWireOutput;

    fn open(&self, timeline: SharedTimeline) -> PipeWireOutput {
        PipeWireOutput::start(timeline)
    }
}

/// Audio player using PipeWire
pub struct PipeWireOutput {
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<PlaybackCommand>>,
}

enum PlaybackCommand {
    Stop,
}

impl PipeWireOutput {
    /// Start rendering the timeline on a dedicated PipeWire thread
    pub fn start(timeline: SharedTimeline) -> Self {
        // Create channel for stopping the loop
        let (sender, receiver) = pw::channel::channel::<PlaybackCommand>();

        let handle = thread::spawn(move || {
            if let Err(e) = run_playback_loop(timeline, receiver) {
                error!("Playback error: {}", e);
            }
        });

        Self {
            thread_handle: Some(handle),
            sender: Some(sender),
        }
    }

    /// Stop playback and join the device thread off the async thread
    pub fn stop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PlaybackCommand::Stop);
        }

        if let Some(handle) = self.thread_handle.take() {
            reap(handle);
        }
    }
}

impl Drop for PipeWireOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the PipeWire playback loop in a background thread
fn run_playback_loop(
    timeline: SharedTimeline,
    receiver: pw::channel::Receiver<PlaybackCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PlaybackCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        timeline: SharedTimeline,
        mono: Vec<f32>,
    }

    let sample_rate = timeline.sample_rate();
    let user_data = UserData {
        format: Default::default(),
        timeline,
        mono: Vec::new(),
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Murmur",
    };

    let stream = pw::stream::StreamBox::new(&core, "murmur-playback", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
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
                error!("Failed to parse playback format: {:?}", e);
                return;
            }
            debug!(
                "Playback format: {} Hz, {} channel(s)",
                user_data.format.rate(),
                user_data.format.channels()
            );
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
            let stride = sample_size * n_channels;

            let Some(slice) = data.data() else {
                return;
            };

            let n_frames = slice.len() / stride;
            user_data.mono.resize(n_frames, 0.0);
            user_data.timeline.render(&mut user_data.mono);

            // Duplicate the mono timeline into every device channel
            for (frame, &sample) in user_data.mono.iter().enumerate() {
                let bytes = sample.to_le_bytes();
                for channel in 0..n_channels {
                    let offset = frame * stride + channel * sample_size;
                    slice[offset..offset + sample_size].copy_from_slice(&bytes);
                }
            }

            let chunk = data.chunk_mut();
            *chunk.offset_mut() = 0;
            *chunk.stride_mut() = stride as i32;
            *chunk.size_mut() = (n_frames * stride) as u32;
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Request F32LE mono at the playback rate; PipeWire converts as needed
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
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values).ok_or("Failed to build audio format pod")?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Run until stopped
    mainloop.run();

    Ok(())
}
