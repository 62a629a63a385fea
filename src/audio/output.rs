//! Output context: playback timeline, cursor and scheduling
//!
//! The timeline clock advances only as the output device renders frames, so
//! `current_time` is the audible position. Segments are queued back to back:
//! each starts at `max(current_time, cursor)` and pushes the cursor forward
//! by its own duration.

use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::decoder::PlaybackBuffer;
use super::tap::SignalTap;

/// Next free start time on the output timeline, in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackCursor {
    next_start: f64,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `duration` seconds starting no earlier than `now`.
    /// Returns the reserved start time.
    pub fn reserve(&mut self, now: f64, duration: f64) -> f64 {
        let start = now.max(self.next_start);
        self.next_start = start + duration.max(0.0);
        start
    }
}

/// Where a segment landed on the timeline
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledSegment {
    pub start: f64,
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

struct QueuedSegment {
    start_frame: u64,
    samples: Vec<f32>,
}

impl QueuedSegment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Shared playback timeline - thread-safe
///
/// The output device thread calls [`SharedTimeline::render`]; the controller
/// enqueues segments through [`OutputContext::schedule`].
#[derive(Clone)]
pub struct SharedTimeline {
    inner: Arc<Mutex<TimelineInner>>,
}

struct TimelineInner {
    sample_rate: u32,
    /// Frames handed to the device so far
    frames_rendered: u64,
    queue: VecDeque<QueuedSegment>,
    tap: SignalTap,
}

impl SharedTimeline {
    pub fn new(sample_rate: u32, tap: SignalTap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TimelineInner {
                sample_rate,
                frames_rendered: 0,
                queue: VecDeque::new(),
                tap,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimelineInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    /// Audible position in seconds
    pub fn current_time(&self) -> f64 {
        let inner = self.lock();
        inner.frames_rendered as f64 / inner.sample_rate as f64
    }

    fn enqueue(&self, start: f64, samples: Vec<f32>) {
        let mut inner = self.lock();
        let start_frame = (start * inner.sample_rate as f64).round() as u64;
        inner.queue.push_back(QueuedSegment {
            start_frame,
            samples,
        });
    }

    /// Fill `out` with the next frames of the timeline and advance the clock.
    /// Gaps between segments render as silence.
    pub fn render(&self, out: &mut [f32]) {
        let mut inner = self.lock();
        let first = inner.frames_rendered;

        for (i, slot) in out.iter_mut().enumerate() {
            let frame = first + i as u64;
            while inner
                .queue
                .front()
                .is_some_and(|segment| frame >= segment.end_frame())
            {
                inner.queue.pop_front();
            }
            *slot = match inner.queue.front() {
                Some(segment) if frame >= segment.start_frame => {
                    segment.samples[(frame - segment.start_frame) as usize]
                }
                _ => 0.0,
            };
        }

        inner.frames_rendered += out.len() as u64;
        inner.tap.write(out);
    }
}

/// The output side of the pipeline: one timeline, one cursor
pub struct OutputContext {
    timeline: SharedTimeline,
    cursor: PlaybackCursor,
    tap: SignalTap,
}

impl OutputContext {
    pub fn new(sample_rate: u32) -> Self {
        let tap = SignalTap::new("output");
        Self {
            timeline: SharedTimeline::new(sample_rate, tap.clone()),
            cursor: PlaybackCursor::new(),
            tap,
        }
    }

    /// Handle for the device thread that renders this context
    pub fn timeline(&self) -> SharedTimeline {
        self.timeline.clone()
    }

    /// Signal tap mirroring what the device renders
    pub fn tap(&self) -> SignalTap {
        self.tap.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.timeline.sample_rate()
    }

    pub fn current_time(&self) -> f64 {
        self.timeline.current_time()
    }

    /// Queue a buffer right after everything already scheduled
    pub fn schedule(&mut self, buffer: &PlaybackBuffer) -> ScheduledSegment {
        let samples = buffer.mixdown();
        let duration = samples.len() as f64 / self.sample_rate() as f64;
        let start = self.cursor.reserve(self.current_time(), duration);
        debug!("Scheduled {:.3}s of audio at t={:.3}s", duration, start);
        self.timeline.enqueue(start, samples);

        ScheduledSegment { start, duration }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl PlaybackCursor {
        pub(crate) fn position(&self) -> f64 {
            self.next_start
        }
    }

    impl SharedTimeline {
        /// Number of segments not yet fully played
        pub(crate) fn pending(&self) -> usize {
            self.lock().queue.len()
        }
    }

    impl OutputContext {
        pub(crate) fn cursor(&self) -> PlaybackCursor {
            self.cursor
        }
    }

    fn tone(frames: usize, value: f32) -> PlaybackBuffer {
        PlaybackBuffer::mono(vec![value; frames], 24000)
    }

    #[test]
    fn test_cursor_back_to_back() {
        let mut cursor = PlaybackCursor::new();
        let t0 = cursor.reserve(0.0, 1.5);
        let t1 = cursor.reserve(0.0, 0.5);
        assert_eq!(t0, 0.0);
        assert_eq!(t1, 1.5);
        assert_eq!(cursor.position(), 2.0);
    }

    #[test]
    fn test_cursor_never_schedules_in_the_past() {
        let mut cursor = PlaybackCursor::new();
        cursor.reserve(0.0, 1.0);
        // Playback already moved past the cursor
        let start = cursor.reserve(3.0, 1.0);
        assert_eq!(start, 3.0);
        assert_eq!(cursor.position(), 4.0);
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let mut cursor = PlaybackCursor::new();
        let mut last = cursor.position();
        for (now, duration) in [(0.0, 0.2), (0.1, 0.0), (5.0, 1.0), (2.0, 0.3)] {
            cursor.reserve(now, duration);
            assert!(cursor.position() >= last);
            last = cursor.position();
        }
    }

    #[test]
    fn test_schedule_two_segments() {
        let mut output = OutputContext::new(24000);
        let first = output.schedule(&tone(2400, 0.5));
        let second = output.schedule(&tone(4800, -0.5));

        assert_eq!(first.start, 0.0);
        assert_eq!(first.duration, 0.1);
        assert_eq!(second.start, first.start + first.duration);
        assert!(second.start >= first.end());
        assert_eq!(output.cursor().position(), second.end());
    }

    #[test]
    fn test_render_plays_segments_in_order_without_gaps() {
        let mut output = OutputContext::new(24000);
        output.schedule(&tone(3, 0.25));
        output.schedule(&tone(2, -0.75));

        let timeline = output.timeline();
        let mut out = [1.0f32; 8];
        timeline.render(&mut out);
        assert_eq!(out, [0.25, 0.25, 0.25, -0.75, -0.75, 0.0, 0.0, 0.0]);
        assert_eq!(timeline.pending(), 0);
        assert_eq!(output.current_time(), 8.0 / 24000.0);
    }

    #[test]
    fn test_segment_after_idle_starts_now() {
        let mut output = OutputContext::new(24000);
        let mut out = vec![0.0f32; 2400];
        output.timeline().render(&mut out);

        let segment = output.schedule(&tone(10, 0.5));
        assert_eq!(segment.start, 0.1);

        let mut next = [0.0f32; 12];
        output.timeline().render(&mut next);
        assert_eq!(&next[..10], &[0.5; 10]);
        assert_eq!(&next[10..], &[0.0; 2]);
    }

    #[test]
    fn test_render_feeds_output_tap() {
        let mut output = OutputContext::new(24000);
        output.schedule(&tone(4, 0.5));
        let mut out = [0.0f32; 4];
        output.timeline().render(&mut out);

        let mut seen = [0.0f32; 4];
        output.tap().read_latest(&mut seen);
        assert_eq!(seen, [0.5; 4]);
    }
}
