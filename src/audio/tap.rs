//! Signal taps: a shared window of the most recent samples of a live signal
//!
//! Device threads write into a tap; analysers read from it on the render
//! thread. Only the last `capacity` samples are retained.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Default retained window, comfortably larger than any analyser FFT
pub const DEFAULT_TAP_CAPACITY: usize = 2048;

/// Shared handle to a live signal - thread-safe
#[derive(Clone, Debug)]
pub struct SignalTap {
    inner: Arc<Mutex<TapInner>>,
}

#[derive(Debug)]
struct TapInner {
    name: &'static str,
    window: VecDeque<f32>,
    capacity: usize,
}

impl SignalTap {
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, DEFAULT_TAP_CAPACITY)
    }

    pub fn with_capacity(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(TapInner {
                name,
                window: VecDeque::with_capacity(capacity),
                capacity,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TapInner> {
        // A panicking writer cannot leave the window inconsistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &'static str {
        self.lock().name
    }

    /// Append samples, discarding the oldest beyond capacity
    pub fn write(&self, samples: &[f32]) {
        let mut inner = self.lock();
        let capacity = inner.capacity;
        let keep = &samples[samples.len().saturating_sub(capacity)..];
        let overflow = (inner.window.len() + keep.len()).saturating_sub(capacity);
        inner.window.drain(..overflow);
        inner.window.extend(keep);
    }

    /// Copy the most recent `len` samples into `out`, zero-padding at the
    /// front when fewer are available
    pub fn read_latest(&self, out: &mut [f32]) {
        let inner = self.lock();
        let available = inner.window.len().min(out.len());
        let pad = out.len() - available;
        out[..pad].fill(0.0);
        let start = inner.window.len() - available;
        for (dst, src) in out[pad..].iter_mut().zip(inner.window.range(start..)) {
            *dst = *src;
        }
    }

}
