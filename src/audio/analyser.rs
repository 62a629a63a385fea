//! Frequency-domain energy snapshots of a live signal
//!
//! Each [`EnergyAnalyser::update`] takes the latest `fft_size` samples from
//! its tap, applies a Blackman window and an FFT, smooths magnitudes over
//! time and maps them onto a byte scale between two decibel limits:
//!
//! ```text
//! byte[k] = 255 * (dB(|X[k]|) - min_db) / (max_db - min_db), clamped to 0..=255
//! ```

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use super::tap::SignalTap;

/// Analyser parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyserConfig {
    /// FFT window length; the snapshot has `fft_size / 2` bins
    pub fft_size: usize,
    /// Weight of the previous magnitude in [0, 1)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 32,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }
}

/// Energy analyser bound to one signal tap; [`EnergyAnalyser::level`] reads
/// the last snapshot
pub struct EnergyAnalyser {
    tap: SignalTap,
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frame: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    data: Vec<u8>,
}

impl EnergyAnalyser {
    pub fn new(tap: SignalTap, config: AnalyserConfig) -> Self {
        // Even and at least two samples, so there is at least one bin
        let fft_size = (config.fft_size.max(2) + 1) & !1;
        let config = AnalyserConfig { fft_size, ..config };
        let bins = fft_size / 2;

        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let window = blackman_window(fft_size);

        Self {
            tap,
            config,
            fft,
            window,
            frame: vec![0.0; fft_size],
            spectrum: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; bins],
            data: vec![0; bins],
        }
    }

    /// Refresh the snapshot from the live signal
    pub fn update(&mut self) {
        self.tap.read_latest(&mut self.frame);

        let n = self.config.fft_size;
        for ((out, &sample), &w) in self.spectrum.iter_mut().zip(&self.frame).zip(&self.window) {
            *out = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.spectrum);

        let tau = self.config.smoothing.clamp(0.0, 1.0);
        let range = self.config.max_decibels - self.config.min_decibels;
        for k in 0..self.smoothed.len() {
            let magnitude = self.spectrum[k].norm() / n as f32;
            let value = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = if value.is_finite() { value } else { 0.0 };

            let db = 20.0 * self.smoothed[k].log10();
            let scaled = 255.0 * (db - self.config.min_decibels) / range;
            // -inf dB for silence lands on 0 here
            self.data[k] = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Mean bin magnitude normalized to [0, 1]
    pub fn level(&self) -> f32 {
        average_level(&self.data)
    }
}

/// Mean of a byte snapshot normalized to [0, 1]
fn average_level(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    sum as f32 / data.len() as f32 / 255.0
}

fn blackman_window(n: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
