//! Per-frame visualizer state
//!
//! Each tick refreshes the input and output analysers, takes the louder of
//! the two signals, and eases the displayed volume toward it. The visual
//! parameters are pure functions of (volume, time, viewport).

use log::debug;
use std::io::Write;

use crate::audio::{AnalyserConfig, EnergyAnalyser, SignalTap};

/// Reference diameter of the orb in logical pixels
const ORB_SIZE: f32 = 400.0;

/// Display area the visual is fitted into
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Transform parameters for one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualParams {
    pub scale: f32,
    pub rotation_deg: f32,
    pub glow_radius: f32,
    pub glow_opacity: f32,
}

/// Map a smoothed volume onto visual parameters
pub fn visual_params(volume: f32, time_ms: f64, viewport: Viewport) -> VisualParams {
    let min_dim = viewport.width.min(viewport.height);
    let base_scale = (min_dim * 0.8 / ORB_SIZE).min(0.5);
    let bump = (volume * 0.5).min(0.3);

    let phase = (time_ms * 0.002).sin() as f32;

    VisualParams {
        scale: base_scale + bump,
        rotation_deg: phase * volume * 10.0,
        glow_radius: 10.0 + volume * 50.0,
        glow_opacity: (volume * 1.2).min(0.8),
    }
}

/// Exponential approach toward a target level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeSmoother {
    current: f32,
    coefficient: f32,
}

impl VolumeSmoother {
    pub fn new(coefficient: f32) -> Self {
        Self {
            current: 0.0,
            coefficient: coefficient.clamp(0.0, 1.0),
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Move a fixed fraction of the way toward `target`
    pub fn step(&mut self, target: f32) -> f32 {
        self.current += (target - self.current) * self.coefficient;
        self.current
    }
}

/// Level of one signal for the visual: twice the mean bin magnitude, capped
fn signal_level(analyser: Option<&EnergyAnalyser>) -> f32 {
    analyser.map_or(0.0, |a| (a.level() * 2.0).min(1.0))
}

/// Receives the parameters of every rendered frame, along with the
/// current user-facing status message if there is one
pub trait VisualSink {
    fn present(&mut self, params: &VisualParams, volume: f32, status: Option<&str>);
}

/// Discards frames
pub struct NullSink;

impl VisualSink for NullSink {
    fn present(&mut self, _params: &VisualParams, _volume: f32, _status: Option<&str>) {}
}

/// Single-line meter redrawn in place on stderr
pub struct TerminalMeter {
    width: usize,
}

impl TerminalMeter {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn line(&self, params: &VisualParams, volume: f32, status: Option<&str>) -> String {
        let filled = ((volume.clamp(0.0, 1.0) * self.width as f32).round() as usize).min(self.width);
        let mut line = format!(
            "[{}{}] vol {:.2} scale {:.2} rot {:+5.1}° glow {:.0}px @ {:.2}",
            "#".repeat(filled),
            " ".repeat(self.width - filled),
            volume,
            params.scale,
            params.rotation_deg,
            params.glow_radius,
            params.glow_opacity
        );
        if let Some(status) = status {
            line.push_str(" | ");
            line.push_str(status);
        }
        line
    }
}

impl VisualSink for TerminalMeter {
    fn present(&mut self, params: &VisualParams, volume: f32, status: Option<&str>) {
        let mut stderr = std::io::stderr().lock();
        // Clear to end of line so a shorter line doesn't leave a stale status
        let _ = write!(stderr, "\r{}\x1b[K", self.line(params, volume, status));
        let _ = stderr.flush();
    }
}

/// Visualizer state driven once per display frame
pub struct RenderLoop {
    config: AnalyserConfig,
    input: Option<EnergyAnalyser>,
    output: Option<EnergyAnalyser>,
    smoother: VolumeSmoother,
    viewport: Viewport,
}

impl RenderLoop {
    pub fn new(config: AnalyserConfig, smoothing: f32, viewport: Viewport) -> Self {
        Self {
            config,
            input: None,
            output: None,
            smoother: VolumeSmoother::new(smoothing),
            viewport,
        }
    }

    /// Bind the microphone tap; an analyser exists for it afterwards
    pub fn bind_input(&mut self, tap: SignalTap) {
        debug!("Bound {} analyser", tap.name());
        self.input = Some(EnergyAnalyser::new(tap, self.config));
    }

    /// Bind the playback tap; an analyser exists for it afterwards
    pub fn bind_output(&mut self, tap: SignalTap) {
        debug!("Bound {} analyser", tap.name());
        self.output = Some(EnergyAnalyser::new(tap, self.config));
    }

    /// Current smoothed volume in [0, 1]
    pub fn volume(&self) -> f32 {
        self.smoother.current()
    }

    /// Advance one frame
    pub fn tick(&mut self, time_ms: f64) -> VisualParams {
        if let Some(analyser) = self.input.as_mut() {
            analyser.update();
        }
        if let Some(analyser) = self.output.as_mut() {
            analyser.update();
        }

        let target = signal_level(self.input.as_ref()).max(signal_level(self.output.as_ref()));
        let volume = self.smoother.step(target);
        visual_params(volume, time_ms, self.viewport)
    }
}
