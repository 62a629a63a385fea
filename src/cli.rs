//! Command-line interface for Murmur
//!
//! Handles argument parsing and logging configuration.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

use crate::settings::Settings;

/// Murmur - push-to-talk voice conversations with a speech model
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace, -vvvv = all deps
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Settings file (defaults to ~/.config/murmur/config.json)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model identifier sent to the speech service
    #[arg(long)]
    pub model: Option<String>,

    /// Voice of the spoken reply
    #[arg(long)]
    pub voice: Option<String>,

    /// Don't send recordings shorter than this many milliseconds
    #[arg(long, value_name = "MS")]
    pub min_recording_ms: Option<u64>,

    /// Draw the visualizer as a meter on stderr
    #[arg(short, long)]
    pub meter: bool,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    /// Dependency logs (PipeWire, HTTP) only at -vvvv
    pub fn deps_verbose(&self) -> bool {
        !self.quiet && self.verbose >= 4
    }

    /// Apply command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(model) = &self.model {
            settings.api.model = model.clone();
        }
        if let Some(voice) = &self.voice {
            settings.api.voice = voice.clone();
        }
        if let Some(ms) = self.min_recording_ms {
            settings.policy.min_recording_ms = Some(ms);
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    // Set murmur modules to requested verbosity level
    builder.filter_module("murmur", args.log_level());

    if args.deps_verbose() {
        builder.filter_module("pipewire", args.log_level());
        builder.filter_module("reqwest", args.log_level());
        builder.filter_module("hyper", args.log_level());
    }

    builder.format_timestamp_millis().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("murmur").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&[]).log_level(), LevelFilter::Warn);
        assert_eq!(parse(&["-v"]).log_level(), LevelFilter::Info);
        assert_eq!(parse(&["-vv"]).log_level(), LevelFilter::Debug);
        assert_eq!(parse(&["-vvv"]).log_level(), LevelFilter::Trace);
        assert!(!parse(&["-vvv"]).deps_verbose());
        assert!(parse(&["-vvvv"]).deps_verbose());
        assert_eq!(parse(&["-q", "-vv"]).log_level(), LevelFilter::Error);
    }

    #[test]
    fn test_overrides() {
        let args = parse(&["--voice", "verse", "--min-recording-ms", "300", "--meter"]);
        assert!(args.meter);

        let mut settings = Settings::default();
        args.apply(&mut settings);
        assert_eq!(settings.api.voice, "verse");
        assert_eq!(settings.api.model, Settings::default().api.model);
        assert_eq!(settings.policy.min_recording_ms, Some(300));
    }

    #[test]
    fn test_config_path() {
        let args = parse(&["--config", "/tmp/murmur.json"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/murmur.json")));
    }
}
