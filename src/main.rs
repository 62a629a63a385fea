//! Murmur - push-to-talk voice conversations with a speech model on Linux
//!
//! This is the main entry point for the Murmur application.

mod api;
mod app;
mod audio;
mod cli;
mod error;
mod models;
mod pipeline;
mod render;
mod session;
mod settings;
mod tokio_runtime;
mod transport;

use anyhow::Context;
use app::{parse_command, App, Command};
use audio::{CaptureConfig, PipeWireInput, PipeWirePlayback};
use clap::Parser;
use log::{error, info, warn};
use pipeline::Pipeline;
use render::{NullSink, TerminalMeter, VisualSink};
use settings::Settings;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);

    info!("Starting Murmur");

    let runtime = tokio_runtime::build().context("Failed to create Tokio runtime")?;
    let result = runtime.block_on(run(&args, settings));

    // The stdin reader may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn run(args: &cli::Args, settings: Settings) -> anyhow::Result<()> {
    if settings.api.api_key.is_none() {
        warn!("No API key configured, requests are sent without credentials");
    }

    let input = PipeWireInput::new(CaptureConfig {
        sample_rate: settings.audio.capture_rate,
        grant_timeout: settings.audio.grant_timeout(),
    });
    let client =
        api::SpeechClient::new(settings.api.clone()).context("Failed to create HTTP client")?;
    let pipeline = Pipeline::new(
        settings.audio.capture_rate,
        settings.audio.playback_rate,
        client,
    )
    .with_min_duration(settings.min_recording());

    let sink: Box<dyn VisualSink> = if args.meter {
        Box::new(TerminalMeter::new(30))
    } else {
        Box::new(NullSink)
    };

    let app = App::new(input, &PipeWirePlayback, pipeline, &settings, sink);

    let (commands, receiver) = mpsc::channel(16);
    tokio::spawn(read_commands(commands));

    eprintln!("Enter = start/stop recording, p = press, r = release, q = quit");
    app.run(receiver, settings.render.fps).await;

    info!("Murmur exiting");
    Ok(())
}

/// Forward stdin lines as commands until EOF or until the controller exits
async fn read_commands(commands: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_command(&line) {
                Some(command) => {
                    if commands.send(command).await.is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command {:?}", line.trim()),
            },
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}
