use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use syncplay::audio::CpalAudioOutput;
use syncplay::decoder::FfmpegSource;
use syncplay::renderer::{Display, MemoryDisplay, WgpuDisplay};
use syncplay::utils::{format_duration, load_config, Config};
use syncplay::window::PlayerWindow;
use syncplay::{DriverOptions, PlaybackDriver, PlaybackReport, PlayerError};

/// syncplay - plays a Theora/Vorbis file with audio and video kept in sync
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to play [default: video_test.ogv]
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Window width
    #[arg(long)]
    width: Option<u32>,

    /// Window height
    #[arg(long)]
    height: Option<u32>,

    /// Audio device buffer size in frames
    #[arg(long, value_name = "FRAMES")]
    buffer_frames: Option<u32>,

    /// Play without opening a window
    #[arg(long)]
    headless: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Read configuration from this file instead of the default locations
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = build_config(&args);
    let log_level = match (&config, args.debug) {
        (_, true) => "debug".to_string(),
        (Ok(config), false) => config.general.log_level.clone(),
        (Err(_), false) => "info".to_string(),
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting syncplay v{}", env!("CARGO_PKG_VERSION"));

    match run(&args, &config) {
        Ok(report) => {
            info!(
                "Played {} ({} frames, {} dropped){}",
                format_duration(report.position),
                report.frames_presented,
                report.frames_dropped,
                if report.terminated_early { ", stopped early" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            let init_failure = e
                .downcast_ref::<PlayerError>()
                .is_some_and(PlayerError::is_init_failure);
            if init_failure {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

/// Defaults, config files and environment, then command line flags
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_config().context("Failed to load configuration")?,
    };

    if let Some(file) = &args.file {
        config.playback.input_path = file.clone();
    }
    if let Some(width) = args.width {
        config.window.width = width;
    }
    if let Some(height) = args.height {
        config.window.height = height;
    }
    if let Some(frames) = args.buffer_frames {
        config.audio.buffer_frames = frames;
    }
    if args.debug {
        config.general.log_level = "debug".to_string();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(args: &Args, config: &Config) -> Result<PlaybackReport> {
    let path = &config.playback.input_path;
    let source = FfmpegSource::open(path, config.playback.max_buffered_frames)
        .map_err(|e| PlayerError::Init(format!("Cannot play {}: {}", path.display(), e)))?;

    let options = DriverOptions::from_config(config);
    let audio = CpalAudioOutput::new();

    if args.headless {
        play(source, MemoryDisplay::new(), audio, options)
    } else {
        let window = PlayerWindow::open(&config.window)?;
        let display = WgpuDisplay::new(window)?;
        play(source, display, audio, options)
    }
}

fn play<D: Display>(
    source: FfmpegSource,
    display: D,
    audio: CpalAudioOutput,
    options: DriverOptions,
) -> Result<PlaybackReport> {
    let mut driver = PlaybackDriver::new(source, display, audio, options);

    let shutdown = driver.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::Release)) {
        warn!("Ctrl-C handler not installed: {}", e);
    }

    Ok(driver.run()?)
}
