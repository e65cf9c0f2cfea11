//! Application entry point — noise-sentry.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`).
//! 2. Load [`MonitorConfig`] from `settings.toml` (defaults when missing),
//!    apply CLI overrides, validate.
//! 3. Load the alarm clip and resolve the output device — any failure here
//!    is fatal and happens before the input stream opens.
//! 4. Build the speech classifier for the configured backend (fails fast on
//!    an incompatible frame length).
//! 5. Install the Ctrl+C handler.
//! 6. Start the cpal capture stream and run the monitor loop on the main
//!    thread until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use noise_sentry::audio::{
    AlarmClip, AlarmPlayer, AudioCapture, EnergyVad, SpeechClassifier, WebRtcVad,
};
use noise_sentry::config::{MonitorConfig, VadBackend};
use noise_sentry::monitor::{AlarmDebouncer, MonitorLoop};

/// Monitor ambient sound levels and trigger an alarm when thresholds are
/// exceeded.
#[derive(Parser)]
#[command(name = "noise-sentry", version, about)]
struct Cli {
    /// Noise threshold level (0.0 to 1.0)
    #[arg(short = 't', long)]
    threshold: Option<f32>,

    /// Speech threshold level (0.0 to 1.0); 0 disables the speech path
    #[arg(short = 's', long)]
    speech_threshold: Option<f32>,

    /// Alarm sound file (bare names are resolved under "sounds/")
    #[arg(short = 'f', long)]
    alarm_file: Option<String>,

    /// Cooldown base in seconds between alarm repeats
    #[arg(short = 'd', long)]
    alarm_duration: Option<f32>,

    /// VAD aggressiveness mode (0 = least, 3 = most)
    #[arg(short = 'm', long)]
    vad_mode: Option<u8>,

    /// Speech classifier backend: "energy" or "webrtc"
    #[arg(short = 'b', long)]
    vad_backend: Option<String>,

    /// Frame length in milliseconds (default depends on the backend)
    #[arg(short = 'l', long)]
    frame_length: Option<u32>,

    /// Explicit settings file instead of the platform default
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Overlay CLI flags on top of the loaded settings.
fn apply_cli(config: &mut MonitorConfig, cli: &Cli) -> Result<()> {
    if let Some(v) = cli.threshold {
        config.threshold = v;
    }
    if let Some(v) = cli.speech_threshold {
        config.speech_threshold = v;
    }
    if let Some(v) = &cli.alarm_file {
        config.alarm_file = v.clone();
    }
    if let Some(v) = cli.alarm_duration {
        config.alarm_duration = v;
    }
    if let Some(v) = cli.vad_mode {
        config.vad_mode = v;
    }
    if let Some(v) = &cli.vad_backend {
        config.vad_backend = v.parse::<VadBackend>().map_err(|e| anyhow!(e))?;
    }
    if let Some(v) = cli.frame_length {
        config.frame_length_ms = Some(v);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load_from(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?,
        None => {
            // First run: write the defaults out so users have a settings
            // file to edit.  A write failure is not worth aborting over.
            if MonitorConfig::is_first_run() {
                if let Err(e) = MonitorConfig::default().save() {
                    log::warn!("could not write default settings: {e}");
                }
            }
            MonitorConfig::load().context("failed to read settings")?
        }
    };
    apply_cli(&mut config, &cli)?;
    config.validate()?;

    // Alarm resources first: a clip that cannot load or play must abort
    // before the input stream ever opens.
    let clip_path = config.alarm_path();
    let clip = AlarmClip::load(&clip_path)?;
    let player = AlarmPlayer::new(clip)?;
    log::info!(
        "alarm clip '{}' ({:.2} s), cooldown {:.1} s",
        clip_path.display(),
        player.clip_duration().as_secs_f32(),
        config.alarm_duration,
    );

    // The classifier is only built when the speech path participates;
    // construction validates the frame length for the chosen backend.
    let classifier: Option<Box<dyn SpeechClassifier>> = if config.speech_threshold().is_some() {
        let frame_ms = config.effective_frame_ms();
        let boxed: Box<dyn SpeechClassifier> = match config.vad_backend {
            VadBackend::Energy => Box::new(EnergyVad::new(config.vad_mode, frame_ms)?),
            VadBackend::WebRtc => Box::new(WebRtcVad::new(config.vad_mode, frame_ms)?),
        };
        Some(boxed)
    } else {
        None
    };

    let debouncer = AlarmDebouncer::new(
        config.threshold,
        config.speech_threshold(),
        config.cooldown(),
    );
    let mut monitor = MonitorLoop::new(config.threshold, debouncer, classifier, player);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl+C handler")?;
    }

    let (tx, rx) = mpsc::channel();
    let capture = AudioCapture::new()?;
    let stream = capture.start(config.frame_samples(), tx)?;

    println!("Monitoring sound levels... Press Ctrl+C to stop.");
    monitor.run(&rx, &stop)?;

    println!("\nExiting...");
    drop(stream);
    println!("Stopping audio stream. Goodbye!");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
