//! Monitor settings, defaults, validation and TOML persistence.
//!
//! [`MonitorConfig`] is immutable for the process lifetime once the monitor
//! loop starts.  It can be persisted as `settings.toml` and overridden
//! field-by-field from the command line (see the binary's CLI).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;
use crate::audio::SAMPLE_RATE;

// ---------------------------------------------------------------------------
// VadBackend
// ---------------------------------------------------------------------------

/// Selects which speech classifier backs the speech-combined trigger path.
///
/// | Variant | Classifier                       | Frame length           |
/// |---------|----------------------------------|------------------------|
/// | Energy  | RMS over 30 ms windows           | any ≥ 30 ms            |
/// | WebRtc  | WebRTC GMM detector (`earshot`)  | multiple of 30 ms      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadBackend {
    /// Lightweight energy-windowed heuristic — no model, any frame length.
    Energy,
    /// WebRTC voice detector via the `earshot` crate.
    WebRtc,
}

impl Default for VadBackend {
    fn default() -> Self {
        Self::Energy
    }
}

impl FromStr for VadBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "energy" => Ok(Self::Energy),
            "webrtc" => Ok(Self::WebRtc),
            other => Err(format!(
                "unknown VAD backend '{other}' (expected 'energy' or 'webrtc')"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Validation failures — all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0.0, 1.0], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("alarm duration must be positive, got {0}")]
    NonPositiveDuration(f32),

    #[error("frame length must be positive, got {0} ms")]
    NonPositiveFrameLength(u32),

    #[error("VAD mode must be within 0..=3, got {0}")]
    VadModeOutOfRange(u8),
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Top-level monitor configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use noise_sentry::config::MonitorConfig;
///
/// // Load (returns Default when file is missing)
/// let config = MonitorConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Noise threshold in `[0.0, 1.0]`; RMS above this fires the alarm.
    pub threshold: f32,

    /// Speech threshold in `[0.0, 1.0]`.  `0.0` disables the speech path
    /// entirely (see [`MonitorConfig::speech_threshold`]); a positive value
    /// fires the alarm when the level exceeds it *and* speech is detected.
    pub speech_threshold: f32,

    /// Alarm WAV file.  Bare file names are resolved under the `sounds/`
    /// directory; absolute paths and paths containing a separator are used
    /// as-is.
    pub alarm_file: String,

    /// Cooldown base in seconds: the mandatory quiet gap after playback,
    /// and half the minimum elapsed time required between trigger starts.
    pub alarm_duration: f32,

    /// Speech classifier aggressiveness, `0` (lenient) to `3` (strict).
    pub vad_mode: u8,

    /// Which speech classifier backend to use.
    pub vad_backend: VadBackend,

    /// Frame length in milliseconds.  `None` picks the backend default:
    /// 1000 ms for `energy`, 30 ms for `webrtc`.
    pub frame_length_ms: Option<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            speech_threshold: 0.0,
            alarm_file: "ship.wav".into(),
            alarm_duration: 3.0,
            vad_mode: 1,
            vad_backend: VadBackend::default(),
            frame_length_ms: None,
        }
    }
}

impl MonitorConfig {
    /// Check all value ranges; violations are fatal startup errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange {
                name: "threshold",
                value: self.threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.speech_threshold) {
            return Err(ConfigError::ThresholdOutOfRange {
                name: "speech_threshold",
                value: self.speech_threshold,
            });
        }
        if self.alarm_duration <= 0.0 {
            return Err(ConfigError::NonPositiveDuration(self.alarm_duration));
        }
        if self.frame_length_ms == Some(0) {
            return Err(ConfigError::NonPositiveFrameLength(0));
        }
        if self.vad_mode > 3 {
            return Err(ConfigError::VadModeOutOfRange(self.vad_mode));
        }
        Ok(())
    }

    /// The speech threshold as an explicit policy: `None` means the speech
    /// path is disabled (the `0.0` sentinel), never "fire on any speech".
    pub fn speech_threshold(&self) -> Option<f32> {
        (self.speech_threshold > 0.0).then_some(self.speech_threshold)
    }

    /// Cooldown base as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.alarm_duration)
    }

    /// Frame length in milliseconds, applying the backend default.
    pub fn effective_frame_ms(&self) -> u32 {
        self.frame_length_ms.unwrap_or(match self.vad_backend {
            VadBackend::Energy => 1_000,
            VadBackend::WebRtc => 30,
        })
    }

    /// Frame length in samples at the capture rate.
    pub fn frame_samples(&self) -> usize {
        (SAMPLE_RATE as usize * self.effective_frame_ms() as usize) / 1_000
    }

    /// Resolve the alarm file to a concrete path.
    pub fn alarm_path(&self) -> PathBuf {
        let candidate = Path::new(&self.alarm_file);
        if candidate.is_absolute() || candidate.components().count() > 1 {
            candidate.to_path_buf()
        } else {
            Path::new("sounds").join(candidate)
        }
    }

    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(MonitorConfig::default())` when the file does not exist
    /// yet so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests and `--config`).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Returns `true` when no `settings.toml` file exists yet — first-run
    /// detection used by the binary to write out the defaults.
    pub fn is_first_run() -> bool {
        !AppPaths::new().settings_file.exists()
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
