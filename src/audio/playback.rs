//! Alarm clip loading and blocking playback.
//!
//! [`AlarmClip`] decodes a WAV file into mono f32 samples at startup; a
//! missing or unreadable file is a fatal startup error that names the path.
//! [`AlarmPlayer`] drives a cpal output stream and implements [`AlarmSink`]:
//! `play` blocks the calling thread until the whole clip has been rendered,
//! which is what serializes alarms — the debouncer never evaluates a new
//! trigger while a clip is sounding.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use thiserror::Error;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors from loading the alarm clip or playing it back.
///
/// Clip and device errors are fatal at startup; `play` failures abort the
/// monitor because an alarm that cannot sound defeats the whole purpose.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to load alarm clip '{path}': {source}")]
    ClipLoad {
        path: PathBuf,
        source: hound::Error,
    },

    #[error("alarm clip '{path}' contains no samples")]
    EmptyClip { path: PathBuf },

    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("output device does not support playback at {rate} Hz")]
    UnsupportedConfig { rate: u32 },

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AlarmClip
// ---------------------------------------------------------------------------

/// A fully decoded alarm sound, held in memory for the process lifetime.
#[derive(Debug, Clone)]
pub struct AlarmClip {
    /// Mono samples in `[-1.0, 1.0]`.
    samples: Vec<f32>,
    /// Native sample rate of the WAV file in Hz.
    sample_rate: u32,
}

impl AlarmClip {
    /// Decode `path` into a mono f32 clip.
    ///
    /// Accepts integer WAVs of any bit depth as well as IEEE float; stereo
    /// and multi-channel files are downmixed by averaging.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::ClipLoad`] naming the path when the file is
    /// missing, unreadable or not a WAV, and [`PlaybackError::EmptyClip`]
    /// for a zero-sample file.
    pub fn load(path: &Path) -> Result<Self, PlaybackError> {
        let map_err = |source| PlaybackError::ClipLoad {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = hound::WavReader::open(path).map_err(map_err)?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(map_err)?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(map_err)?
            }
        };

        let samples: Vec<f32> = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        if samples.is_empty() {
            return Err(PlaybackError::EmptyClip {
                path: path.to_path_buf(),
            });
        }

        log::debug!(
            "loaded alarm clip '{}': {} samples @ {} Hz ({:.2} s)",
            path.display(),
            samples.len(),
            spec.sample_rate,
            samples.len() as f32 / spec.sample_rate as f32,
        );

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Build a clip directly from samples (used by tests and fakes).
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback duration of the clip.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Number of mono samples in the clip.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// `true` when the clip holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// AlarmSink
// ---------------------------------------------------------------------------

/// The actuator seam: something that can sound the alarm, synchronously.
///
/// `play` must not return until the alarm has finished.  The debouncer
/// relies on this to guarantee that alarms never overlap.
pub trait AlarmSink {
    /// Sound the alarm; blocks until playback completes.
    fn play(&mut self) -> Result<(), PlaybackError>;
}

// ---------------------------------------------------------------------------
// AlarmPlayer
// ---------------------------------------------------------------------------

/// Plays the preloaded [`AlarmClip`] on the default output device.
///
/// The device and stream config are resolved once at startup so that an
/// unusable output setup is caught before monitoring begins.
pub struct AlarmPlayer {
    device: cpal::Device,
    config: cpal::StreamConfig,
    clip: AlarmClip,
}

impl AlarmPlayer {
    /// Resolve the default output device for the clip's sample rate.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::NoDevice`] or
    /// [`PlaybackError::UnsupportedConfig`] when no suitable f32 output
    /// configuration exists — both fatal at startup.
    pub fn new(clip: AlarmClip) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;

        let rate = SampleRate(clip.sample_rate);
        let supported = device
            .supported_output_configs()?
            .filter(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
                    && (c.channels() == 1 || c.channels() == 2)
            })
            .min_by_key(|c| c.channels())
            .ok_or(PlaybackError::UnsupportedConfig {
                rate: clip.sample_rate,
            })?;

        let config = supported.with_sample_rate(rate).config();

        log::debug!(
            "output device '{}': {} ch @ {} Hz",
            device.name().unwrap_or_default(),
            config.channels,
            clip.sample_rate,
        );

        Ok(Self {
            device,
            config,
            clip,
        })
    }

    /// Duration of the configured clip.
    pub fn clip_duration(&self) -> Duration {
        self.clip.duration()
    }
}

impl AlarmSink for AlarmPlayer {
    /// Render the clip to the output stream and block until it finishes.
    ///
    /// Completion is detected by the output callback consuming the final
    /// sample; a timeout of clip duration plus a grace period bounds the
    /// wait in case the stream stalls.
    fn play(&mut self) -> Result<(), PlaybackError> {
        let channels = usize::from(self.config.channels);
        let samples = Arc::new(self.clip.samples.clone());
        let position = Arc::new(Mutex::new(0_usize));
        let finished = Arc::new(Mutex::new(false));

        let cb_samples = Arc::clone(&samples);
        let cb_position = Arc::clone(&position);
        let cb_finished = Arc::clone(&finished);

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut pos = cb_position.lock().unwrap();
                for frame in data.chunks_mut(channels) {
                    let sample = if *pos < cb_samples.len() {
                        let s = cb_samples[*pos];
                        *pos += 1;
                        s
                    } else {
                        *cb_finished.lock().unwrap() = true;
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| {
                log::error!("output stream error: {err}");
            },
            None,
        )?;

        stream.play()?;

        // Poll for completion, bounded by clip length plus a grace period.
        let deadline = Instant::now() + self.clip.duration() + Duration::from_millis(500);
        while !*finished.lock().unwrap() {
            if Instant::now() >= deadline {
                log::warn!("alarm playback did not signal completion before timeout");
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        drop(stream);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wav(path: &Path, samples: &[i16], channels: u16, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for &s in samples {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn load_mono_int_wav() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("alarm.wav");
        write_wav(&path, &[0, 16_384, -16_384, 32_767], 1, 8_000);

        let clip = AlarmClip::load(&path).expect("load");
        assert_eq!(clip.len(), 4);
        assert!((clip.samples[1] - 0.5).abs() < 1e-3);
        assert_eq!(clip.duration(), Duration::from_secs_f64(4.0 / 8_000.0));
    }

    #[test]
    fn load_downmixes_stereo() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("stereo.wav");
        // L=0.5, R=-0.5 → mono 0.0; L=0.25, R=0.25 → mono 0.25
        write_wav(&path, &[16_384, -16_384, 8_192, 8_192], 2, 44_100);

        let clip = AlarmClip::load(&path).expect("load");
        assert_eq!(clip.len(), 2);
        assert!(clip.samples[0].abs() < 1e-3);
        assert!((clip.samples[1] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn missing_clip_error_names_the_path() {
        let err = AlarmClip::load(Path::new("sounds/definitely-missing.wav"))
            .expect_err("must fail");
        let msg = err.to_string();
        assert!(
            msg.contains("sounds/definitely-missing.wav"),
            "message should name the file: {msg}"
        );
    }

    #[test]
    fn empty_clip_is_rejected() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("empty.wav");
        write_wav(&path, &[], 1, 16_000);

        assert!(matches!(
            AlarmClip::load(&path),
            Err(PlaybackError::EmptyClip { .. })
        ));
    }

    #[test]
    fn clip_duration_from_samples() {
        let clip = AlarmClip::from_samples(vec![0.0; 24_000], 48_000);
        assert_eq!(clip.duration(), Duration::from_millis(500));
    }
}
