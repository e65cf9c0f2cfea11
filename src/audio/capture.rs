//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin streaming fixed-size [`AudioFrame`]s
//! over an mpsc channel.  The returned [`StreamHandle`] is a RAII guard —
//! dropping it stops the underlying cpal stream.
//!
//! The hardware delivers buffers of whatever size it likes; a
//! [`FrameChunker`] inside the callback re-blocks them so every frame the
//! monitor sees has exactly the configured length.  Stream errors reported
//! by cpal (e.g. input overflow) are logged and capture continues — they
//! never reach the decision loop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use std::sync::mpsc;
use thiserror::Error;

/// Sample rate every frame is captured at, in Hz.
///
/// Fixed so that the speech classifiers (which operate on 16 kHz sub-frames)
/// never need a resampling stage.
pub const SAMPLE_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One fixed-length window of mono audio, the unit of processing.
///
/// Samples are signed 16-bit PCM at [`SAMPLE_RATE`].  Frames are immutable
/// once delivered and dropped after the decision cycle that consumed them.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono PCM samples; always exactly the configured frame length.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Frame duration in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        (self.samples.len() as u32 * 1_000) / SAMPLE_RATE
    }
}

// ---------------------------------------------------------------------------
// FrameChunker
// ---------------------------------------------------------------------------

/// Re-blocks arbitrarily sized callback buffers into fixed-length frames.
///
/// cpal makes no promise about callback buffer sizes, but the classifiers
/// and the level estimator want exact frame lengths.  `push` accumulates
/// samples and emits zero or more complete frames; the remainder is carried
/// into the next call.
pub struct FrameChunker {
    frame_len: usize,
    pending: Vec<i16>,
}

impl FrameChunker {
    /// Create a chunker emitting frames of `frame_len` samples.
    pub fn new(frame_len: usize) -> Self {
        assert!(frame_len > 0, "frame_len must be > 0");
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Feed captured samples; returns every complete frame now available.
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            let full = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame { samples: full });
        }
        frames
    }
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal input stream alive.
///
/// Dropping this value stops the underlying hardware stream and releases
/// the device.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up the audio capture.
///
/// All of these are fatal startup errors — once the stream is running, cpal
/// reports problems through the error callback instead, which logs and
/// continues.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("input device does not support {SAMPLE_RATE} Hz mono/stereo capture")]
    UnsupportedConfig,

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture wrapper built on top of `cpal`.
///
/// Opens the system default input device at [`SAMPLE_RATE`], preferring a
/// mono i16 configuration and falling back to stereo and/or f32 with
/// in-callback conversion.  A device that cannot do 16 kHz at all is a
/// fatal startup error ([`CaptureError::UnsupportedConfig`]).
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    channels: u16,
}

impl AudioCapture {
    /// Create a new [`AudioCapture`] using the system default input device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or [`CaptureError::UnsupportedConfig`] when the device cannot capture
    /// 16 kHz mono or stereo in i16 or f32.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let rate = SampleRate(SAMPLE_RATE);
        let mut candidates: Vec<_> = device
            .supported_input_configs()?
            .filter(|c| {
                c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
                    && (c.channels() == 1 || c.channels() == 2)
                    && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
            })
            .collect();

        // Prefer mono over stereo, and i16 over f32 within each.
        candidates.sort_by_key(|c| {
            let fmt_rank = match c.sample_format() {
                SampleFormat::I16 => 0,
                _ => 1,
            };
            (c.channels(), fmt_rank)
        });
        let supported = candidates
            .into_iter()
            .next()
            .ok_or(CaptureError::UnsupportedConfig)?
            .with_sample_rate(rate);

        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let config: cpal::StreamConfig = supported.into();

        log::debug!(
            "input device '{}': {} ch, {:?} @ {SAMPLE_RATE} Hz",
            device.name().unwrap_or_default(),
            channels,
            sample_format,
        );

        Ok(Self {
            device,
            config,
            sample_format,
            channels,
        })
    }

    /// Start capturing and send complete [`AudioFrame`]s of `frame_len`
    /// samples to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; samples are
    /// downmixed to mono i16 and re-blocked before being forwarded.  Send
    /// errors (receiver dropped during shutdown) are silently ignored so the
    /// audio thread never panics.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::BuildStream`] or [`CaptureError::PlayStream`]
    /// if the platform rejects the stream configuration.
    pub fn start(
        &self,
        frame_len: usize,
        tx: mpsc::Sender<AudioFrame>,
    ) -> Result<StreamHandle, CaptureError> {
        let channels = self.channels as usize;
        let mut chunker = FrameChunker::new(frame_len);

        let err_fn = |err: cpal::StreamError| {
            // Transient stream faults (overflow etc.) must not kill the loop.
            log::warn!("input stream error: {err}");
        };

        let stream = match self.sample_format {
            SampleFormat::I16 => self.device.build_input_stream(
                &self.config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_i16(data, channels);
                    for frame in chunker.push(&mono) {
                        let _ = tx.send(frame);
                    }
                },
                err_fn,
                None,
            )?,
            _ => self.device.build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_f32(data, channels);
                    for frame in chunker.push(&mono) {
                        let _ = tx.send(frame);
                    }
                },
                err_fn,
                None,
            )?,
        };

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }
}

/// Downmix interleaved i16 samples to mono by averaging channels.
fn downmix_i16(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Downmix interleaved f32 samples to mono i16.
fn downmix_f32(data: &[f32], channels: usize) -> Vec<i16> {
    data.chunks(channels.max(1))
        .map(|frame| {
            let avg = frame.iter().sum::<f32>() / frame.len() as f32;
            (avg.clamp(-1.0, 1.0) * 32_767.0) as i16
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunker_emits_exact_frames() {
        let mut chunker = FrameChunker::new(4);
        assert!(chunker.push(&[1, 2, 3]).is_empty());

        let frames = chunker.push(&[4, 5]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![1, 2, 3, 4]);

        // The remainder carries over.
        let frames = chunker.push(&[6, 7, 8]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![5, 6, 7, 8]);
    }

    #[test]
    fn chunker_emits_multiple_frames_from_one_push() {
        let mut chunker = FrameChunker::new(2);
        let frames = chunker.push(&[1, 2, 3, 4, 5]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![1, 2]);
        assert_eq!(frames[1].samples, vec![3, 4]);
    }

    #[test]
    #[should_panic(expected = "frame_len must be > 0")]
    fn zero_frame_len_panics() {
        FrameChunker::new(0);
    }

    #[test]
    fn frame_duration() {
        let frame = AudioFrame {
            samples: vec![0; 480],
        };
        assert_eq!(frame.duration_ms(), 30);
    }

    #[test]
    fn stereo_downmix_averages_channels() {
        assert_eq!(downmix_i16(&[100, 200, -100, -200], 2), vec![150, -150]);
        let mono = downmix_f32(&[0.5, 0.5, -1.0, -1.0], 2);
        assert_eq!(mono.len(), 2);
        assert!((f32::from(mono[0]) / 32_767.0 - 0.5).abs() < 1e-3);
    }

    /// `AudioFrame` must be `Send` so it can cross the callback thread.
    #[test]
    fn audio_frame_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioFrame>();
    }
}
