//! Audio I/O — microphone capture, loudness measurement, speech detection
//! and alarm playback.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → FrameChunker → AudioFrame (mpsc)
//!           → rms_level (+ SpeechClassifier) → MonitorLoop decision
//!           → AlarmPlayer (blocking clip playback)
//! ```

pub mod capture;
pub mod level;
pub mod playback;
pub mod vad;

pub use capture::{AudioCapture, AudioFrame, CaptureError, FrameChunker, StreamHandle, SAMPLE_RATE};
pub use level::{percent_of_threshold, rms_level};
pub use playback::{AlarmClip, AlarmPlayer, AlarmSink, PlaybackError};
pub use vad::{EnergyVad, SpeechClassifier, VadError, WebRtcVad};
