//! noise-sentry — ambient sound monitoring with an audible alarm.
//!
//! The crate continuously measures the loudness of one mono 16 kHz input
//! stream, optionally checks frames for human speech, and plays a WAV clip
//! when a configurable threshold is exceeded, with debounce timing that
//! prevents alarm flooding.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   AudioFrame    ┌──────────────────────────────┐
//! │ AudioCapture│ ──(mpsc)─────▶ │ MonitorLoop                  │
//! │ (cpal)      │                │   rms_level                  │
//! └────────────┘                 │   SpeechClassifier (VAD)     │
//!                                │   AlarmDebouncer ──────────┐ │
//!                                └────────────────────────────│─┘
//!                                                             ▼
//!                                                     AlarmPlayer (cpal,
//!                                                     blocking playback)
//! ```
//!
//! The decision path is strictly single-threaded: the capture callback only
//! fills a channel, and the monitor loop handles one frame at a time.  An
//! alarm deliberately blocks the loop for its full playback plus a cooldown
//! sleep, which is what guarantees alarms never overlap.

pub mod audio;
pub mod config;
pub mod monitor;
