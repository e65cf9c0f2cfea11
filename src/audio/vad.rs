//! Voice-activity detection backends.
//!
//! [`SpeechClassifier`] is the single seam between the monitor and whatever
//! decides "speech / not speech" for a frame.  Two interchangeable backends
//! are provided:
//!
//! * [`EnergyVad`] — a lightweight energy-windowed classifier.  Splits the
//!   frame into 30 ms windows and reports speech when any window's RMS
//!   clears a threshold derived from the aggressiveness mode.  Cheap, no
//!   model, works with any frame length of at least one window.
//! * [`WebRtcVad`] — the WebRTC GMM voice detector via the `earshot` crate.
//!   Operates on 30 ms sub-frames at 16 kHz; the configured frame length
//!   must be a multiple of 30 ms or construction fails (fail fast at
//!   startup, never silently degrade).
//!
//! Neither backend leaks internal state to the caller; the debouncer and
//! monitor loop only ever see the boolean decision.

use earshot::{VoiceActivityDetector, VoiceActivityProfile};
use thiserror::Error;

use super::capture::SAMPLE_RATE;
use super::level::rms_level;

/// Sub-frame length used by both backends: 30 ms at 16 kHz.
const WINDOW_SAMPLES: usize = (SAMPLE_RATE as usize * 30) / 1_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from constructing or running a speech classifier.
#[derive(Debug, Error)]
pub enum VadError {
    /// The configured frame length cannot be processed by this backend.
    /// Raised at construction time so the process can fail fast.
    #[error("frame length of {frame_ms} ms is incompatible with the {backend} classifier ({requirement})")]
    IncompatibleFrameLength {
        frame_ms: u32,
        backend: &'static str,
        requirement: &'static str,
    },

    /// The detector rejected a frame at runtime.  The caller skips the
    /// speech path for that frame; level-based logic still applies.
    #[error("classifier could not process frame: {0}")]
    Classify(String),
}

// ---------------------------------------------------------------------------
// SpeechClassifier
// ---------------------------------------------------------------------------

/// Binary per-frame speech detector.
///
/// Implementations may keep short-term internal state across calls (the
/// WebRTC detector does); that state is private to the backend.  The
/// classifier lives on the monitor thread, so no `Send` bound is required.
pub trait SpeechClassifier {
    /// Returns `true` when `frame` contains human speech.
    ///
    /// `frame` is mono i16 PCM at 16 kHz with the length the classifier was
    /// validated against at construction.
    fn classify(&mut self, frame: &[i16]) -> Result<bool, VadError>;
}

// ---------------------------------------------------------------------------
// EnergyVad
// ---------------------------------------------------------------------------

/// Energy-windowed speech heuristic.
///
/// A frame counts as speech when any 30 ms window inside it exceeds the
/// RMS threshold for the configured aggressiveness mode.  Higher modes
/// demand more energy before reporting speech.
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    /// Per-mode RMS thresholds; index = aggressiveness mode.
    const MODE_THRESHOLDS: [f32; 4] = [0.01, 0.02, 0.035, 0.05];

    /// Create an [`EnergyVad`] for frames of `frame_ms` milliseconds.
    ///
    /// `mode` is clamped to `0..=3`.
    ///
    /// # Errors
    ///
    /// Returns [`VadError::IncompatibleFrameLength`] when the frame is
    /// shorter than one 30 ms window.
    pub fn new(mode: u8, frame_ms: u32) -> Result<Self, VadError> {
        if frame_ms < 30 {
            return Err(VadError::IncompatibleFrameLength {
                frame_ms,
                backend: "energy",
                requirement: "at least 30 ms",
            });
        }
        let threshold = Self::MODE_THRESHOLDS[mode.min(3) as usize];
        Ok(Self { threshold })
    }
}

impl SpeechClassifier for EnergyVad {
    fn classify(&mut self, frame: &[i16]) -> Result<bool, VadError> {
        if frame.len() < WINDOW_SAMPLES {
            return Err(VadError::Classify(format!(
                "frame of {} samples is shorter than one window",
                frame.len()
            )));
        }
        Ok(frame
            .chunks(WINDOW_SAMPLES)
            .filter(|w| w.len() == WINDOW_SAMPLES)
            .any(|w| rms_level(w) > self.threshold))
    }
}

// ---------------------------------------------------------------------------
// WebRtcVad
// ---------------------------------------------------------------------------

/// WebRTC GMM voice detector, adapted from the `earshot` crate.
///
/// The underlying detector consumes fixed 30 ms sub-frames at 16 kHz, so
/// the monitor's frame length must be a whole number of sub-frames.  A
/// frame is reported as speech when any sub-frame is speech.
pub struct WebRtcVad {
    detector: VoiceActivityDetector,
    frame_samples: usize,
}

impl WebRtcVad {
    /// Create a [`WebRtcVad`] with aggressiveness `mode` (clamped to
    /// `0..=3`) for frames of `frame_ms` milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`VadError::IncompatibleFrameLength`] when `frame_ms` is not
    /// a positive multiple of 30.
    pub fn new(mode: u8, frame_ms: u32) -> Result<Self, VadError> {
        if frame_ms == 0 || frame_ms % 30 != 0 {
            return Err(VadError::IncompatibleFrameLength {
                frame_ms,
                backend: "webrtc",
                requirement: "a positive multiple of 30 ms",
            });
        }

        let profile = match mode {
            0 => VoiceActivityProfile::QUALITY,
            1 => VoiceActivityProfile::LBR,
            2 => VoiceActivityProfile::AGGRESSIVE,
            _ => VoiceActivityProfile::VERY_AGGRESSIVE,
        };

        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            frame_samples: (SAMPLE_RATE as usize * frame_ms as usize) / 1_000,
        })
    }
}

impl SpeechClassifier for WebRtcVad {
    fn classify(&mut self, frame: &[i16]) -> Result<bool, VadError> {
        if frame.len() != self.frame_samples {
            return Err(VadError::Classify(format!(
                "expected {} samples, got {}",
                self.frame_samples,
                frame.len()
            )));
        }
        for window in frame.chunks(WINDOW_SAMPLES) {
            let speech = self
                .detector
                .predict_16khz(window)
                .map_err(|_| VadError::Classify("detector rejected sub-frame".into()))?;
            if speech {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_vad_silence_is_not_speech() {
        let mut vad = EnergyVad::new(1, 90).unwrap();
        assert!(!vad.classify(&vec![0; WINDOW_SAMPLES * 3]).unwrap());
    }

    #[test]
    fn energy_vad_loud_window_is_speech() {
        let mut vad = EnergyVad::new(1, 90).unwrap();
        // Two silent windows, one loud one.
        let mut frame = vec![0_i16; WINDOW_SAMPLES * 2];
        frame.extend(vec![8_000_i16; WINDOW_SAMPLES]);
        assert!(vad.classify(&frame).unwrap());
    }

    #[test]
    fn energy_vad_mode_raises_the_bar() {
        // Quiet hum: above mode-0 threshold, below mode-3.
        let frame = vec![500_i16; WINDOW_SAMPLES]; // RMS ~0.015
        assert!(EnergyVad::new(0, 30).unwrap().classify(&frame).unwrap());
        assert!(!EnergyVad::new(3, 30).unwrap().classify(&frame).unwrap());
    }

    #[test]
    fn energy_vad_rejects_tiny_frames() {
        assert!(matches!(
            EnergyVad::new(1, 10),
            Err(VadError::IncompatibleFrameLength { .. })
        ));
    }

    #[test]
    fn energy_vad_undersized_frame_is_a_classify_error() {
        let mut vad = EnergyVad::new(1, 30).unwrap();
        assert!(matches!(
            vad.classify(&[0; 10]),
            Err(VadError::Classify(_))
        ));
    }

    #[test]
    fn webrtc_vad_rejects_incompatible_frame_lengths() {
        for bad_ms in [0, 10, 25, 1_000] {
            assert!(
                matches!(
                    WebRtcVad::new(1, bad_ms),
                    Err(VadError::IncompatibleFrameLength { .. })
                ),
                "{bad_ms} ms should be rejected"
            );
        }
        assert!(WebRtcVad::new(1, 30).is_ok());
        assert!(WebRtcVad::new(1, 990).is_ok());
    }

    #[test]
    fn webrtc_vad_rejects_mis_sized_frames_at_runtime() {
        let mut vad = WebRtcVad::new(1, 30).unwrap();
        assert!(matches!(
            vad.classify(&[0; 100]),
            Err(VadError::Classify(_))
        ));
    }

    #[test]
    fn webrtc_vad_silence_is_not_speech() {
        let mut vad = WebRtcVad::new(3, 30).unwrap();
        assert!(!vad.classify(&[0; WINDOW_SAMPLES]).unwrap());
    }
}
