//! The monitor loop — wires capture, level estimation, speech
//! classification, debouncing and the status line.
//!
//! # Architecture
//!
//! ```text
//! cpal callback thread
//!        │  AudioFrame (mpsc)
//!        ▼
//! MonitorLoop::run()           ← main thread, strictly serialized
//!        ├─ rms_level(frame)
//!        ├─ classifier.classify(frame)   (only when worth computing)
//!        ├─ AlarmDebouncer::evaluate     (may block: playback + cooldown)
//!        └─ status line / transition messages
//! ```
//!
//! The loop processes one frame at a time; a blocking alarm simply
//! backpressures the channel, and the backlog that piles up during
//! playback is discarded afterwards — those frames predate the alarm and
//! carry no decision value.  Ctrl-C is observed between frames via an
//! atomic stop flag.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::playback::{AlarmSink, PlaybackError};
use crate::audio::{percent_of_threshold, rms_level, AudioFrame, SpeechClassifier};
use crate::monitor::debounce::{AlarmDebouncer, Clock, TriggerPath};

/// How long `run` waits on the frame channel before re-checking the stop
/// flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// FrameOutcome
// ---------------------------------------------------------------------------

/// Result of one decision cycle, consumed by the status renderer.
#[derive(Debug, Clone, Copy)]
pub struct FrameOutcome {
    /// Normalized RMS reading for the frame.
    pub level: f32,
    /// Percentage of the noise threshold reached, capped at 100.
    pub percent: u32,
    /// The path that fired this cycle, if any.
    pub fired: Option<TriggerPath>,
}

// ---------------------------------------------------------------------------
// MonitorLoop
// ---------------------------------------------------------------------------

/// Owns the decision pipeline for the lifetime of the process.
///
/// Generic over the debouncer clock and the alarm sink so the whole loop
/// can run against fakes in tests.
pub struct MonitorLoop<C: Clock, S: AlarmSink> {
    noise_threshold: f32,
    debouncer: AlarmDebouncer<C>,
    classifier: Option<Box<dyn SpeechClassifier>>,
    sink: S,
}

impl<C: Clock, S: AlarmSink> MonitorLoop<C, S> {
    /// Assemble the loop.
    ///
    /// `classifier` may be `None` when the speech path is disabled; the
    /// debouncer's configuration decides whether it is ever consulted.
    pub fn new(
        noise_threshold: f32,
        debouncer: AlarmDebouncer<C>,
        classifier: Option<Box<dyn SpeechClassifier>>,
        sink: S,
    ) -> Self {
        Self {
            noise_threshold,
            debouncer,
            classifier,
            sink,
        }
    }

    /// Run one decision cycle for `frame`.
    ///
    /// The speech classifier is consulted only when the speech path is
    /// enabled and the level already clears the speech threshold — below
    /// that the decision cannot matter, so the work is skipped.  A
    /// classifier error downgrades the frame to "no speech decision" and
    /// is logged; the level path still applies.
    ///
    /// # Errors
    ///
    /// Propagates [`PlaybackError`] from a failed alarm playback.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> Result<FrameOutcome, PlaybackError> {
        let level = rms_level(&frame.samples);

        let speech = match self.debouncer.speech_gate_level() {
            Some(gate) if level > gate => match self.classifier.as_mut() {
                Some(classifier) => match classifier.classify(&frame.samples) {
                    Ok(decision) => Some(decision),
                    Err(e) => {
                        log::warn!("speech classifier skipped a frame: {e}");
                        None
                    }
                },
                None => None,
            },
            _ => None,
        };

        let fired = self.debouncer.evaluate(level, speech, &mut self.sink)?;

        Ok(FrameOutcome {
            level,
            percent: percent_of_threshold(level, self.noise_threshold),
            fired,
        })
    }

    /// Process frames until `stop` is set or the source disconnects.
    ///
    /// Renders the continuously overwritten status line and one-line
    /// transition messages to stdout.  Returns cleanly on stop; the caller
    /// owns stream teardown (dropping the capture handle).
    ///
    /// # Errors
    ///
    /// Propagates [`PlaybackError`] from a failed alarm playback.
    pub fn run(
        &mut self,
        frames: &Receiver<AudioFrame>,
        stop: &Arc<AtomicBool>,
    ) -> Result<(), PlaybackError> {
        let mut stdout = io::stdout();

        while !stop.load(Ordering::Relaxed) {
            let frame = match frames.recv_timeout(STOP_POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("frame source disconnected");
                    break;
                }
            };

            let outcome = self.process_frame(&frame)?;

            if let Some(path) = outcome.fired {
                let _ = writeln!(stdout, "\n{}", transition_message(path));
                // Frames that queued up behind the blocking playback predate
                // the alarm; drop them instead of replaying stale decisions.
                while frames.try_recv().is_ok() {}
            }

            let _ = write!(stdout, "\r{}", status_line(&outcome));
            let _ = stdout.flush();
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// The single overwritten status line.
pub fn status_line(outcome: &FrameOutcome) -> String {
    let suffix = if outcome.percent >= 100 {
        "(ALARM!)"
    } else {
        "        "
    };
    format!(
        "Current noise level: {:.3} | {}% of threshold {suffix}",
        outcome.level, outcome.percent
    )
}

/// One-line message distinguishing which path triggered the alarm.
pub fn transition_message(path: TriggerPath) -> &'static str {
    match path {
        TriggerPath::Noise => "Noise level exceeded threshold! (ALARM!)",
        TriggerPath::Speech => "Speech level exceeded threshold! (ALARM!)",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::vad::VadError;
    use crate::monitor::debounce::SystemClock;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Sink that counts invocations; playback is instantaneous.
    struct CountingSink {
        plays: Rc<Cell<usize>>,
    }

    impl AlarmSink for CountingSink {
        fn play(&mut self) -> Result<(), PlaybackError> {
            self.plays.set(self.plays.get() + 1);
            Ok(())
        }
    }

    struct FixedClassifier {
        decision: bool,
        calls: Rc<Cell<usize>>,
    }

    impl SpeechClassifier for FixedClassifier {
        fn classify(&mut self, _frame: &[i16]) -> Result<bool, VadError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.decision)
        }
    }

    struct BrokenClassifier;

    impl SpeechClassifier for BrokenClassifier {
        fn classify(&mut self, _frame: &[i16]) -> Result<bool, VadError> {
            Err(VadError::Classify("malformed frame".into()))
        }
    }

    fn frame_of(amplitude: i16, len: usize) -> AudioFrame {
        AudioFrame {
            samples: vec![amplitude; len],
        }
    }

    fn monitor(
        noise: f32,
        speech: Option<f32>,
        classifier: Option<Box<dyn SpeechClassifier>>,
        plays: &Rc<Cell<usize>>,
    ) -> MonitorLoop<SystemClock, CountingSink> {
        // Zero cooldown keeps these tests free of real sleeps.
        let debouncer = AlarmDebouncer::new(noise, speech, Duration::ZERO);
        let sink = CountingSink {
            plays: Rc::clone(plays),
        };
        MonitorLoop::new(noise, debouncer, classifier, sink)
    }

    #[test]
    fn silent_frame_reports_zero_percent_and_no_alarm() {
        let plays = Rc::new(Cell::new(0));
        let mut mon = monitor(0.1, None, None, &plays);

        let outcome = mon.process_frame(&frame_of(0, 1600)).unwrap();
        assert_eq!(outcome.level, 0.0);
        assert_eq!(outcome.percent, 0);
        assert_eq!(outcome.fired, None);
        assert_eq!(plays.get(), 0);
    }

    #[test]
    fn loud_frame_fires_noise_path() {
        let plays = Rc::new(Cell::new(0));
        let mut mon = monitor(0.1, None, None, &plays);

        // Constant amplitude 0.15 full scale → RMS 0.15 > 0.1.
        let outcome = mon.process_frame(&frame_of(4_915, 1600)).unwrap();
        assert_eq!(outcome.fired, Some(TriggerPath::Noise));
        assert_eq!(outcome.percent, 100);
        assert_eq!(plays.get(), 1);
    }

    #[test]
    fn classifier_is_skipped_below_the_speech_gate() {
        let plays = Rc::new(Cell::new(0));
        let calls = Rc::new(Cell::new(0));
        let classifier = FixedClassifier {
            decision: true,
            calls: Rc::clone(&calls),
        };
        let mut mon = monitor(0.9, Some(0.2), Some(Box::new(classifier)), &plays);

        // Level ~0.05, below the 0.2 speech gate → classifier never runs.
        mon.process_frame(&frame_of(1_638, 1600)).unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(plays.get(), 0);
    }

    #[test]
    fn speech_path_fires_through_the_classifier() {
        let plays = Rc::new(Cell::new(0));
        let calls = Rc::new(Cell::new(0));
        let classifier = FixedClassifier {
            decision: true,
            calls: Rc::clone(&calls),
        };
        let mut mon = monitor(0.9, Some(0.05), Some(Box::new(classifier)), &plays);

        // Level ~0.1: above the speech gate, far below the noise threshold.
        let outcome = mon.process_frame(&frame_of(3_277, 1600)).unwrap();
        assert_eq!(outcome.fired, Some(TriggerPath::Speech));
        assert_eq!(calls.get(), 1);
        assert_eq!(plays.get(), 1);
    }

    #[test]
    fn classifier_error_skips_speech_but_keeps_level_logic() {
        let plays = Rc::new(Cell::new(0));
        let mut mon = monitor(0.1, Some(0.05), Some(Box::new(BrokenClassifier)), &plays);

        // Above both thresholds: the broken classifier must not block the
        // noise path.
        let outcome = mon.process_frame(&frame_of(4_915, 1600)).unwrap();
        assert_eq!(outcome.fired, Some(TriggerPath::Noise));
        assert_eq!(plays.get(), 1);
    }

    #[test]
    fn status_line_shows_alarm_suffix_at_threshold() {
        let hot = FrameOutcome {
            level: 0.25,
            percent: 100,
            fired: None,
        };
        assert!(status_line(&hot).contains("(ALARM!)"));
        assert!(status_line(&hot).contains("100% of threshold"));

        let quiet = FrameOutcome {
            level: 0.0,
            percent: 0,
            fired: None,
        };
        let line = status_line(&quiet);
        assert!(line.contains("0.000"));
        assert!(line.contains("0% of threshold"));
        assert!(!line.contains("ALARM"));
    }

    #[test]
    fn transition_messages_distinguish_paths() {
        assert!(transition_message(TriggerPath::Noise).starts_with("Noise"));
        assert!(transition_message(TriggerPath::Speech).starts_with("Speech"));
    }
}
