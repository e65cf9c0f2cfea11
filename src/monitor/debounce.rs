//! Alarm debounce state machine.
//!
//! [`AlarmDebouncer`] is the single owner of the mutable alarm state.  The
//! state machine has two phases:
//!
//! ```text
//! Idle ──(level, speech) trigger + cooldown gate──▶ Firing
//!        │
//!        │  sink.play() blocks for the whole clip,
//!        │  then a mandatory cooldown sleep
//!        ▼
//! Idle ◀──────────────────────────────────────────
//! ```
//!
//! A trigger is accepted only when the elapsed time since the previous
//! trigger *start* is at least twice the cooldown duration.  Combined with
//! the blocking play and the post-playback sleep, the minimum gap between
//! trigger starts is `max(2 × cooldown, playback + cooldown)`.
//!
//! Time is read and slept through the [`Clock`] trait so the machine can be
//! exercised in tests without real sleeps.

use std::time::{Duration, Instant};

use crate::audio::playback::{AlarmSink, PlaybackError};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Injected time source for the debouncer.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
    /// Block for `dur` (tests advance a fake instant instead).
    fn sleep(&self, dur: Duration);
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

// ---------------------------------------------------------------------------
// TriggerPath
// ---------------------------------------------------------------------------

/// Which condition fired the alarm.  The noise path always wins when both
/// conditions hold in the same cycle, so one cycle fires at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPath {
    /// The hard noise threshold was exceeded.
    Noise,
    /// The speech-combined threshold was exceeded and speech was detected.
    Speech,
}

// ---------------------------------------------------------------------------
// AlarmState
// ---------------------------------------------------------------------------

/// Mutable debounce bookkeeping.  `active` is `true` only for the
/// synchronous span of playback plus cooldown; `last_fired` is the instant
/// of the most recent trigger start (`None` until the first alarm).
#[derive(Debug, Clone, Copy)]
struct AlarmState {
    active: bool,
    last_fired: Option<Instant>,
}

// ---------------------------------------------------------------------------
// AlarmDebouncer
// ---------------------------------------------------------------------------

/// Decides, per frame, whether to sound the alarm now.
///
/// The speech path is enabled only when a speech threshold is configured
/// (`Some`); a configured value of zero is mapped to `None` upstream, which
/// skips the speech-combined check entirely rather than firing on every
/// detected utterance.
pub struct AlarmDebouncer<C: Clock = SystemClock> {
    noise_threshold: f32,
    speech_threshold: Option<f32>,
    cooldown: Duration,
    clock: C,
    state: AlarmState,
}

impl AlarmDebouncer<SystemClock> {
    /// Debouncer on the system clock.
    pub fn new(noise_threshold: f32, speech_threshold: Option<f32>, cooldown: Duration) -> Self {
        Self::with_clock(noise_threshold, speech_threshold, cooldown, SystemClock)
    }
}

impl<C: Clock> AlarmDebouncer<C> {
    /// Debouncer on an explicit clock (tests inject a fake one).
    pub fn with_clock(
        noise_threshold: f32,
        speech_threshold: Option<f32>,
        cooldown: Duration,
        clock: C,
    ) -> Self {
        Self {
            noise_threshold,
            speech_threshold,
            cooldown,
            clock,
            state: AlarmState {
                active: false,
                last_fired: None,
            },
        }
    }

    /// `true` while an alarm (playback + cooldown) is in progress.
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// `true` when the speech-combined path participates in decisions.
    pub fn speech_path_enabled(&self) -> bool {
        self.speech_threshold.is_some()
    }

    /// Level above which the speech decision is worth computing at all.
    ///
    /// `None` when the speech path is disabled — the monitor loop then
    /// skips the classifier entirely.
    pub fn speech_gate_level(&self) -> Option<f32> {
        self.speech_threshold
    }

    /// Evaluate one decision cycle.
    ///
    /// `speech` is the classifier's decision for this frame, or `None` when
    /// it was not computed (speech path disabled, level below the speech
    /// threshold, or a classifier error skipped the frame).
    ///
    /// When a trigger is accepted this call blocks for the full clip
    /// playback and the cooldown sleep before returning the path that
    /// fired.  Otherwise it returns `Ok(None)` immediately.
    ///
    /// # Errors
    ///
    /// Propagates [`PlaybackError`] when the sink fails; the alarm state is
    /// reset to idle first so a failed play never wedges the machine.
    pub fn evaluate(
        &mut self,
        level: f32,
        speech: Option<bool>,
        sink: &mut dyn AlarmSink,
    ) -> Result<Option<TriggerPath>, PlaybackError> {
        // Hard noise threshold first; at most one path per cycle.
        let path = if level > self.noise_threshold {
            Some(TriggerPath::Noise)
        } else if let Some(threshold) = self.speech_threshold {
            if level > threshold && speech == Some(true) {
                Some(TriggerPath::Speech)
            } else {
                None
            }
        } else {
            None
        };

        let Some(path) = path else {
            return Ok(None);
        };

        if self.state.active {
            return Ok(None);
        }
        let now = self.clock.now();
        if let Some(last) = self.state.last_fired {
            if now.duration_since(last) < self.cooldown * 2 {
                return Ok(None);
            }
        }

        self.state.active = true;
        self.state.last_fired = Some(now);
        log::info!("alarm fired via {path:?} path (level {level:.3})");

        match sink.play() {
            Ok(()) => {
                // Mandatory quiet gap after every alarm, regardless of
                // how long the clip itself ran.
                self.clock.sleep(self.cooldown);
                self.state.active = false;
                Ok(Some(path))
            }
            Err(e) => {
                self.state.active = false;
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
