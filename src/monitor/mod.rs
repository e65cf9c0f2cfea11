//! Decision pipeline — the alarm debouncer state machine and the monitor
//! loop that drives it.

pub mod debounce;
pub mod runner;

pub use debounce::{AlarmDebouncer, Clock, SystemClock, TriggerPath};
pub use runner::{status_line, transition_message, FrameOutcome, MonitorLoop};
