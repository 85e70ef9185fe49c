//! Panic trigger detection over a polled volume level.
//!
//! Two patterns fire: a double press (two level drops inside the press window) and a
//! held press (a drop followed by no cancelling event for the hold duration). The
//! detector holds no timers of its own; the long-press "timer" is a deadline checked on
//! every sample.

use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub poll_interval: Duration,
    pub double_press_window: Duration,
    pub long_press_duration: Duration,
    pub required_press_count: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            double_press_window: Duration::from_millis(1000),
            long_press_duration: Duration::from_millis(3000),
            required_press_count: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPattern {
    MultiPress,
    LongPress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    None,
    Triggered(TriggerPattern),
}

pub struct TriggerDetector {
    config: TriggerConfig,
    last_level: Option<i32>,
    press_count: u32,
    last_drop_at: Option<Instant>,
    long_press_deadline: Option<Instant>,
}

impl TriggerDetector {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            last_level: None,
            press_count: 0,
            last_drop_at: None,
            long_press_deadline: None,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn pending_deadline(&self) -> Option<Instant> {
        self.long_press_deadline
    }

    pub fn sample(&mut self, level: i32, now: Instant) -> TriggerOutcome {
        if let Some(previous) = self.last_level.replace(level) {
            if level < previous {
                if let Some(pattern) = self.on_drop(now) {
                    return self.fire(pattern);
                }
            } else if level > previous {
                self.cancel_pending();
            }
        }

        if let Some(last) = self.last_drop_at {
            if now.saturating_duration_since(last) >= self.config.double_press_window {
                self.press_count = 0;
            }
        }

        match self.long_press_deadline {
            Some(deadline) if now >= deadline => self.fire(TriggerPattern::LongPress),
            _ => TriggerOutcome::None,
        }
    }

    /// Cancels counters and the pending long press. The next sample is a new baseline.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.last_level = None;
    }

    fn on_drop(&mut self, now: Instant) -> Option<TriggerPattern> {
        let within_window = self
            .last_drop_at
            .map(|last| now.saturating_duration_since(last) < self.config.double_press_window)
            .unwrap_or(false);

        self.press_count = if within_window { self.press_count + 1 } else { 1 };
        self.last_drop_at = Some(now);
        debug!(count = self.press_count, "Volume down detected");

        if self.press_count >= self.config.required_press_count {
            return Some(TriggerPattern::MultiPress);
        }
        if self.long_press_deadline.is_none() {
            self.long_press_deadline = Some(now + self.config.long_press_duration);
        }
        None
    }

    fn fire(&mut self, pattern: TriggerPattern) -> TriggerOutcome {
        info!(pattern = ?pattern, "Panic trigger detected");
        self.cancel_pending();
        TriggerOutcome::Triggered(pattern)
    }

    fn cancel_pending(&mut self) {
        self.press_count = 0;
        self.last_drop_at = None;
        self.long_press_deadline = None;
    }
}
