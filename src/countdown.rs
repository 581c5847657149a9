//! Time left until each alarm, for display.

use std::fmt;

use chrono::{Duration, NaiveDateTime};

use crate::alarm::Alarm;

/// What [`project`] found for one alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// `HH:MM:SS` until the alarm goes off.
    pub remaining: String,
    /// Set when the alarm was behind `now` and had to be rolled forward,
    /// so the caller can persist it.
    pub rolled: Option<Alarm>,
}

/// Projects the countdown for `alarm` at `now`.
///
/// Alarms already behind `now` are rolled forward the same way the store does
/// on load. Every unit is floored, so the display reads `00:00:00` exactly
/// while the alarm is inside its fire window.
#[must_use]
pub fn project(alarm: &Alarm, now: NaiveDateTime) -> Projection {
    let mut current = *alarm;
    let rolled = (current.roll_forward(now) > 0).then_some(current);
    Projection {
        remaining: format_remaining(current.trigger_at - now),
        rolled,
    }
}

#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    // num_seconds truncates, which is a floor for anything not negative
    let total = remaining.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// One listed alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub name: String,
    pub alarm: Alarm,
    pub remaining: String,
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  Time until: {}  {}%  {:.1}s",
            self.name,
            self.remaining,
            self.alarm.intensity,
            f64::from(self.alarm.duration_ms) / 1000.0
        )?;
        if self.alarm.vibrate_before {
            write!(f, "  (vibrates first)")?;
        }
        Ok(())
    }
}
