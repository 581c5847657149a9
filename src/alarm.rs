use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::error::AlarmError;

/// Alarms keyed by their unique name.
pub type Alarms = BTreeMap<String, Alarm>;

pub const DEFAULT_INTENSITY: u8 = 50;
pub const DEFAULT_DURATION_MS: u32 = 1000;

#[must_use]
pub fn one_day() -> Duration {
    Duration::days(1)
}

/// represents an alarm
/// `trigger_at` is always the next moment the alarm should go off,
/// it only ever moves forward in whole days so the time of day never drifts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    pub trigger_at: NaiveDateTime,
    pub intensity: u8,
    pub duration_ms: u32,
    pub vibrate_before: bool,
}

impl Alarm {
    /// Builds an alarm, checking intensity and duration bounds.
    pub fn new(
        trigger_at: NaiveDateTime,
        intensity: i64,
        duration_ms: i64,
        vibrate_before: bool,
    ) -> Result<Self, AlarmError> {
        let intensity = u8::try_from(intensity)
            .ok()
            .filter(|i| *i <= 100)
            .ok_or(AlarmError::IntensityOutOfRange(intensity))?;
        let duration_ms = u32::try_from(duration_ms)
            .ok()
            .filter(|d| *d > 0)
            .ok_or(AlarmError::NonPositiveDuration(duration_ms))?;
        Ok(Self {
            trigger_at,
            intensity,
            duration_ms,
            vibrate_before,
        })
    }

    /// The new-alarm flow: today at `time` (seconds zeroed), or tomorrow if
    /// that moment is already behind `now`.
    pub fn at_time_of_day(
        time: NaiveTime,
        now: NaiveDateTime,
        intensity: i64,
        duration_ms: i64,
        vibrate_before: bool,
    ) -> Result<Self, AlarmError> {
        let time = time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time);
        let mut trigger_at = now.date().and_time(time);
        if trigger_at < now {
            trigger_at += one_day();
        }
        Self::new(trigger_at, intensity, duration_ms, vibrate_before)
    }

    #[must_use]
    pub fn time_of_day(&self) -> NaiveTime {
        self.trigger_at.time()
    }

    /// Moves the alarm to its next daily occurrence.
    pub fn advance(&mut self, name: &str) -> Result<(), AlarmError> {
        self.trigger_at = self
            .trigger_at
            .checked_add_signed(one_day())
            .ok_or_else(|| AlarmError::Overflow(name.to_string()))?;
        Ok(())
    }

    /// Rolls a past `trigger_at` forward by whole days until it is no longer
    /// before `now`. Returns how many days were added.
    pub fn roll_forward(&mut self, now: NaiveDateTime) -> i64 {
        if self.trigger_at >= now {
            return 0;
        }
        let behind = now - self.trigger_at;
        let mut days = behind.num_days();
        if self.trigger_at + Duration::days(days) < now {
            days += 1;
        }
        self.trigger_at += Duration::days(days);
        days
    }
}

/// Parses the `HH:MM` text of the new-alarm flow.
pub fn parse_time_of_day(text: &str) -> Result<NaiveTime, AlarmError> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M")
        .map_err(|_| AlarmError::InvalidTimeOfDay(text.to_string()))
}

/// Name given to an alarm created without one.
#[must_use]
pub fn default_name(alarms: &Alarms) -> String {
    let mut n = alarms.len() + 1;
    // a deleted alarm can leave a gap, don't overwrite the next one by accident
    while alarms.contains_key(&format!("Alarm {n}")) {
        n += 1;
    }
    format!("Alarm {n}")
}
