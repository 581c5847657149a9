//! The alarm clock engine.
//!
//! Time is sampled, not timed: every tick the caller hands in "now" and each
//! alarm is checked against two narrow open windows before its `trigger_at`.
//!
//! ```text
//!   Waiting ──(29s < until < 30s, vibrate_before)──► WarningWindow ──► Waiting
//!   Waiting ──(0s < until < 1s)──► FireWindow ──► advanced one day ──► Waiting
//!   Waiting ──(until <= 0s, window missed)──► Overdue ──► rolled forward ──► Waiting
//! ```
//!
//! With ticks no further apart than a window is wide, every occurrence lands
//! in its fire window at least once, and advancing `trigger_at` makes it fire
//! at most once. Warnings leave `trigger_at` alone, so the engine remembers
//! which occurrence it already warned for; faster or jittery ticks that land
//! in the warning window twice still warn once. Windows that are skipped entirely (the machine slept, the clock
//! jumped) are not caught up on; the alarm just moves to its next day.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use chrono::{Duration, NaiveDateTime};
use log::{debug, error, info, warn};

use crate::{
    alarm::{Alarm, Alarms},
    countdown::{self, Countdown},
    credentials::Credentials,
    error::ConfigError,
    sink::{NotificationSink, Stimulus},
    store::AlarmStore,
};

/// How often the engine is meant to be ticked.
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);
/// Width of the fire window (and of the warning window).
pub const WINDOW_MS: i64 = 1000;
/// How long before `trigger_at` the pre-warning goes off.
pub const WARNING_LEAD_MS: i64 = 30_000;

/// Ticking slower than a window is wide could step over it.
pub fn check_tick_interval(tick: std::time::Duration) -> Result<(), ConfigError> {
    let tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
    let window_ms = WINDOW_MS.unsigned_abs();
    if tick.is_zero() || tick_ms > window_ms {
        return Err(ConfigError::TickTooCoarse { tick_ms, window_ms });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    WarningWindow,
    FireWindow,
    /// `trigger_at` is no longer ahead of now without having fired.
    Overdue,
}

/// Where `alarm` stands at `now`.
#[must_use]
pub fn phase(alarm: &Alarm, now: NaiveDateTime) -> Phase {
    let until = alarm.trigger_at - now;
    let window = Duration::milliseconds(WINDOW_MS);
    let lead = Duration::milliseconds(WARNING_LEAD_MS);

    if until <= Duration::zero() {
        Phase::Overdue
    } else if until < window {
        Phase::FireWindow
    } else if alarm.vibrate_before && until > lead - window && until < lead {
        Phase::WarningWindow
    } else {
        Phase::Waiting
    }
}

/// How sink calls are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On the ticking thread, before `tick` returns.
    Inline,
    /// One thread per call, so a slow request never holds up the next tick.
    Detached,
}

/// What one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub warned: Vec<String>,
    pub fired: Vec<String>,
    pub rolled: Vec<String>,
}

impl TickReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warned.is_empty() && self.fired.is_empty() && self.rolled.is_empty()
    }
}

struct Firing {
    name: String,
    stimulus: Stimulus,
}

/// Owns the alarms and is the only thing that changes them.
pub struct AlarmClock {
    alarms: Alarms,
    // occurrence each alarm was last warned for, so a warning goes out once
    warned_for: BTreeMap<String, NaiveDateTime>,
    store: AlarmStore,
    sink: Arc<dyn NotificationSink>,
    credentials: Credentials,
    dispatch: Dispatch,
}

impl AlarmClock {
    #[must_use]
    pub fn new(
        alarms: Alarms,
        store: AlarmStore,
        sink: Arc<dyn NotificationSink>,
        credentials: Credentials,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            alarms,
            warned_for: BTreeMap::new(),
            store,
            sink,
            credentials,
            dispatch,
        }
    }

    #[must_use]
    pub const fn alarms(&self) -> &Alarms {
        &self.alarms
    }

    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Evaluates every alarm once.
    ///
    /// All state changes are applied and written through before any sink
    /// call is made. A failure on one alarm is logged and the rest are still
    /// evaluated.
    pub fn tick(&mut self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();
        let mut firings = Vec::new();

        for (name, alarm) in &mut self.alarms {
            match phase(alarm, now) {
                Phase::Waiting => {}
                Phase::WarningWindow => {
                    if self.warned_for.get(name) == Some(&alarm.trigger_at) {
                        continue;
                    }
                    self.warned_for.insert(name.clone(), alarm.trigger_at);
                    info!("triggering vibration warning for alarm {name}");
                    firings.push(Firing {
                        name: name.clone(),
                        stimulus: Stimulus::warning(),
                    });
                    report.warned.push(name.clone());
                }
                Phase::FireWindow => {
                    info!("triggering alarm {name}");
                    firings.push(Firing {
                        name: name.clone(),
                        stimulus: Stimulus::main(alarm),
                    });
                    report.fired.push(name.clone());
                    if let Err(e) = alarm.advance(name) {
                        error!("{e}");
                        continue;
                    }
                    info!("reset alarm {name} for next day: {}", alarm.trigger_at);
                    if let Err(e) = self.store.save(name, alarm) {
                        error!("error saving alarm {name}: {e}");
                    }
                }
                Phase::Overdue => {
                    let mut days = alarm.roll_forward(now);
                    // exactly on time still counts as missed
                    if days == 0 {
                        if let Err(e) = alarm.advance(name) {
                            error!("{e}");
                            continue;
                        }
                        days = 1;
                    }
                    warn!(
                        "alarm {name} missed its window, moved {days} day(s) to {}",
                        alarm.trigger_at
                    );
                    report.rolled.push(name.clone());
                    if let Err(e) = self.store.save(name, alarm) {
                        error!("error saving alarm {name}: {e}");
                    }
                }
            }
        }

        for firing in firings {
            self.dispatch(firing);
        }
        report
    }

    /// Adds or replaces an alarm and writes it through.
    pub fn add_alarm(&mut self, name: String, alarm: Alarm) {
        info!("adding alarm {name} at {}", alarm.trigger_at);
        self.warned_for.remove(&name);
        if let Err(e) = self.store.save(&name, &alarm) {
            error!("error saving alarm {name}: {e}");
        }
        self.alarms.insert(name, alarm);
    }

    /// Deletes an alarm. Unknown names are ignored.
    pub fn remove_alarm(&mut self, name: &str) -> Option<Alarm> {
        self.warned_for.remove(name);
        let removed = self.alarms.remove(name);
        if removed.is_some() {
            info!("deleted alarm {name}");
        }
        if let Err(e) = self.store.delete(name) {
            error!("error deleting alarm {name}: {e}");
        }
        removed
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        debug!("credentials refreshed, connected: {}", credentials.is_connected());
        self.credentials = credentials;
    }

    /// Countdown for every alarm. Alarms found behind `now` are rolled
    /// forward and written through.
    pub fn countdowns(&mut self, now: NaiveDateTime) -> Vec<Countdown> {
        let mut countdowns = Vec::with_capacity(self.alarms.len());
        for (name, alarm) in &mut self.alarms {
            let projection = countdown::project(alarm, now);
            if let Some(rolled) = projection.rolled {
                *alarm = rolled;
                if let Err(e) = self.store.save(name, alarm) {
                    error!("error saving alarm {name}: {e}");
                }
            }
            countdowns.push(Countdown {
                name: name.clone(),
                alarm: *alarm,
                remaining: projection.remaining,
            });
        }
        countdowns
    }

    fn dispatch(&self, firing: Firing) {
        let sink = Arc::clone(&self.sink);
        match self.dispatch {
            Dispatch::Inline => {
                deliver(sink.as_ref(), &self.credentials, &firing);
            }
            Dispatch::Detached => {
                let credentials = self.credentials.clone();
                let name = firing.name.clone();
                let spawned = thread::Builder::new()
                    .name(format!("fire {name}"))
                    .spawn(move || deliver(sink.as_ref(), &credentials, &firing));
                if let Err(e) = spawned {
                    error!("couldn't start delivery for alarm {name}: {e}");
                }
            }
        }
    }
}

fn deliver(sink: &dyn NotificationSink, credentials: &Credentials, firing: &Firing) -> bool {
    let confirmed = panic::catch_unwind(AssertUnwindSafe(|| {
        sink.fire(credentials, &firing.stimulus)
    }))
    .unwrap_or_else(|_| {
        error!("notification sink panicked for alarm {}", firing.name);
        false
    });
    match (confirmed, firing.stimulus.warning) {
        (true, _) => debug!("alarm {} delivered", firing.name),
        (false, true) => warn!("vibration warning for alarm {} not confirmed", firing.name),
        (false, false) => error!(
            "alarm {} not confirmed, it stays scheduled for the next day",
            firing.name
        ),
    }
    confirmed
}
