//! Runs an [`AlarmClock`] on its own thread.
//!
//! The thread owns the clock outright. Everything else talks to it through
//! [`ClockHandle`], whose messages are handled strictly between ticks, so a
//! tick always finishes before the next one or any edit begins.

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use chrono::NaiveDateTime;
use log::{debug, error, info, warn};

use crate::{
    alarm::{Alarm, Alarms},
    clock::{check_tick_interval, AlarmClock},
    communication::Message,
    countdown::Countdown,
    credentials::Credentials,
    error::ConfigError,
};

/// Source of wall-clock "now".
pub trait TimeSource: Send {
    fn now(&self) -> NaiveDateTime;
}

/// The local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTime;

impl TimeSource for LocalTime {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

impl<F> TimeSource for F
where
    F: Fn() -> NaiveDateTime + Send,
{
    fn now(&self) -> NaiveDateTime {
        self()
    }
}

#[derive(Debug)]
pub struct ClockHandle {
    sender: Sender<Message>,
    thread: JoinHandle<AlarmClock>,
}

impl ClockHandle {
    /// Returns false once the engine thread is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn add_alarm(&self, name: String, alarm: Alarm) -> bool {
        self.send(Message::AddAlarm { name, alarm })
    }

    pub fn remove_alarm(&self, name: String) -> bool {
        self.send(Message::RemoveAlarm(name))
    }

    pub fn update_credentials(&self, credentials: Credentials) -> bool {
        self.send(Message::UpdateCredentials(credentials))
    }

    /// A copy of the alarms as of the last handled message.
    #[must_use]
    pub fn snapshot(&self) -> Option<Alarms> {
        let (tx, rx) = mpsc::channel();
        self.send(Message::Snapshot(tx));
        rx.recv().ok()
    }

    #[must_use]
    pub fn countdowns(&self) -> Option<Vec<Countdown>> {
        let (tx, rx) = mpsc::channel();
        self.send(Message::Countdowns(tx));
        rx.recv().ok()
    }

    /// Stops the engine and hands the clock back.
    pub fn shutdown(self) -> Option<AlarmClock> {
        self.send(Message::Shutdown);
        match self.thread.join() {
            Ok(clock) => Some(clock),
            Err(_) => {
                error!("alarm clock thread panicked");
                None
            }
        }
    }
}

/// Starts ticking `clock` every `tick_interval`.
///
/// Fails if the interval is too coarse for the fire window.
pub fn spawn<T>(
    clock: AlarmClock,
    tick_interval: Duration,
    time: T,
) -> Result<ClockHandle, ConfigError>
where
    T: TimeSource + 'static,
{
    check_tick_interval(tick_interval)?;
    let (sender, receiver) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("alarm clock".to_string())
        .spawn(move || run(clock, &receiver, tick_interval, &time))
        .map_err(ConfigError::Spawn)?;
    info!("alarm clock started, ticking every {tick_interval:?}");
    Ok(ClockHandle { sender, thread })
}

fn run(
    mut clock: AlarmClock,
    receiver: &Receiver<Message>,
    tick_interval: Duration,
    time: &dyn TimeSource,
) -> AlarmClock {
    let mut next_tick = Instant::now();
    loop {
        let now = Instant::now();
        if now >= next_tick {
            let report = clock.tick(time.now());
            if !report.is_empty() {
                debug!("{report:?}");
            }
            next_tick += tick_interval;
            let after = Instant::now();
            if next_tick < after {
                // no catching up: a stale window is worse than a missed one
                warn!("alarm clock fell behind, skipping missed ticks");
                next_tick = after + tick_interval;
            }
            continue;
        }

        match receiver.recv_timeout(next_tick - now) {
            Ok(Message::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(message) => handle(&mut clock, message, time),
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    info!("alarm clock stopped");
    clock
}

fn handle(clock: &mut AlarmClock, message: Message, time: &dyn TimeSource) {
    match message {
        Message::AddAlarm { name, alarm } => clock.add_alarm(name, alarm),
        Message::RemoveAlarm(name) => {
            clock.remove_alarm(&name);
        }
        Message::UpdateCredentials(credentials) => clock.set_credentials(credentials),
        Message::Snapshot(reply) => {
            // the asker may have given up waiting
            let _ = reply.send(clock.alarms().clone());
        }
        Message::Countdowns(reply) => {
            let _ = reply.send(clock.countdowns(time.now()));
        }
        Message::Shutdown => {}
    }
}
