use std::sync::mpsc::Sender;

use crate::{
    alarm::{Alarm, Alarms},
    countdown::Countdown,
    credentials::Credentials,
};

/// Requests for the engine thread. They are applied between ticks, never
/// during one.
#[derive(Debug)]
pub enum Message {
    AddAlarm { name: String, alarm: Alarm },
    RemoveAlarm(String),
    // sent after the settings are saved
    UpdateCredentials(Credentials),
    Snapshot(Sender<Alarms>),
    Countdowns(Sender<Vec<Countdown>>),
    Shutdown,
}
