#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! A daily alarm clock that wakes you through an OpenShock device.
//!
//! Alarms are loaded from the [`store`], checked once a second by the
//! [`clock`] engine (usually on the thread started by [`daemon::spawn`]), and
//! delivered through a [`sink::NotificationSink`].

pub mod alarm;
pub mod clock;
pub mod communication;
pub mod config;
pub mod countdown;
pub mod credentials;
pub mod daemon;
pub mod error;
pub mod headless;
pub mod sink;
pub mod store;

pub use alarm::{Alarm, Alarms};
pub use clock::{AlarmClock, Dispatch};
pub use credentials::Credentials;
pub use sink::{NotificationSink, Stimulus};
pub use store::AlarmStore;
