//! Where fired alarms go.
//!
//! [`NotificationSink`] is the only thing the engine knows about the device.
//! [`HttpSink`] talks to the OpenShock control API, [`RecordingSink`] just
//! remembers what it was asked to do.

use std::{sync::Mutex, time::Duration};

use log::{debug, error};
use reqwest::blocking::Client;
use serde::Serialize;

use crate::{alarm::Alarm, credentials::Credentials, error::SinkError};

pub const DEFAULT_ENDPOINT: &str = "https://api.shocklink.net/2/shockers/control";
pub const DEFAULT_CUSTOM_NAME: &str = "OpenShockClock";

pub const WARNING_INTENSITY: u8 = 100;
pub const WARNING_DURATION_MS: u32 = 10_000;

/// One command for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stimulus {
    pub intensity: u8,
    pub duration_ms: u32,
    pub warning: bool,
}

impl Stimulus {
    /// The alarm's own configured event.
    #[must_use]
    pub const fn main(alarm: &Alarm) -> Self {
        Self {
            intensity: alarm.intensity,
            duration_ms: alarm.duration_ms,
            warning: false,
        }
    }

    /// The pre-warning is always full intensity for ten seconds, whatever the
    /// alarm is configured with.
    #[must_use]
    pub const fn warning() -> Self {
        Self {
            intensity: WARNING_INTENSITY,
            duration_ms: WARNING_DURATION_MS,
            warning: true,
        }
    }

    #[must_use]
    pub const fn control_type(&self) -> ControlType {
        if self.warning {
            ControlType::Vibrate
        } else {
            ControlType::Shock
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlType {
    Vibrate,
    Shock,
}

/// Fires a command at the shocker named by `credentials`.
///
/// Returns whether the command was confirmed. Implementations log their own
/// failures and never panic or return errors past this point.
pub trait NotificationSink: Send + Sync {
    fn fire(&self, credentials: &Credentials, stimulus: &Stimulus) -> bool;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlRequest<'a> {
    shocks: [ShockCommand<'a>; 1],
    custom_name: String,
}

#[derive(Debug, Serialize)]
struct ShockCommand<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: ControlType,
    intensity: u8,
    duration: u32,
    exclusive: bool,
}

/// Sink backed by the OpenShock HTTP control API.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: String,
    custom_name: String,
}

impl HttpSink {
    pub fn new(
        endpoint: impl Into<String>,
        custom_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            custom_name: custom_name.into(),
        })
    }

    /// Posts one command, succeeding only on a 2xx answer.
    pub fn send(
        &self,
        credentials: &Credentials,
        stimulus: &Stimulus,
    ) -> Result<reqwest::StatusCode, SinkError> {
        if !credentials.is_connected() {
            return Err(SinkError::NotConnected);
        }
        let custom_name = if stimulus.warning {
            format!("{} - Vibration Warning", self.custom_name)
        } else {
            self.custom_name.clone()
        };
        let body = ControlRequest {
            shocks: [ShockCommand {
                id: &credentials.shock_id,
                kind: stimulus.control_type(),
                intensity: stimulus.intensity,
                duration: stimulus.duration_ms,
                exclusive: true,
            }],
            custom_name,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .header("OpenShockToken", &credentials.api_key)
            .json(&body)
            .send()?;
        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(SinkError::Status(status))
        }
    }
}

impl NotificationSink for HttpSink {
    fn fire(&self, credentials: &Credentials, stimulus: &Stimulus) -> bool {
        debug!(
            "sending {:?} - intensity: {}, duration: {}ms",
            stimulus.control_type(),
            stimulus.intensity,
            stimulus.duration_ms
        );
        match self.send(credentials, stimulus) {
            Ok(status) => {
                debug!("control api response: {status}");
                true
            }
            Err(e) if stimulus.warning => {
                error!("failed to trigger vibration warning: {e}");
                false
            }
            Err(e) => {
                error!("failed to trigger shock: {e}");
                false
            }
        }
    }
}

/// A call seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    pub shock_id: String,
    pub stimulus: Stimulus,
}

/// Sink that remembers every call and answers with a fixed result.
#[derive(Debug)]
pub struct RecordingSink {
    calls: Mutex<Vec<Fired>>,
    confirm: bool,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RecordingSink {
    #[must_use]
    pub const fn new(confirm: bool) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            confirm,
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Fired> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl NotificationSink for RecordingSink {
    fn fire(&self, credentials: &Credentials, stimulus: &Stimulus) -> bool {
        let fired = Fired {
            shock_id: credentials.shock_id.clone(),
            stimulus: *stimulus,
        };
        match self.calls.lock() {
            Ok(mut calls) => calls.push(fired),
            Err(poisoned) => poisoned.into_inner().push(fired),
        }
        self.confirm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use serde_json::json;

    fn credentials() -> Credentials {
        Credentials::new("token-123", "shocker-1")
    }

    fn sink_for(server: &mockito::Server) -> HttpSink {
        HttpSink::new(
            format!("{}/2/shockers/control", server.url()),
            DEFAULT_CUSTOM_NAME,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn alarm() -> Alarm {
        let at = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        Alarm::new(at, 60, 3000, true).unwrap()
    }

    #[test]
    fn warning_ignores_alarm_settings() {
        let warning = Stimulus::warning();
        assert_eq!(warning.intensity, 100);
        assert_eq!(warning.duration_ms, 10_000);
        assert_eq!(warning.control_type(), ControlType::Vibrate);
        assert_eq!(Stimulus::main(&alarm()).control_type(), ControlType::Shock);
    }

    #[test]
    fn posts_shock_command() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/2/shockers/control")
            .match_header("OpenShockToken", "token-123")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "shocks": [{
                    "id": "shocker-1",
                    "type": "Shock",
                    "intensity": 60,
                    "duration": 3000,
                    "exclusive": true
                }],
                "customName": "OpenShockClock"
            })))
            .with_status(200)
            .create();

        assert!(sink_for(&server).fire(&credentials(), &Stimulus::main(&alarm())));
        mock.assert();
    }

    #[test]
    fn posts_vibration_warning() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/2/shockers/control")
            .match_body(Matcher::Json(json!({
                "shocks": [{
                    "id": "shocker-1",
                    "type": "Vibrate",
                    "intensity": 100,
                    "duration": 10000,
                    "exclusive": true
                }],
                "customName": "OpenShockClock - Vibration Warning"
            })))
            .with_status(200)
            .create();

        assert!(sink_for(&server).fire(&credentials(), &Stimulus::warning()));
        mock.assert();
    }

    #[test]
    fn non_success_status_is_not_confirmed() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/2/shockers/control")
            .with_status(401)
            .expect(2)
            .create();

        let sink = sink_for(&server);
        assert!(matches!(
            sink.send(&credentials(), &Stimulus::main(&alarm())),
            Err(SinkError::Status(status)) if status.as_u16() == 401
        ));
        assert!(!sink.fire(&credentials(), &Stimulus::main(&alarm())));
        mock.assert();
    }

    #[test]
    fn missing_credentials_never_hit_the_network() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/2/shockers/control")
            .expect(0)
            .create();

        let sink = sink_for(&server);
        assert!(!sink.fire(&Credentials::new("", "shocker-1"), &Stimulus::warning()));
        mock.assert();
    }

    #[test]
    fn unreachable_endpoint_is_not_confirmed() {
        let sink = HttpSink::new(
            "http://127.0.0.1:9/2/shockers/control",
            DEFAULT_CUSTOM_NAME,
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(!sink.fire(&credentials(), &Stimulus::main(&alarm())));
    }

    #[test]
    fn recording_sink_records() {
        let sink = RecordingSink::new(false);
        assert!(!sink.fire(&credentials(), &Stimulus::warning()));
        assert_eq!(
            sink.calls(),
            vec![Fired {
                shock_id: "shocker-1".to_string(),
                stimulus: Stimulus::warning(),
            }]
        );
    }
}
