//! One-shot trigger configured entirely from the environment.

use log::{debug, info};

use crate::{
    credentials::{Credentials, API_KEY_VAR, SHOCK_ID_VAR},
    error::{EnvError, EnvErrors},
    sink::{NotificationSink, Stimulus},
    store::parse_bool,
};

pub const INTENSITY_VAR: &str = "INTENSITY";
pub const DURATION_VAR: &str = "DURATION";
pub const VIBRATE_BEFORE_VAR: &str = "VIBRATE_BEFORE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessConfig {
    pub credentials: Credentials,
    pub intensity: u8,
    pub duration_ms: u32,
    pub vibrate_before: bool,
}

impl HeadlessConfig {
    pub fn from_env() -> Result<Self, EnvErrors> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every key and reports every problem, not just the first.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvErrors>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();
        // empty counts as missing
        let mut get = |key: &'static str| {
            let value = lookup(key).filter(|v| !v.trim().is_empty());
            if value.is_none() {
                errors.push(EnvError::Missing(key));
            }
            value
        };

        let api_key = get(API_KEY_VAR);
        let shock_id = get(SHOCK_ID_VAR);
        let intensity = get(INTENSITY_VAR);
        let duration = get(DURATION_VAR);
        let vibrate_before = get(VIBRATE_BEFORE_VAR);

        let intensity = intensity.and_then(|v| {
            let parsed = v.trim().parse::<u8>().ok().filter(|i| *i <= 100);
            if parsed.is_none() {
                errors.push(EnvError::Invalid {
                    key: INTENSITY_VAR,
                    reason: "must be an integer between 0 and 100",
                });
            }
            parsed
        });
        let duration = duration.and_then(|v| {
            let parsed = v.trim().parse::<u32>().ok().filter(|d| *d > 0);
            if parsed.is_none() {
                errors.push(EnvError::Invalid {
                    key: DURATION_VAR,
                    reason: "must be a positive integer",
                });
            }
            parsed
        });
        let vibrate_before = vibrate_before.and_then(|v| {
            let parsed = parse_bool(&v);
            if parsed.is_none() {
                errors.push(EnvError::Invalid {
                    key: VIBRATE_BEFORE_VAR,
                    reason: "must be a boolean (true/false)",
                });
            }
            parsed
        });

        match (api_key, shock_id, intensity, duration, vibrate_before) {
            (Some(api_key), Some(shock_id), Some(intensity), Some(duration_ms), Some(vibrate_before))
                if errors.is_empty() =>
            {
                let config = Self {
                    credentials: Credentials::new(api_key, shock_id),
                    intensity,
                    duration_ms,
                    vibrate_before,
                };
                debug!("loaded API key: {}", config.credentials.masked_api_key());
                debug!("loaded shock id: {}", config.credentials.masked_shock_id());
                debug!("loaded intensity: {intensity}, duration: {duration_ms}ms, vibrate before: {vibrate_before}");
                Ok(config)
            }
            _ => Err(EnvErrors(errors)),
        }
    }

    #[must_use]
    pub fn stimulus(&self) -> Stimulus {
        Stimulus {
            intensity: self.intensity,
            duration_ms: self.duration_ms,
            warning: false,
        }
    }
}

/// Fires the pre-warning (if enabled) and then the main event, once.
///
/// Returns whether the main event was confirmed; the warning is best-effort.
pub fn trigger(config: &HeadlessConfig, sink: &dyn NotificationSink) -> bool {
    if config.vibrate_before {
        info!("triggering vibration warning at intensity 100 for 10 seconds");
        sink.fire(&config.credentials, &Stimulus::warning());
    }
    info!("triggering alarm");
    sink.fire(&config.credentials, &config.stimulus())
}
