//! API key and shocker id, kept in a `KEY='value'` file apart from the alarms.

use std::{fmt, path::PathBuf};

use log::{debug, error};

use crate::{error::StoreError, store::write_atomically};

pub const API_KEY_VAR: &str = "SHOCK_API_KEY";
pub const SHOCK_ID_VAR: &str = "SHOCK_ID";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub shock_id: String,
}

impl Credentials {
    #[must_use]
    pub fn new(api_key: impl Into<String>, shock_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            shock_id: shock_id.into(),
        }
    }

    /// Both values present, so requests can be made at all.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.api_key.is_empty() && !self.shock_id.is_empty()
    }

    #[must_use]
    pub fn masked_api_key(&self) -> String {
        "*".repeat(self.api_key.chars().count())
    }

    #[must_use]
    pub fn masked_shock_id(&self) -> String {
        let visible: String = self.shock_id.chars().skip(8).collect();
        format!("********{visible}")
    }
}

// never print the secret itself
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.masked_api_key())
            .field("shock_id", &self.masked_shock_id())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the credentials, falling back to empty (not connected) values.
    #[must_use]
    pub fn load(&self) -> Credentials {
        debug!("loading credentials from {}", self.path.display());
        let mut credentials = Credentials::default();
        match self.read_pairs() {
            Ok(pairs) => {
                for (key, value) in pairs {
                    match key.as_str() {
                        API_KEY_VAR => credentials.api_key = value,
                        SHOCK_ID_VAR => credentials.shock_id = value,
                        _ => {}
                    }
                }
            }
            Err(e) => error!("error reading credentials: {e}"),
        }
        debug!("loaded API key: {}", credentials.masked_api_key());
        debug!("loaded shock id: {}", credentials.masked_shock_id());
        credentials
    }

    /// Writes both values, keeping any other keys already in the file.
    pub fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        debug!("saving credentials");
        let mut pairs = match self.read_pairs() {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("error reading credentials before save, rewriting: {e}");
                Vec::new()
            }
        };
        set(&mut pairs, API_KEY_VAR, &credentials.api_key);
        set(&mut pairs, SHOCK_ID_VAR, &credentials.shock_id);

        let text: String = pairs
            .iter()
            .map(|(key, value)| format!("{key}={}\n", quote(value)))
            .collect();
        write_atomically(&self.path, &text).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn read_pairs(&self) -> Result<Vec<(String, String)>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let env_err = |source| StoreError::Env {
            path: self.path.clone(),
            source,
        };
        dotenvy::from_path_iter(&self.path)
            .map_err(env_err)?
            .map(|item| item.map_err(env_err))
            .collect()
    }
}

fn set(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => pairs.push((key.to_string(), value.to_string())),
    }
}

// single quotes are literal; double quotes expand `$VAR` unless escaped
fn quote(value: &str) -> String {
    if value.contains('\'') {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('$', "\\$");
        format!("\"{escaped}\"")
    } else {
        format!("'{value}'")
    }
}
