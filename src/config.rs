use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, StoreError},
    sink::{DEFAULT_CUSTOM_NAME, DEFAULT_ENDPOINT},
    store::write_atomically,
};

const APP_NAME: &str = "openshock_clock";

/// Settings read from `config.toml`, every field optional.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_custom_name")]
    pub custom_name: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
const fn default_request_timeout_ms() -> u64 {
    5000
}
const fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_custom_name() -> String {
    DEFAULT_CUSTOM_NAME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            custom_name: default_custom_name(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the settings file, a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                }
                .into())
            }
        };
        toml::from_str(&text).map_err(|source| {
            StoreError::Parse {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string(self).map_err(StoreError::from)?;
        write_atomically(path, &text).map_err(|source| {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Where every file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl Paths {
    /// Platform directories, with optional overrides for either one.
    pub fn resolve(
        config_dir: Option<PathBuf>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if let (Some(config_dir), Some(data_dir)) = (&config_dir, &data_dir) {
            return Ok(Self {
                config_dir: config_dir.clone(),
                data_dir: data_dir.clone(),
            });
        }
        let dirs = directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or(ConfigError::NoProjectDirs)?;
        Ok(Self {
            config_dir: config_dir.unwrap_or_else(|| dirs.config_dir().to_path_buf()),
            data_dir: data_dir.unwrap_or_else(|| dirs.data_dir().to_path_buf()),
        })
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    #[must_use]
    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join(".env")
    }

    #[must_use]
    pub fn alarms_file(&self) -> PathBuf {
        self.data_dir.join("alarms.toml")
    }

    #[must_use]
    pub fn is_config_present(&self) -> bool {
        self.settings_file().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tick_interval(), Duration::from_secs(1));
        assert_eq!(settings.api_endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_ms = 800\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.request_timeout(), Duration::from_millis(800));
        assert_eq!(settings.tick_interval_ms, 1000);
        assert_eq!(settings.custom_name, "OpenShockClock");
    }

    #[test]
    fn bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "tick_interval_ms = \"fast\"\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Store(StoreError::Parse { .. }))
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let settings = Settings {
            tick_interval_ms: 500,
            ..Settings::new()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn overrides_win() {
        let paths = Paths::resolve(Some("/tmp/c".into()), Some("/tmp/d".into())).unwrap();
        assert_eq!(paths.settings_file(), PathBuf::from("/tmp/c/config.toml"));
        assert_eq!(paths.credentials_file(), PathBuf::from("/tmp/c/.env"));
        assert_eq!(paths.alarms_file(), PathBuf::from("/tmp/d/alarms.toml"));
    }
}
