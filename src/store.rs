//! Durable alarm storage.
//!
//! Alarms live in a TOML file with one section per alarm, keyed by name:
//!
//! ```toml
//! [Wake]
//! time = "2024-03-10 07:00:00"
//! intensity = "60"
//! duration = "3000"
//! vibrate_before = "false"
//! ```
//!
//! The file is a best-effort durability layer. Loading skips bad records,
//! and writes always go through a temp file and a rename so readers never
//! see half a file. A file that is not valid TOML at all is copied to
//! `<file>.corrupt-<timestamp>` before the next write replaces it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::{
    alarm::{Alarm, Alarms},
    error::{RecordError, StoreError},
};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// On-disk shape of one alarm section.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub time: String,
    pub intensity: String,
    pub duration: String,
    pub vibrate_before: String,
}

impl From<&Alarm> for AlarmRecord {
    fn from(alarm: &Alarm) -> Self {
        Self {
            time: alarm.trigger_at.format(TIME_FORMAT).to_string(),
            intensity: alarm.intensity.to_string(),
            duration: alarm.duration_ms.to_string(),
            vibrate_before: alarm.vibrate_before.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlarmStore {
    path: PathBuf,
}

impl AlarmStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every valid alarm, rolling stale ones forward to the future.
    ///
    /// Never fails: an unreadable file yields no alarms and bad records are
    /// logged and skipped.
    #[must_use]
    pub fn load(&self, now: NaiveDateTime) -> Alarms {
        self.load_rolling(now).0
    }

    /// Like [`AlarmStore::load`], but also writes back every alarm that had
    /// to be rolled forward.
    #[must_use]
    pub fn refresh(&self, now: NaiveDateTime) -> Alarms {
        let (alarms, rolled) = self.load_rolling(now);
        for name in rolled {
            if let Err(e) = self.save(&name, &alarms[&name]) {
                error!("error saving alarm {name}: {e}");
            }
        }
        alarms
    }

    fn load_rolling(&self, now: NaiveDateTime) -> (Alarms, Vec<String>) {
        let table = match self.read_table() {
            Ok(table) => table,
            Err(e) => {
                error!("error reading alarms: {e}");
                return (Alarms::new(), Vec::new());
            }
        };

        let mut alarms = Alarms::new();
        let mut rolled = Vec::new();
        for (name, value) in &table {
            match parse_record(value) {
                Ok(mut alarm) => {
                    let days = alarm.roll_forward(now);
                    if days > 0 {
                        info!("alarm {name} was {days} day(s) stale, next at {}", alarm.trigger_at);
                        rolled.push(name.clone());
                    }
                    debug!("loaded alarm {name} at {}", alarm.trigger_at);
                    alarms.insert(name.clone(), alarm);
                }
                Err(e) => error!("error loading alarm {name}: {e}"),
            }
        }
        (alarms, rolled)
    }

    /// Upserts one alarm, keeping every other section of the file as is.
    pub fn save(&self, name: &str, alarm: &Alarm) -> Result<(), StoreError> {
        debug!("saving alarm {name}");
        let mut table = self.read_table_for_update()?;
        table.insert(name.to_string(), Value::try_from(AlarmRecord::from(alarm))?);
        self.write_table(&table)
    }

    /// Removes one alarm. Absent names are not an error.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut table = self.read_table_for_update()?;
        if table.remove(name).is_none() {
            debug!("alarm {name} not in store, nothing to delete");
            return Ok(());
        }
        debug!("deleting alarm {name}");
        self.write_table(&table)
    }

    fn read_table(&self) -> Result<Table, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no alarm file at {}", self.path.display());
                return Ok(Table::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        text.parse::<Table>().map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    // a corrupt file is set aside rather than blocking every future write
    fn read_table_for_update(&self) -> Result<Table, StoreError> {
        match self.read_table() {
            Err(e @ StoreError::Parse { .. }) => {
                let backup = self.corrupt_backup_path();
                fs::copy(&self.path, &backup).map_err(|source| StoreError::Io {
                    path: backup.clone(),
                    source,
                })?;
                warn!(
                    "{e}, kept a copy at {} and rewriting alarm file from scratch",
                    backup.display()
                );
                Ok(Table::new())
            }
            other => other,
        }
    }

    fn corrupt_backup_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f");
        let mut backup = self.path.as_os_str().to_owned();
        backup.push(format!(".corrupt-{stamp}"));
        PathBuf::from(backup)
    }

    fn write_table(&self, table: &Table) -> Result<(), StoreError> {
        let text = toml::to_string(table)?;
        write_atomically(&self.path, &text).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Writes `text` next to `path` and renames it into place.
pub(crate) fn write_atomically(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)
}

/// Parses one alarm section. Integers and booleans may be written either as
/// strings or as native TOML values.
pub fn parse_record(value: &Value) -> Result<Alarm, RecordError> {
    let section = value.as_table().ok_or(RecordError::NotASection)?;

    let time = field(section, "time")?;
    let trigger_at = NaiveDateTime::parse_from_str(&time, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&time, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| RecordError::Invalid {
            field: "time",
            value: time.clone(),
        })?;
    let intensity = integer(section, "intensity")?;
    let duration = integer(section, "duration")?;
    let vibrate = field(section, "vibrate_before")?;
    let vibrate_before = parse_bool(&vibrate).ok_or(RecordError::Invalid {
        field: "vibrate_before",
        value: vibrate,
    })?;

    Ok(Alarm::new(trigger_at, intensity, duration, vibrate_before)?)
}

fn field(section: &Table, key: &'static str) -> Result<String, RecordError> {
    match section.get(key) {
        None => Err(RecordError::MissingField(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Integer(i)) => Ok(i.to_string()),
        Some(Value::Boolean(b)) => Ok(b.to_string()),
        Some(Value::Datetime(d)) => Ok(d.to_string()),
        Some(other) => Err(RecordError::Invalid {
            field: key,
            value: other.to_string(),
        }),
    }
}

fn integer(section: &Table, key: &'static str) -> Result<i64, RecordError> {
    let text = field(section, key)?;
    text.trim()
        .parse()
        .map_err(|_| RecordError::Invalid { field: key, value: text })
}

/// Boolean words accepted in alarm files and the environment.
#[must_use]
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn store_in(dir: &tempfile::TempDir) -> AlarmStore {
        AlarmStore::new(dir.path().join("alarms.toml"))
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load(at(6, 0, 0)).is_empty());
    }

    #[test]
    fn saved_alarm_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let alarm = Alarm::new(at(7, 0, 0), 60, 3000, true).unwrap();
        store.save("Wake", &alarm).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("[Wake]"));
        assert!(text.contains("time = \"2024-03-10 07:00:00\""));
        assert!(text.contains("intensity = \"60\""));

        let alarms = store.load(at(6, 0, 0));
        assert_eq!(alarms.get("Wake"), Some(&alarm));
    }

    #[test]
    fn same_name_saved_twice_keeps_last() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save("Wake", &Alarm::new(at(7, 0, 0), 60, 3000, false).unwrap())
            .unwrap();
        let second = Alarm::new(at(8, 0, 0), 20, 500, true).unwrap();
        store.save("Wake", &second).unwrap();

        let alarms = store.load(at(6, 0, 0));
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms["Wake"], second);
    }

    #[test]
    fn delete_missing_name_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.delete("nobody").unwrap();
        assert!(!store.path().exists());

        store
            .save("Wake", &Alarm::new(at(7, 0, 0), 60, 3000, false).unwrap())
            .unwrap();
        store.delete("nobody").unwrap();
        store.delete("Wake").unwrap();
        assert!(store.load(at(6, 0, 0)).is_empty());
    }

    #[test]
    fn bad_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"
[bad_time]
time = "tomorrow-ish"
intensity = "10"
duration = "1000"
vibrate_before = "false"

[bad_intensity]
time = "2024-03-10 07:00:00"
intensity = "loud"
duration = "1000"
vibrate_before = "false"

[no_vibrate]
time = "2024-03-10 07:00:00"
intensity = "10"
duration = "1000"

[native_types]
time = "2024-03-10 09:00:00"
intensity = 40
duration = 2000
vibrate_before = true

[good]
time = "2024-03-10 08:00:00"
intensity = "10"
duration = "1000"
vibrate_before = "False"
"#,
        )
        .unwrap();

        let alarms = store.load(at(6, 0, 0));
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms["good"], Alarm::new(at(8, 0, 0), 10, 1000, false).unwrap());
        assert_eq!(
            alarms["native_types"],
            Alarm::new(at(9, 0, 0), 40, 2000, true).unwrap()
        );
    }

    #[test]
    fn stale_alarm_rolls_forward_whole_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save("Wake", &Alarm::new(at(7, 0, 0), 60, 3000, false).unwrap())
            .unwrap();

        let now = at(12, 0, 0) + Duration::days(5);
        let alarms = store.load(now);
        let rolled = alarms["Wake"].trigger_at;
        assert!(rolled > now);
        assert_eq!(rolled, at(7, 0, 0) + Duration::days(6));
    }

    #[test]
    fn refresh_writes_rolled_alarms_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save("Wake", &Alarm::new(at(7, 0, 0), 60, 3000, false).unwrap())
            .unwrap();
        store
            .save("Late", &Alarm::new(at(22, 0, 0), 20, 500, false).unwrap())
            .unwrap();

        let now = at(12, 0, 0) + Duration::days(2);
        let alarms = store.refresh(now);
        assert_eq!(alarms["Wake"].trigger_at, at(7, 0, 0) + Duration::days(3));

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("time = \"2024-03-13 07:00:00\""));
        assert!(text.contains("time = \"2024-03-12 22:00:00\""));
    }

    #[test]
    fn save_keeps_unparsable_neighbours() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "[broken]\ntime = \"soon\"\n").unwrap();
        store
            .save("Wake", &Alarm::new(at(7, 0, 0), 60, 3000, false).unwrap())
            .unwrap();
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("[broken]"));
        assert!(text.contains("[Wake]"));
    }

    #[test]
    fn corrupt_file_is_kept_aside_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let corrupt = "[Work]\ntime = \"2024-03-10 08:00:00\"\nintensity = \"10\"\n\
                       duration = \"1000\"\nvibrate_before = \"false\"\n\n\
                       [Gym]\nvibrate_before = oops\n";
        fs::write(store.path(), corrupt).unwrap();
        assert!(store.load(at(6, 0, 0)).is_empty());

        let alarm = Alarm::new(at(7, 0, 0), 60, 3000, false).unwrap();
        store.save("Wake", &alarm).unwrap();
        assert_eq!(store.load(at(6, 0, 0))["Wake"], alarm);

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("alarms.toml.corrupt-"))
            })
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), corrupt);
    }

    #[test]
    fn bool_words() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
