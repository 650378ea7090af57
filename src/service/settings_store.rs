use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use crate::errors::ConfigError;
use crate::models::destination::{
    CalendarLocator, DestinationConfig, DestinationSettings, parse_timezone,
    validate_soon_minutes, validate_source,
};

pub trait SettingsProvider: Send + Sync {
    fn list_destinations(&self) -> Vec<String>;

    /// `None` when the destination is unknown or its stored settings are
    /// invalid.
    fn get(&self, destination: &str) -> Option<DestinationConfig>;
}

/// Destination settings kept in a JSON object keyed by destination id.
pub struct JsonSettingsStore {
    path: Option<PathBuf>,
    settings: RwLock<BTreeMap<String, DestinationSettings>>,
    /// Entries that did not deserialize. They are written back untouched
    /// until the destination is configured again.
    unreadable: BTreeMap<String, (serde_json::Value, String)>,
}

impl JsonSettingsStore {
    /// Reads the settings file, creating an empty one if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            info!(path = %path.display(), "creating empty settings file");
            let store = Self::empty(Some(path));
            store.save(&store.read())?;
            return Ok(store);
        }

        let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let entries: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut settings = BTreeMap::new();
        let mut unreadable = BTreeMap::new();
        for (destination, value) in entries {
            match serde_json::from_value::<DestinationSettings>(value.clone()) {
                Ok(parsed) => {
                    settings.insert(destination, parsed);
                }
                Err(err) => {
                    warn!(destination = %destination, error = %err, "skipping unreadable destination settings");
                    unreadable.insert(destination, (value, err.to_string()));
                }
            }
        }
        Ok(Self {
            path: Some(path),
            settings: RwLock::new(settings),
            unreadable,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(settings: BTreeMap<String, DestinationSettings>) -> Self {
        let store = Self::empty(None);
        *store.write() = settings;
        store
    }

    fn empty(path: Option<PathBuf>) -> Self {
        Self {
            path,
            settings: RwLock::new(BTreeMap::new()),
            unreadable: BTreeMap::new(),
        }
    }

    /// Checks every stored destination, returning the ones that would be
    /// skipped by the scheduler.
    pub fn validate_all(&self) -> Vec<(String, ConfigError)> {
        let settings = self.read();
        let mut problems: Vec<(String, ConfigError)> = settings
            .iter()
            .filter_map(|(id, settings)| {
                DestinationConfig::try_from(settings)
                    .err()
                    .map(|err| (id.clone(), err))
            })
            .collect();
        problems.extend(
            self.unreadable
                .iter()
                .filter(|(id, _)| !settings.contains_key(*id))
                .map(|(id, (_, err))| (id.clone(), ConfigError::Parse(err.clone()))),
        );
        problems.sort_by(|a, b| a.0.cmp(&b.0));
        problems
    }

    pub fn settings(&self, destination: &str) -> DestinationSettings {
        self.read().get(destination).cloned().unwrap_or_default()
    }

    pub fn set_timezone(&self, destination: &str, zone: &str) -> Result<(), ConfigError> {
        parse_timezone(zone)?;
        self.update(destination, |settings| settings.timezone = zone.to_string())
    }

    pub fn set_soon_minutes(&self, destination: &str, minutes: i64) -> Result<(), ConfigError> {
        validate_soon_minutes(minutes)?;
        self.update(destination, |settings| settings.soon_minutes = minutes)
    }

    pub fn set_source(&self, destination: &str, source: CalendarLocator) -> Result<(), ConfigError> {
        validate_source(&source)?;
        self.update(destination, |settings| settings.source = source)
    }

    fn update<F>(&self, destination: &str, apply: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut DestinationSettings),
    {
        let mut settings = self.write();
        apply(settings.entry(destination.to_string()).or_default());
        self.save(&settings)
    }

    fn save(&self, settings: &BTreeMap<String, DestinationSettings>) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let mut entries = serde_json::Map::new();
        for (id, (value, _)) in &self.unreadable {
            entries.insert(id.clone(), value.clone());
        }
        for (id, stored) in settings {
            let value =
                serde_json::to_value(stored).map_err(|e| ConfigError::Parse(e.to_string()))?;
            entries.insert(id.clone(), value);
        }
        let body = serde_json::to_string_pretty(&entries)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, body).map_err(|e| ConfigError::Io(e.to_string()))
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, DestinationSettings>> {
        self.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, DestinationSettings>> {
        self.settings.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettingsProvider for JsonSettingsStore {
    fn list_destinations(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn get(&self, destination: &str) -> Option<DestinationConfig> {
        let settings = self.read();
        let stored = settings.get(destination)?;
        match DestinationConfig::try_from(stored) {
            Ok(config) => Some(config),
            Err(err) => {
                warn!(destination, error = %err, "ignoring invalid destination settings");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_entries_are_skipped() {
        let mut raw = BTreeMap::new();
        raw.insert("good".to_string(), DestinationSettings::default());
        raw.insert(
            "bad".to_string(),
            DestinationSettings {
                timezone: "Nowhere/Special".to_string(),
                ..DestinationSettings::default()
            },
        );
        let store = JsonSettingsStore::in_memory(raw);

        assert_eq!(store.list_destinations(), vec!["bad", "good"]);
        assert!(store.get("good").is_some());
        assert!(store.get("bad").is_none());
        assert_eq!(store.validate_all().len(), 1);
    }

    #[test]
    fn setters_reject_invalid_values_and_keep_old_ones() {
        let store = JsonSettingsStore::in_memory(BTreeMap::new());
        store.set_timezone("guild", "Asia/Hong_Kong").unwrap();
        assert!(store.set_timezone("guild", "Asia/Atlantis").is_err());
        assert!(store.set_soon_minutes("guild", -1).is_err());
        store.set_soon_minutes("guild", 0).unwrap();

        let settings = store.settings("guild");
        assert_eq!(settings.timezone, "Asia/Hong_Kong");
        assert_eq!(settings.soon_minutes, 0);
        assert_eq!(store.get("guild").unwrap().soon, chrono::Duration::zero());
    }
}
