use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::tracking::TrackingSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    pub api_base_url: String,
    pub tracking: TrackingSettings,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".into(),
            tracking: TrackingSettings::default(),
        }
    }
}

/// JSON-file-backed settings, loaded once and rewritten on update.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> TrackerSettings {
        self.data.read().unwrap().clone()
    }

    pub fn tracking(&self) -> TrackingSettings {
        self.data.read().unwrap().tracking
    }

    pub fn api_base_url(&self) -> String {
        self.data.read().unwrap().api_base_url.clone()
    }

    pub fn update_tracking(&self, tracking: TrackingSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.tracking = tracking;
        self.persist(&guard)
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        let settings = store.current();
        assert_eq!(settings.tracking.active_interval_ms, 120_000);
        assert_eq!(settings.tracking.distance_threshold_m, 150.0);
    }

    #[test]
    fn update_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        {
            let store = SettingsStore::new(path.clone()).unwrap();
            let mut tracking = store.tracking();
            tracking.idle_interval_ms = 300_000;
            store.update_tracking(tracking).unwrap();
        }

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.tracking().idle_interval_ms, 300_000);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.tracking().mode_switch_threshold_m, 50.0);
    }
}
