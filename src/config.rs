use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TodoError;
use crate::models::Rgba;
use crate::notify::ChannelConfig;
use crate::storage::{KeyValueStore, SETTINGS_KEY};

const SCHEMA_VERSION: u32 = 1;
const DATA_DIR_ENV_VAR: &str = "CALTODO_DATA_DIR";
const APP_DIR_NAME: &str = "cal-todo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    /// Prefixed to the text of tasks archived because their time had passed.
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,
    #[serde(default = "default_failure_color")]
    pub failure_color: String,
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub reminder_channel: ChannelConfig,
}

impl Settings {
    pub fn failure_color(&self) -> Rgba {
        Rgba::from_hex(&self.failure_color).unwrap_or_else(|_| {
            log::warn!(
                "invalid failure_color {:?}, using default",
                self.failure_color
            );
            default_failure_rgba()
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            failure_marker: default_failure_marker(),
            failure_color: default_failure_color(),
            notifications_enabled: default_notifications_enabled(),
            reminder_channel: ChannelConfig::default(),
        }
    }
}

fn default_failure_marker() -> String {
    "failed task: ".to_string()
}

fn default_failure_color() -> String {
    // Material red 500.
    "#F44336".to_string()
}

fn default_failure_rgba() -> Rgba {
    Rgba::opaque(0xF4, 0x43, 0x36)
}

fn default_notifications_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}

/// Missing or unreadable settings fall back to defaults.
pub async fn load_settings(store: &dyn KeyValueStore) -> Settings {
    let raw = match store.get_string(SETTINGS_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Settings::default(),
        Err(err) => {
            log::warn!("settings unavailable, using defaults: {err}");
            return Settings::default();
        }
    };
    match serde_json::from_str::<SettingsFile>(&raw) {
        Ok(file) => file.settings,
        Err(err) => {
            log::warn!("invalid settings, using defaults: {err}");
            Settings::default()
        }
    }
}

pub async fn save_settings(store: &dyn KeyValueStore, settings: &Settings) -> Result<(), TodoError> {
    let file = SettingsFile {
        schema_version: SCHEMA_VERSION,
        settings: settings.clone(),
    };
    let json = serde_json::to_string(&file)?;
    store.set_string(SETTINGS_KEY, &json).await
}

/// Directory that holds the preferences file and the logs.
pub fn data_dir() -> Result<PathBuf, TodoError> {
    if let Ok(path) = std::env::var(DATA_DIR_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    if cfg!(windows) {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| TodoError::store_unavailable("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join(APP_DIR_NAME))
    } else {
        let home = std::env::var("HOME")
            .map_err(|_| TodoError::store_unavailable("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn settings_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.failure_marker, "failed task: ");
        assert_eq!(settings.failure_color, "#F44336");
        assert_eq!(settings.failure_color(), Rgba::opaque(0xF4, 0x43, 0x36));
        assert!(settings.notifications_enabled);
        assert_eq!(settings.reminder_channel, ChannelConfig::default());
    }

    #[test]
    fn settings_serde_applies_defaults_for_missing_fields() {
        let json = r#"{ "failure_marker": "missed: " }"#;
        let settings: Settings = serde_json::from_str(json).expect("settings should deserialize");
        assert_eq!(settings.failure_marker, "missed: ");
        assert_eq!(settings.failure_color, "#F44336");
        assert!(settings.notifications_enabled);
        assert_eq!(settings.reminder_channel.id, "task_reminders");
    }

    #[test]
    fn invalid_failure_color_falls_back() {
        let settings = Settings {
            failure_color: "crimson".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.failure_color(), Rgba::opaque(0xF4, 0x43, 0x36));
    }

    #[tokio::test]
    async fn load_settings_handles_missing_and_malformed_blobs() {
        let empty = MemoryStore::new();
        assert_eq!(load_settings(&empty).await, Settings::default());

        let broken = MemoryStore::with_values([(SETTINGS_KEY, "{ nope")]);
        assert_eq!(load_settings(&broken).await, Settings::default());
    }

    #[tokio::test]
    async fn save_then_load_settings() {
        let store = MemoryStore::new();
        let settings = Settings {
            failure_marker: "missed: ".to_string(),
            failure_color: "#FF0000".to_string(),
            notifications_enabled: false,
            ..Settings::default()
        };
        save_settings(&store, &settings).await.unwrap();

        let raw = store.get_string(SETTINGS_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema_version"], 1);

        assert_eq!(load_settings(&store).await, settings);
    }
}
