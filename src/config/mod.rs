//! Process-tunable parameters, persisted under `/config/{key}` and mirrored
//! in memory. The mirror has a single writer (`update`) and many readers
//! (driver and engine components through the shared context).

use crate::constants;
use crate::errors::OrchestratorError;
use crate::keys;
use crate::kv_store::KvStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use url::Url;

/// The allow-list of tunable keys. Anything else is rejected by `update`.
#[derive(
    Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
pub enum ConfigKey {
    #[strum(serialize = "SPIDER_REST_URL")]
    #[serde(rename = "SPIDER_REST_URL")]
    SpiderRestUrl,
    #[strum(serialize = "DRAGONFLY_REST_URL")]
    #[serde(rename = "DRAGONFLY_REST_URL")]
    DragonflyRestUrl,
    #[strum(serialize = "DB_URL")]
    #[serde(rename = "DB_URL")]
    DbUrl,
    #[strum(serialize = "DB_DATABASE")]
    #[serde(rename = "DB_DATABASE")]
    DbDatabase,
    #[strum(serialize = "DB_USER")]
    #[serde(rename = "DB_USER")]
    DbUser,
    #[strum(serialize = "DB_PASSWORD")]
    #[serde(rename = "DB_PASSWORD")]
    DbPassword,
    #[strum(serialize = "AUTOCONTROL_DURATION_MS")]
    #[serde(rename = "AUTOCONTROL_DURATION_MS")]
    AutocontrolDurationMs,
}

/// A persisted config entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigItem {
    pub id: String,
    pub value: String,
}

/// In-process mirror of `/config/**`. Readers never touch the KV store.
#[derive(Default)]
pub struct RuntimeSettings {
    values: RwLock<BTreeMap<ConfigKey, String>>,
}

impl RuntimeSettings {
    pub fn new() -> Self {
        RuntimeSettings {
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn set(&self, key: ConfigKey, value: String) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key, value);
    }

    pub fn get(&self, key: ConfigKey) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&key).cloned()
    }

    pub fn spider_rest_url(&self) -> String {
        self.get(ConfigKey::SpiderRestUrl)
            .unwrap_or_else(|| constants::DEFAULT_SPIDER_REST_URL.to_string())
    }

    pub fn dragonfly_rest_url(&self) -> String {
        self.get(ConfigKey::DragonflyRestUrl)
            .unwrap_or_else(|| constants::DEFAULT_DRAGONFLY_REST_URL.to_string())
    }

    pub fn autocontrol_duration(&self) -> Duration {
        let millis = self
            .get(ConfigKey::AutocontrolDurationMs)
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(constants::DEFAULT_AUTOCONTROL_DURATION_MS);
        Duration::from_millis(millis)
    }
}

/// Persists `value` under the allow-listed `key` and refreshes the mirror.
pub fn update(
    kv: &dyn KvStore,
    settings: &RuntimeSettings,
    key: &str,
    value: &str,
) -> Result<ConfigItem, OrchestratorError> {
    let config_key = ConfigKey::from_str(key).map_err(|_| {
        OrchestratorError::invalid_field("configKey", format!("`{key}` is not an allowed config key"))
    })?;

    match config_key {
        ConfigKey::SpiderRestUrl | ConfigKey::DragonflyRestUrl => {
            Url::parse(value).map_err(|e| {
                OrchestratorError::invalid_field("value", format!("`{value}` is not a valid URL: {e}"))
            })?;
        }
        ConfigKey::AutocontrolDurationMs => {
            value.parse::<u64>().map_err(|_| {
                OrchestratorError::invalid_field("value", format!("`{value}` is not a millisecond count"))
            })?;
        }
        _ => {}
    }

    let item = ConfigItem {
        id: config_key.to_string(),
        value: value.to_string(),
    };
    kv.put(&keys::config_key(&item.id), &serde_json::to_string(&item)?)?;
    settings.set(config_key, value.to_string());

    info!("config `{}` updated", item.id);
    Ok(item)
}

pub fn get(kv: &dyn KvStore, key: &str) -> Result<ConfigItem, OrchestratorError> {
    let config_key = ConfigKey::from_str(key).map_err(|_| {
        OrchestratorError::invalid_field("configKey", format!("`{key}` is not an allowed config key"))
    })?;

    let entry = kv
        .get(&keys::config_key(&config_key.to_string()))?
        .ok_or_else(|| OrchestratorError::ConfigNotFound { key: key.to_string() })?;

    Ok(serde_json::from_str(&entry.value)?)
}

pub fn list(kv: &dyn KvStore) -> Result<Vec<ConfigItem>, OrchestratorError> {
    let entries = kv.get_list(keys::CONFIG_PREFIX, false)?;
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        items.push(serde_json::from_str(&entry.value)?);
    }
    Ok(items)
}

/// Loads every persisted config entry into the mirror. Must run before the
/// first driver call so URL overrides apply from the start.
pub fn init_settings_from_store(kv: &dyn KvStore, settings: &RuntimeSettings) -> Result<(), OrchestratorError> {
    for key in ConfigKey::iter() {
        if let Some(entry) = kv.get(&keys::config_key(&key.to_string()))? {
            let item: ConfigItem = serde_json::from_str(&entry.value)?;
            settings.set(key, item.value);
        }
    }
    Ok(())
}
