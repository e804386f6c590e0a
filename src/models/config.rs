// Proxy Control - Persisted Configuration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Persisted configuration model.
//!
//! The whole file is one JSON object:
//!
//! ```json
//! { "proxy": { "<name>": ProfileObject, ... }, "general": { "<key>": value, ... } }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::profile::ProfileTable;

/// Auto-map enabled flag (bool).
pub const AUTO_MAP_ENABLED_KEY: &str = "auto_map";

/// Serialized mapping table (object of encoded identity → name or null).
pub const AUTO_MAP_CONFIG_KEY: &str = "auto_map_config";

/// Poller tick in seconds.
pub const CHECK_INTERVAL_KEY: &str = "check_interval";

/// Show desktop notifications (bool).
pub const SHOW_NOTIFICATIONS_KEY: &str = "show_notifications";

/// Default poller tick in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 1;

/// Free-form general settings with typed, defaulted reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneralSettings(Map<String, Value>);

impl GeneralSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `key` as `T`, falling back to `default` when absent or of the
    /// wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.0.get(key) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(v) => v,
                Err(e) => {
                    warn!("General setting {} has unexpected shape ({}), using default", key, e);
                    default
                }
            },
            None => default,
        }
    }

    /// Raw value access.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The persisted configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub proxy: ProfileTable,
    #[serde(default)]
    pub general: GeneralSettings,
}

impl ConfigFile {
    /// Load configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, super::Error> {
        Ok(serde_json::from_str(content)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, super::Error> {
        serde_json::to_string_pretty(self)
            .map_err(|e| super::Error::ConfigWriteFailed(e.to_string()))
    }
}
