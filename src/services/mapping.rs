// Proxy Control - Network Mapping Store
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Mapping from network identity to proxy profile.
//!
//! The table is persisted as one general setting: an object keyed by the
//! identity text form whose values are a profile name, `null` (disable the
//! proxy), or the stale marker. Entries keep their insertion order, which
//! decides wildcard precedence.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

use crate::models::config::AUTO_MAP_CONFIG_KEY;
use crate::models::{Error, NetworkIdentity, Result};
use crate::storage::ConfigStore;
use crate::sync::{read, write};

/// Persisted marker of an entry whose profile was deleted. Profile names
/// cannot start with `_`, so it never collides with one.
pub const STALE_MARKER: &str = "_stale";

/// What a network maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingTarget {
    /// Apply the named profile.
    Profile(String),
    /// Turn the proxy off.
    Disabled,
    /// The profile no longer exists.
    Stale,
}

impl MappingTarget {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Disabled),
            Value::String(s) if s == STALE_MARKER => Some(Self::Stale),
            Value::String(s) => Some(Self::Profile(s.clone())),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Profile(name) => Value::String(name.clone()),
            Self::Disabled => Value::Null,
            Self::Stale => Value::String(STALE_MARKER.to_string()),
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        match self {
            Self::Profile(name) => Some(name),
            _ => None,
        }
    }
}

impl From<Option<String>> for MappingTarget {
    fn from(name: Option<String>) -> Self {
        name.map_or(Self::Disabled, Self::Profile)
    }
}

impl fmt::Display for MappingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile(name) => f.write_str(name),
            Self::Disabled => f.write_str("(disabled)"),
            Self::Stale => f.write_str("(stale)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub identity: NetworkIdentity,
    pub target: MappingTarget,
}

/// Insertion-ordered mapping table backed by the config store.
#[derive(Debug)]
pub struct MappingStore {
    config: Arc<ConfigStore>,
    entries: RwLock<Vec<MappingEntry>>,
}

impl MappingStore {
    /// Load the table from the config store's general settings.
    pub fn load(config: Arc<ConfigStore>) -> Self {
        let entries = match config.general_value(AUTO_MAP_CONFIG_KEY) {
            Some(Value::Object(map)) => decode(&map),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                warn!("Ignoring malformed {}: {}", AUTO_MAP_CONFIG_KEY, other);
                Vec::new()
            }
        };
        info!("Loaded {} network mappings", entries.len());

        Self {
            config,
            entries: RwLock::new(entries),
        }
    }

    /// Flag entries whose profile no longer exists.
    fn maintain(&self) {
        let mut entries = write(&self.entries, "mappings");
        for entry in entries.iter_mut() {
            let missing = entry
                .target
                .profile_name()
                .is_some_and(|name| !self.config.contains(name));
            if missing {
                info!("Mapping for {} refers to a deleted profile, marking stale", entry.identity);
                entry.target = MappingTarget::Stale;
            }
        }
    }

    /// The whole table in stored order, after the maintenance pass.
    pub fn lookup(&self) -> Vec<MappingEntry> {
        self.maintain();
        read(&self.entries, "mappings").clone()
    }

    /// Exact-match lookup, after the maintenance pass.
    #[allow(dead_code)]
    pub fn get(&self, identity: &NetworkIdentity) -> Option<MappingTarget> {
        self.maintain();
        read(&self.entries, "mappings")
            .iter()
            .find(|e| &e.identity == identity)
            .map(|e| e.target.clone())
    }

    pub fn len(&self) -> usize {
        read(&self.entries, "mappings").len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the entry governing `current`: the exact entry if present,
    /// otherwise the first wildcard entry on the same SSID in stored order.
    pub fn resolve(&self, current: &NetworkIdentity) -> Option<MappingEntry> {
        self.maintain();
        let entries = read(&self.entries, "mappings");
        if let Some(exact) = entries.iter().find(|e| &e.identity == current) {
            return Some(exact.clone());
        }
        entries
            .iter()
            .find(|e| e.identity.is_wildcard() && e.identity.ssid() == current.ssid())
            .cloned()
    }

    /// Map `identity` to `target`, overwriting an existing entry in place.
    pub fn add(&self, identity: NetworkIdentity, target: MappingTarget) -> Result<()> {
        self.mutate("Adding network mapping", |entries| {
            match entries.iter_mut().find(|e| e.identity == identity) {
                Some(entry) => entry.target = target.clone(),
                None => entries.push(MappingEntry {
                    identity: identity.clone(),
                    target: target.clone(),
                }),
            }
            Ok(())
        })?;
        info!("Mapped {} to {}", identity, target);
        Ok(())
    }

    pub fn remove(&self, identity: &NetworkIdentity) -> Result<()> {
        self.mutate("Removing network mapping", |entries| {
            let index = entries
                .iter()
                .position(|e| &e.identity == identity)
                .ok_or_else(|| Error::MappingNotFound(identity.to_string()))?;
            entries.remove(index);
            Ok(())
        })?;
        info!("Removed mapping for {}", identity);
        Ok(())
    }

    /// Mutate a copy, persist the whole table, then publish the copy.
    fn mutate<F>(&self, operation: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<MappingEntry>) -> Result<()>,
    {
        let mut entries = write(&self.entries, "mappings");
        let mut next = entries.clone();
        let outcome = f(&mut next).and_then(|()| {
            self.config
                .set_general(AUTO_MAP_CONFIG_KEY, Value::Object(encode(&next)))
        });
        match outcome {
            Ok(()) => {
                *entries = next;
                Ok(())
            }
            Err(e) => {
                error!("{} failed: {}", operation, e);
                Err(e)
            }
        }
    }
}

fn decode(map: &Map<String, Value>) -> Vec<MappingEntry> {
    map.iter()
        .filter_map(|(key, value)| match MappingTarget::from_value(value) {
            Some(target) => Some(MappingEntry {
                identity: NetworkIdentity::from_text(key),
                target,
            }),
            None => {
                warn!("Skipping mapping {:?} with unexpected value {}", key, value);
                None
            }
        })
        .collect()
}

fn encode(entries: &[MappingEntry]) -> Map<String, Value> {
    let map: Map<String, Value> = entries
        .iter()
        .map(|e| (e.identity.to_text(), e.target.to_value()))
        .collect();
    debug!("Encoded {} network mappings", map.len());
    map
}
