// Proxy Control - Configuration Storage
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Persisted configuration store.
//!
//! Handles:
//! - Named proxy profiles (insertion ordered)
//! - Free-form general settings
//! - The "active profile" marker
//!
//! Every mutation persists the whole file atomically before it becomes
//! visible; a failed mutation is logged and leaves the store unchanged.
//! A malformed file is renamed aside and replaced with an empty store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::models::validation::{validate_profile, validate_profile_name};
use crate::models::{
    ConfigFile, Error, NamedProfile, ProxyProfile, Result, CONFIG_DIR_NAME,
    CONFIG_FILE_NAME,
};
use crate::services::events::CallbackSlot;
use crate::sync::{read, write};
use crate::system::SystemState;

/// Persisted profiles and general settings.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<ConfigFile>,
    /// Name of the profile currently applied, if known.
    active: RwLock<Option<String>>,
    active_changed: CallbackSlot<String>,
}

impl ConfigStore {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Open the store at the default location.
    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    /// Open the store at `path`. Never fails: problems are logged and the
    /// store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (data, fresh) = load(&path);

        let store = Self {
            path,
            data: RwLock::new(data),
            active: RwLock::new(None),
            active_changed: CallbackSlot::new("active-profile-changed"),
        };

        if fresh {
            let data = read(&store.data, "config").clone();
            match store.persist(&data) {
                Ok(()) => info!("Created new configuration file {:?}", store.path),
                Err(e) => error!("Failed to create configuration file: {}", e),
            }
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Event fired by [`ConfigStore::set_active`].
    pub fn active_changed(&self) -> &CallbackSlot<String> {
        &self.active_changed
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write `data` to a temporary file and rename it over the target.
    fn persist(&self, data: &ConfigFile) -> Result<()> {
        let json = data.to_json()?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                Error::ConfigWriteFailed(format!("cannot create {:?}: {}", dir, e))
            })?;
            // Restrictive permissions on the config directory (0700)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
            }
        }

        let tmp = sibling_path(&self.path, ".tmp");
        fs::write(&tmp, json)
            .map_err(|e| Error::ConfigWriteFailed(format!("cannot write {:?}: {}", tmp, e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600));
        }
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::ConfigWriteFailed(format!("cannot replace {:?}: {}", self.path, e))
        })?;

        info!("Saved {} proxy profiles to {:?}", data.proxy.len(), self.path);
        Ok(())
    }

    /// Apply `f` to a copy of the data, persist it, then publish it.
    fn mutate<F>(&self, operation: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut ConfigFile) -> Result<()>,
    {
        let mut data = write(&self.data, "config");
        let mut next = data.clone();
        let outcome = f(&mut next).and_then(|()| self.persist(&next));
        match outcome {
            Ok(()) => {
                *data = next;
                Ok(())
            }
            Err(e) => {
                error!("{} failed: {}", operation, e);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    /// All profiles in stored order.
    pub fn profiles(&self) -> Vec<NamedProfile> {
        read(&self.data, "config").proxy.iter().cloned().collect()
    }

    pub fn profile_names(&self) -> Vec<String> {
        read(&self.data, "config").proxy.names()
    }

    pub fn profile(&self, name: &str) -> Option<ProxyProfile> {
        read(&self.data, "config").proxy.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.data, "config").proxy.contains(name)
    }

    /// Add a new profile. Fails if the name is taken or invalid.
    pub fn add_profile(&self, name: &str, profile: ProxyProfile) -> Result<()> {
        self.mutate("Adding proxy profile", |data| {
            validate_profile_name(name)?;
            validate_profile(&profile)?;
            if data.proxy.contains(name) {
                return Err(Error::ProfileAlreadyExists(name.to_string()));
            }
            data.proxy.insert(name, profile);
            Ok(())
        })?;
        info!("Added proxy profile {}", name);
        Ok(())
    }

    /// Replace `old_name` with `(new_name, profile)` in place. If the entry
    /// is the active profile, the marker follows the rename and the new
    /// settings are applied at once.
    pub fn update_profile(
        &self,
        system: &dyn SystemState,
        old_name: &str,
        new_name: &str,
        profile: ProxyProfile,
    ) -> Result<()> {
        self.mutate("Updating proxy profile", |data| {
            if !data.proxy.contains(old_name) {
                return Err(Error::ProfileNotFound(old_name.to_string()));
            }
            if old_name != new_name {
                validate_profile_name(new_name)?;
                if data.proxy.contains(new_name) {
                    return Err(Error::ProfileAlreadyExists(new_name.to_string()));
                }
            }
            validate_profile(&profile)?;
            data.proxy.replace(old_name, new_name, profile.clone());
            Ok(())
        })?;
        info!("Updated proxy profile {} -> {}", old_name, new_name);

        let was_active = {
            let mut active = write(&self.active, "active profile");
            let was_active = active.as_deref() == Some(old_name);
            if was_active {
                *active = Some(new_name.to_string());
            }
            was_active
        };
        if was_active {
            if let Err(e) = system.apply_profile(&profile) {
                error!("Failed to re-apply active profile {}: {}", new_name, e);
            }
        }
        Ok(())
    }

    /// Remove a profile, clearing the active marker if it pointed at it.
    pub fn remove_profile(&self, name: &str) -> Result<()> {
        self.mutate("Removing proxy profile", |data| {
            data.proxy
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
        })?;
        info!("Removed proxy profile {}", name);

        let mut active = write(&self.active, "active profile");
        if active.as_deref() == Some(name) {
            *active = None;
        }
        Ok(())
    }

    // ========================================================================
    // Active profile
    // ========================================================================

    pub fn active(&self) -> Option<String> {
        read(&self.active, "active profile").clone()
    }

    /// Apply a profile's settings and mark it active.
    pub fn set_active(&self, system: &dyn SystemState, name: &str) -> Result<()> {
        let Some(profile) = self.profile(name) else {
            error!("Proxy profile {} not found", name);
            return Err(Error::ProfileNotFound(name.to_string()));
        };

        if let Err(e) = system.apply_profile(&profile) {
            error!("Failed to apply proxy profile {}: {}", name, e);
            return Err(e);
        }

        *write(&self.active, "active profile") = Some(name.to_string());
        info!("Active proxy profile set to {}", name);
        self.active_changed.emit(name.to_string());
        Ok(())
    }

    /// Mark the first stored profile matching the live settings as active.
    pub fn identify_active(&self, system: &dyn SystemState) -> Option<String> {
        let live = match system.read_proxy_settings() {
            Ok(settings) => settings.proxy,
            Err(e) => {
                warn!("Cannot read live proxy settings: {}", e);
                None
            }
        };
        let gateway = system.gateway_address();
        let versioned = system.keeps_socks_version();

        let found = live.and_then(|live| {
            read(&self.data, "config")
                .proxy
                .iter()
                .find(|entry| {
                    if versioned {
                        entry.profile.matches_live(&live, gateway)
                    } else {
                        entry.profile.matches_live_unversioned(&live, gateway)
                    }
                })
                .map(|entry| entry.name.clone())
        });

        *write(&self.active, "active profile") = found.clone();
        info!("Active proxy profile identified as {:?}", found);
        found
    }

    // ========================================================================
    // General settings
    // ========================================================================

    /// Typed read with default fallback.
    pub fn general<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        read(&self.data, "config").general.get(key, default)
    }

    pub fn general_value(&self, key: &str) -> Option<Value> {
        read(&self.data, "config").general.value(key).cloned()
    }

    /// Set a general value and persist immediately.
    pub fn set_general<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| Error::ConfigWriteFailed(format!("{}: {}", key, e)))?;
        self.mutate("Saving general setting", |data| {
            data.general.set(key, value);
            Ok(())
        })?;
        debug!("General setting {} saved", key);
        Ok(())
    }
}

/// Read the file at `path`. The flag is set when a fresh file should be
/// written.
fn load(path: &Path) -> (ConfigFile, bool) {
    match fs::read_to_string(path) {
        Ok(content) => match ConfigFile::from_json(&content) {
            Ok(mut data) => {
                let before = data.proxy.len();
                data.proxy.retain(|entry| match validate_entry(entry) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Dropping stored proxy profile {:?}: {}", entry.name, e);
                        false
                    }
                });
                info!("Loaded {} proxy profiles from {:?}", data.proxy.len(), path);
                if data.proxy.len() < before {
                    // Keep the hand-edited original, write the cleaned store.
                    quarantine(path);
                    return (data, true);
                }
                (data, false)
            }
            Err(e) => {
                error!("Malformed configuration {:?}: {}", path, e);
                quarantine(path);
                (ConfigFile::default(), true)
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Configuration file {:?} not found, creating new one", path);
            (ConfigFile::default(), true)
        }
        Err(e) => {
            // Leave an unreadable file alone rather than clobbering it.
            error!("{}", Error::ConfigReadFailed(format!("{:?}: {}", path, e)));
            (ConfigFile::default(), false)
        }
    }
}

fn validate_entry(entry: &NamedProfile) -> Result<()> {
    validate_profile_name(&entry.name)?;
    validate_profile(&entry.profile)
}

/// Rename a corrupt file to `<file>.bad-<timestamp>`.
fn quarantine(path: &Path) {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let target = sibling_path(path, &format!(".bad-{}", stamp));
    match fs::rename(path, &target) {
        Ok(()) => warn!("Moved malformed configuration to {:?}", target),
        Err(e) => error!("Failed to move malformed configuration aside: {}", e),
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::AUTO_MAP_ENABLED_KEY;
    use crate::models::{DirectProxy, GatewayProxy, ProxyProtocol};
    use crate::system::{MemoryBackend, StateCategory};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn direct(host: &str, port: u16) -> ProxyProfile {
        DirectProxy::new(ProxyProtocol::Http, host, port).into()
    }

    fn store() -> (TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json"));
        (dir, store)
    }

    #[test]
    fn test_open_creates_empty_file() {
        let (dir, store) = store();
        assert!(store.profiles().is_empty());

        let content = fs::read_to_string(dir.path().join("config.json")).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value, serde_json::json!({"proxy": {}, "general": {}}));
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.add_profile("office", direct("10.0.0.1", 8080)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_profiles_keep_order_across_reopen() {
        let (dir, store) = store();
        for name in ["zulu", "alpha", "mike"] {
            store.add_profile(name, direct("10.0.0.1", 8080)).unwrap();
        }

        let reopened = ConfigStore::open(dir.path().join("config.json"));
        assert_eq!(reopened.profile_names(), vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_add_rejects_duplicate_and_invalid() {
        let (_dir, store) = store();
        store.add_profile("office", direct("10.0.0.1", 8080)).unwrap();

        let err = store.add_profile("office", direct("10.0.0.2", 1)).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.profile("office"), Some(direct("10.0.0.1", 8080)));

        assert!(store.add_profile("_hidden", direct("h", 1)).is_err());
        assert!(store.add_profile("has space", direct("h", 1)).is_err());
        assert_eq!(store.profiles().len(), 1);
    }

    #[test]
    fn test_remove_clears_active() {
        let (_dir, store) = store();
        let backend = MemoryBackend::new();
        store.add_profile("office", direct("10.0.0.1", 8080)).unwrap();
        store.set_active(&backend, "office").unwrap();

        assert!(store.remove_profile("missing").unwrap_err().is_not_found());
        assert_eq!(store.active().as_deref(), Some("office"));

        store.remove_profile("office").unwrap();
        assert_eq!(store.active(), None);
        assert!(!store.contains("office"));
    }

    #[test]
    fn test_update_renames_in_place_and_reapplies_active() {
        let (_dir, store) = store();
        let backend = MemoryBackend::new();
        store.add_profile("first", direct("10.0.0.1", 8080)).unwrap();
        store.add_profile("second", direct("10.0.0.2", 8080)).unwrap();
        store.set_active(&backend, "first").unwrap();

        store
            .update_profile(&backend, "first", "renamed", direct("10.0.0.9", 3128))
            .unwrap();
        assert_eq!(store.profile_names(), vec!["renamed", "second"]);
        assert_eq!(store.active().as_deref(), Some("renamed"));
        assert_eq!(backend.values().proxy_server, "http://10.0.0.9:3128");

        let err = store
            .update_profile(&backend, "renamed", "second", direct("h", 1))
            .unwrap_err();
        assert!(err.is_already_exists());
        assert!(store
            .update_profile(&backend, "missing", "x", direct("h", 1))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_update_inactive_does_not_touch_system() {
        let (_dir, store) = store();
        let backend = MemoryBackend::new();
        store.add_profile("office", direct("10.0.0.1", 8080)).unwrap();
        store
            .update_profile(&backend, "office", "office", direct("10.0.0.2", 8080))
            .unwrap();
        assert!(backend.values().proxy_server.is_empty());
    }

    #[test]
    fn test_malformed_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::open(&path);
        assert!(store.profiles().is_empty());

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("config.json.bad-")));
        assert!(names.iter().any(|n| n == "config.json"));
    }

    #[test]
    fn test_invalid_stored_profiles_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let json = serde_json::json!({
            "proxy": {
                "_bad name": {"proxyType": "SpecificProxy", "proto": "http", "host": "a:b", "port": 8080, "noProxyies": []},
                "office": {"proxyType": "SpecificProxy", "proto": "http", "host": "10.0.0.1", "port": 8080, "noProxyies": []},
                "bad_host": {"proxyType": "SpecificProxy", "proto": "http", "host": "a:b", "port": 3128, "noProxyies": []}
            },
            "general": {"auto_map": true}
        });
        fs::write(&path, json.to_string()).unwrap();

        let store = ConfigStore::open(&path);
        assert_eq!(store.profile_names(), vec!["office"]);
        assert!(store.general(AUTO_MAP_ENABLED_KEY, false));

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("config.json.bad-")));

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.profile_names(), vec!["office"]);
    }

    #[test]
    fn test_identify_active_matches_gateway_profile() {
        let (_dir, store) = store();
        let backend = MemoryBackend::new();
        backend.set_network(None, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))));
        store.add_profile("office", direct("10.0.0.1", 8080)).unwrap();
        store
            .add_profile("home", GatewayProxy::new(ProxyProtocol::Http, 3128).into())
            .unwrap();

        assert_eq!(store.identify_active(&backend), None);

        backend
            .write_proxy_settings(&GatewayProxy::new(ProxyProtocol::Http, 3128).into(), true)
            .unwrap();
        assert_eq!(store.identify_active(&backend).as_deref(), Some("home"));
        assert_eq!(store.active().as_deref(), Some("home"));
    }

    #[test]
    fn test_identify_active_without_socks_version() {
        let (_dir, store) = store();
        let backend = MemoryBackend::new();
        backend.update(StateCategory::Proxy, |v| v.socks_version = false);
        let socks4: ProxyProfile = DirectProxy::new(ProxyProtocol::Socks4, "10.0.0.9", 1080).into();
        store.add_profile("legacy", socks4.clone()).unwrap();

        backend.write_proxy_settings(&socks4, true).unwrap();
        assert_eq!(backend.values().proxy_server, "socks5://10.0.0.9:1080");
        assert_eq!(store.identify_active(&backend).as_deref(), Some("legacy"));
    }

    #[test]
    fn test_set_active_fires_event() {
        let (_dir, store) = store();
        let backend = MemoryBackend::new();
        store.add_profile("office", direct("10.0.0.1", 8080)).unwrap();

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        store.active_changed().set(move |name| {
            let _ = tx.lock().unwrap().send(name);
        });

        assert!(store.set_active(&backend, "missing").is_err());
        store.set_active(&backend, "office").unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "office");
        assert_eq!(backend.values().proxy_server, "http://10.0.0.1:8080");
    }

    #[test]
    fn test_general_settings_persist() {
        let (dir, store) = store();
        assert!(!store.general(AUTO_MAP_ENABLED_KEY, false));
        store.set_general(AUTO_MAP_ENABLED_KEY, true).unwrap();

        let reopened = ConfigStore::open(dir.path().join("config.json"));
        assert!(reopened.general(AUTO_MAP_ENABLED_KEY, false));
    }
}
