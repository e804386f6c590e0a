// Proxy Control - Application Context
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Application root object and lifecycle wiring.
//!
//! Owns every process-wide piece of state: the stores, the selected system
//! backend, the reconciler, the poller and both watchers. Construction
//! follows a fixed order; `start` and `shutdown` bracket the background
//! services.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::models::config::{AUTO_MAP_ENABLED_KEY, SHOW_NOTIFICATIONS_KEY};
use crate::models::proxy::{split_bypass_list, split_url};
use crate::models::{
    DirectProxy, Error, GatewayProxy, NetworkIdentity, ProxyProfile, Result, APP_NAME,
};
use crate::services::notifier;
use crate::services::reconciler::APPLY_MAPPING_DELAY;
use crate::services::{
    MappingStore, MappingTarget, NetworkPoller, Notifier, ProxyEvents, ProxyWatch, Reconciler,
    ThemeEvents, ThemeWatch, Watcher,
};
use crate::storage::ConfigStore;
use crate::system::{self, ProxySettings, SystemState};

/// Host placeholder selecting a gateway-following profile in a proxy URL.
pub const GATEWAY_HOST: &str = "gateway";

/// Delays of the background services.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Debounce window of "apply mapping".
    pub reconcile_delay: Duration,
    /// One second of poll interval.
    pub tick_unit: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconcile_delay: APPLY_MAPPING_DELAY,
            tick_unit: Duration::from_secs(1),
        }
    }
}

/// Snapshot for the `status` command.
#[derive(Debug, Clone)]
pub struct Status {
    pub backend: &'static str,
    pub config_path: PathBuf,
    pub proxy: Option<ProxySettings>,
    pub active_profile: Option<String>,
    pub network: Option<NetworkIdentity>,
    pub auto_map: bool,
    pub mappings: usize,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backend:  {}", self.backend)?;
        writeln!(f, "Config:   {}", self.config_path.display())?;
        match &self.proxy {
            Some(settings) => {
                let state = if settings.enabled { "enabled" } else { "disabled" };
                match &settings.proxy {
                    Some(proxy) => writeln!(f, "Proxy:    {} ({})", proxy.url(), state)?,
                    None => writeln!(f, "Proxy:    not configured ({})", state)?,
                }
            }
            None => writeln!(f, "Proxy:    unreadable")?,
        }
        writeln!(
            f,
            "Profile:  {}",
            self.active_profile.as_deref().unwrap_or("-")
        )?;
        match &self.network {
            Some(network) => writeln!(f, "Network:  {}", network)?,
            None => writeln!(f, "Network:  unknown")?,
        }
        writeln!(f, "Auto-map: {}", if self.auto_map { "on" } else { "off" })?;
        write!(f, "Mappings: {}", self.mappings)
    }
}

/// The application context.
pub struct Application {
    config: Arc<ConfigStore>,
    mappings: Arc<MappingStore>,
    system: Arc<dyn SystemState>,
    reconciler: Arc<Reconciler>,
    poller: NetworkPoller,
    proxy_watcher: Watcher<ProxyWatch>,
    theme_watcher: Watcher<ThemeWatch>,
}

impl Application {
    /// Build the context for this machine.
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config = match config_path {
            Some(path) => ConfigStore::open(path),
            None => ConfigStore::open_default(),
        };
        let notifier = notifier::for_settings(config.general(SHOW_NOTIFICATIONS_KEY, true));
        Self::assemble(config, system::detect(), notifier, Timing::default())
    }

    /// Wire the context around an opened store and a chosen backend.
    pub fn assemble(
        config: ConfigStore,
        system: Arc<dyn SystemState>,
        notifier: Arc<dyn Notifier>,
        timing: Timing,
    ) -> Self {
        let config = Arc::new(config);
        let mappings = Arc::new(MappingStore::load(Arc::clone(&config)));

        config.identify_active(&*system);

        let reconciler = Arc::new(Reconciler::with_delay(
            Arc::clone(&system),
            Arc::clone(&config),
            Arc::clone(&mappings),
            notifier,
            timing.reconcile_delay,
        ));
        reconciler.refresh_identity();

        let poller = NetworkPoller::with_tick_unit(
            Arc::clone(&system),
            Arc::clone(&config),
            Arc::clone(&reconciler),
            timing.tick_unit,
        );
        let proxy_watcher = Watcher::new(
            ProxyWatch::new(Arc::new(ProxyEvents::default())),
            Arc::clone(&system),
        );
        let theme_watcher = Watcher::new(
            ThemeWatch::new(Arc::new(ThemeEvents::default())),
            Arc::clone(&system),
        );

        Self {
            config,
            mappings,
            system,
            reconciler,
            poller,
            proxy_watcher,
            theme_watcher,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the watchers and, if auto-map is on, the poller.
    pub fn start(&self) {
        info!("{} starting with {} backend", APP_NAME, self.system.name());

        if let Err(e) = self.proxy_watcher.start() {
            error!("Failed to start proxy watcher: {}", e);
        }
        if let Err(e) = self.theme_watcher.start() {
            warn!("Failed to start theme watcher: {}", e);
        }

        if self.config.general(AUTO_MAP_ENABLED_KEY, false) {
            self.reconciler.apply_mapping(false);
            self.poller.start(false);
        }
    }

    /// Stop all background services. The auto-map flag is kept.
    pub fn shutdown(&self) {
        self.reconciler.cancel();
        self.poller.shutdown();
        self.proxy_watcher.stop();
        self.theme_watcher.stop();
        info!("Stopped gracefully");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn mappings(&self) -> &Arc<MappingStore> {
        &self.mappings
    }

    /// Proxy field events; subscribers may be set at any time.
    pub fn proxy_events(&self) -> &Arc<ProxyEvents> {
        self.proxy_watcher.target().events()
    }

    pub fn theme_events(&self) -> &Arc<ThemeEvents> {
        self.theme_watcher.target().events()
    }

    pub fn status(&self) -> Status {
        Status {
            backend: self.system.name(),
            config_path: self.config.path().to_path_buf(),
            proxy: self.system.read_proxy_settings().ok(),
            active_profile: self.config.active(),
            network: self.reconciler.last_identity(),
            auto_map: self.poller.is_active(),
            mappings: self.mappings.len(),
        }
    }

    // ========================================================================
    // Manual controls
    // ========================================================================

    /// Flip the system proxy on or off. Returns the new state.
    pub fn toggle_proxy(&self) -> Result<bool> {
        let enabled = !self.system.read_proxy_settings()?.enabled;
        self.system.set_proxy_enabled(enabled)?;
        info!("Proxy {}", if enabled { "enabled" } else { "disabled" });
        Ok(enabled)
    }

    /// Reconcile against a fresh read of the network.
    pub fn apply_mapping(&self) {
        self.reconciler.apply_mapping(true);
    }

    /// Apply a stored profile and mark it active.
    pub fn use_profile(&self, name: &str) -> Result<()> {
        self.config.set_active(&*self.system, name)
    }

    /// Turn automatic mapping on or off, persisting the choice.
    pub fn set_auto_map(&self, enabled: bool) {
        if enabled {
            self.poller.start(true);
        } else {
            self.poller.stop();
        }
    }

    pub fn set_check_interval(&self, seconds: u64) -> Result<()> {
        self.poller.set_check_interval(seconds)
    }

    // ========================================================================
    // Profiles and mappings
    // ========================================================================

    pub fn add_profile(&self, name: &str, profile: ProxyProfile) -> Result<()> {
        self.config.add_profile(name, profile)
    }

    pub fn update_profile(&self, old_name: &str, new_name: &str, profile: ProxyProfile) -> Result<()> {
        self.config
            .update_profile(&*self.system, old_name, new_name, profile)
    }

    pub fn remove_profile(&self, name: &str) -> Result<()> {
        self.config.remove_profile(name)
    }

    /// Key for the attached network: its SSID when wireless, its gateway
    /// when wired.
    pub fn current_network_key(&self) -> Result<NetworkIdentity> {
        let identity = match self.reconciler.last_identity() {
            Some(identity) => identity,
            None => self.system.read_network_identity()?,
        };
        Ok(match identity.ssid() {
            Some(ssid) => NetworkIdentity::wildcard(ssid),
            None => identity,
        })
    }

    /// Map the attached network to a profile, or to "disabled".
    pub fn map_current(&self, target: MappingTarget) -> Result<NetworkIdentity> {
        if let Some(name) = target.profile_name() {
            if !self.config.contains(name) {
                return Err(Error::ProfileNotFound(name.to_string()));
            }
        }
        let key = self.current_network_key()?;
        self.mappings.add(key.clone(), target)?;
        Ok(key)
    }

    pub fn unmap_current(&self) -> Result<NetworkIdentity> {
        let key = self.current_network_key()?;
        self.mappings.remove(&key)?;
        Ok(key)
    }
}

/// Parse `scheme://host:port` plus an optional `;`-joined bypass list into
/// a profile. The host `gateway` selects a gateway-following profile.
pub fn parse_profile(url: &str, bypass: Option<&str>) -> Result<ProxyProfile> {
    let (protocol, host, port) = split_url(url)?;
    let bypass_list = split_bypass_list(bypass.unwrap_or_default());
    Ok(if host == GATEWAY_HOST {
        GatewayProxy::new(protocol, port)
            .with_bypass(bypass_list)
            .into()
    } else {
        DirectProxy::new(protocol, host, port)
            .with_bypass(bypass_list)
            .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyProtocol;
    use crate::services::notifier::testing::RecordingNotifier;
    use crate::system::MemoryBackend;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    const FAST: Timing = Timing {
        reconcile_delay: Duration::from_millis(50),
        tick_unit: Duration::from_millis(20),
    };

    fn app_with(
        setup: impl FnOnce(&ConfigStore),
    ) -> (TempDir, MemoryBackend, Arc<RecordingNotifier>, Application) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::open(dir.path().join("config.json"));
        setup(&config);

        let backend = MemoryBackend::new();
        backend.set_connected(true);
        backend.set_network(Some(NetworkIdentity::wildcard("OfficeWifi")), None);

        let notifier = Arc::new(RecordingNotifier::default());
        let app = Application::assemble(
            config,
            Arc::new(backend.clone()),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            FAST,
        );
        (dir, backend, notifier, app)
    }

    /// Poll `condition` until it holds or `timeout` passes.
    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn office(config: &ConfigStore) {
        config
            .add_profile("office", parse_profile("http://10.0.0.1:8080", None).unwrap())
            .unwrap();
    }

    #[test]
    fn test_init_records_identity() {
        let (_dir, _backend, _notifier, app) = app_with(office);
        assert_eq!(
            app.status().network,
            Some(NetworkIdentity::wildcard("OfficeWifi"))
        );
        assert_eq!(app.config().active(), None);
    }

    #[test]
    fn test_start_without_auto_map() {
        let (_dir, _backend, notifier, app) = app_with(office);
        app.start();
        assert!(!app.status().auto_map);
        // Several debounce windows pass without a reconciliation.
        assert!(!wait_until(Duration::from_millis(300), || {
            !notifier.messages().is_empty()
        }));
        app.shutdown();
    }

    #[test]
    fn test_start_with_auto_map_reconciles_and_keeps_flag() {
        let (_dir, backend, notifier, app) = app_with(|config| {
            office(config);
            config.set_general(AUTO_MAP_ENABLED_KEY, true).unwrap();
        });
        app.map_current(MappingTarget::Profile("office".into())).unwrap();

        app.start();
        assert!(app.status().auto_map);
        assert!(wait_until(Duration::from_secs(5), || {
            backend.values().proxy_enable == 1
        }));
        assert_eq!(notifier.messages().len(), 1);

        app.shutdown();
        assert!(!app.status().auto_map);
        assert!(app.config().general(AUTO_MAP_ENABLED_KEY, false));
    }

    #[test]
    fn test_proxy_events_reach_subscriber() {
        let (_dir, _backend, _notifier, app) = app_with(office);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        app.proxy_events().enabled.set(move |v| {
            let _ = tx.lock().unwrap().send(v);
        });

        app.start();
        assert!(app.toggle_proxy().unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        assert!(!app.toggle_proxy().unwrap());
        assert!(!rx.recv_timeout(Duration::from_secs(2)).unwrap());
        app.shutdown();
    }

    #[test]
    fn test_ipv6_profile_keeps_watcher_alive() {
        let (_dir, backend, _notifier, app) = app_with(office);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        app.proxy_events().host.set(move |v| {
            let _ = tx.lock().unwrap().send(v);
        });
        app.start();

        app.add_profile("v6", parse_profile("http://[::1]:8080", None).unwrap())
            .unwrap();
        app.use_profile("v6").unwrap();
        assert_eq!(backend.values().proxy_server, "http://[::1]:8080");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(),
            Some("::1")
        );

        assert!(app.toggle_proxy().unwrap());
        app.use_profile("office").unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(),
            Some("10.0.0.1")
        );
        app.shutdown();
    }

    #[test]
    fn test_use_profile_marks_active() {
        let (_dir, backend, _notifier, app) = app_with(office);
        assert!(app.use_profile("missing").unwrap_err().is_not_found());
        app.use_profile("office").unwrap();
        assert_eq!(app.config().active().as_deref(), Some("office"));
        assert_eq!(backend.values().proxy_server, "http://10.0.0.1:8080");
    }

    #[test]
    fn test_map_and_unmap_current() {
        let (_dir, _backend, _notifier, app) = app_with(office);
        assert!(app
            .map_current(MappingTarget::Profile("nope".into()))
            .unwrap_err()
            .is_not_found());

        let key = app.map_current(MappingTarget::Disabled).unwrap();
        assert_eq!(key, NetworkIdentity::wildcard("OfficeWifi"));
        assert_eq!(app.mappings().get(&key), Some(MappingTarget::Disabled));

        app.unmap_current().unwrap();
        assert!(app.unmap_current().unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_auto_map_persists() {
        let (_dir, _backend, _notifier, app) = app_with(office);
        app.set_auto_map(true);
        assert!(app.status().auto_map);
        assert!(app.config().general(AUTO_MAP_ENABLED_KEY, false));
        app.set_auto_map(false);
        assert!(!app.status().auto_map);
        assert!(!app.config().general(AUTO_MAP_ENABLED_KEY, true));
    }

    #[test]
    fn test_parse_profile() {
        assert_eq!(
            parse_profile("socks5://gateway:1080", Some("localhost;*.lan")).unwrap(),
            ProxyProfile::from(
                GatewayProxy::new(ProxyProtocol::Socks5, 1080)
                    .with_bypass(vec!["localhost".into(), "*.lan".into()])
            )
        );
        assert!(parse_profile("10.0.0.1:8080", None).unwrap_err().is_malformed());
    }
}
