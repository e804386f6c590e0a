// Proxy Control - In-Memory System Backend
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! In-memory system backend.
//!
//! Keeps proxy settings in the registry-style shape (enabled integer, one
//! `scheme://host:port` string, one `;`-joined bypass string) and lets the
//! caller set the network identity, connectivity and theme. Used when no
//! desktop backend is detected, and by tests.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::debug;

use super::{ChangeHandle, ProxySettings, StateCategory, SystemState, ThemeFlags, WatchEvent};
use crate::models::{DirectProxy, Error, NetworkIdentity, ProxyProfile, Result};
use crate::sync::lock;

/// Values held by the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryValues {
    /// `1` when enabled.
    pub proxy_enable: u32,
    /// `scheme://host:port`, or empty when unset.
    pub proxy_server: String,
    /// `;`-joined bypass list.
    pub proxy_override: String,
    /// `None` makes identity reads fail.
    pub identity: Option<NetworkIdentity>,
    pub gateway: Option<IpAddr>,
    pub connected: bool,
    /// `1` when light.
    pub apps_light: u32,
    /// `1` when light.
    pub system_light: u32,
    /// `false` stores every SOCKS proxy as `socks5`.
    pub socks_version: bool,
}

impl Default for MemoryValues {
    fn default() -> Self {
        Self {
            proxy_enable: 0,
            proxy_server: String::new(),
            proxy_override: String::new(),
            identity: Some(NetworkIdentity::default()),
            gateway: None,
            connected: false,
            apps_light: 1,
            system_light: 1,
            socks_version: true,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    values: MemoryValues,
    proxy_generation: u64,
    theme_generation: u64,
}

impl Inner {
    fn generation(&self, category: StateCategory) -> u64 {
        match category {
            StateCategory::Proxy => self.proxy_generation,
            StateCategory::Theme => self.theme_generation,
        }
    }

    fn bump(&mut self, category: StateCategory) {
        match category {
            StateCategory::Proxy => self.proxy_generation += 1,
            StateCategory::Theme => self.theme_generation += 1,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
}

/// In-memory [`SystemState`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }


    /// Snapshot of the current values.
    pub fn values(&self) -> MemoryValues {
        lock(&self.shared.inner, "memory backend").values.clone()
    }

    /// Mutate values, signalling `category` watchers afterwards.
    pub fn update<F>(&self, category: StateCategory, f: F)
    where
        F: FnOnce(&mut MemoryValues),
    {
        let mut inner = lock(&self.shared.inner, "memory backend");
        f(&mut inner.values);
        inner.bump(category);
        self.shared.changed.notify_all();
    }

    pub fn set_network(&self, identity: Option<NetworkIdentity>, gateway: Option<IpAddr>) {
        let mut inner = lock(&self.shared.inner, "memory backend");
        inner.values.identity = identity;
        inner.values.gateway = gateway;
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.shared.inner, "memory backend").values.connected = connected;
    }

    pub fn set_theme(&self, flags: ThemeFlags) {
        self.update(StateCategory::Theme, |v| {
            v.apps_light = u32::from(flags.window_light);
            v.system_light = u32::from(flags.taskbar_light);
        });
    }
}

impl SystemState for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read_proxy_settings(&self) -> Result<ProxySettings> {
        let values = self.values();
        let proxy = if values.proxy_server.is_empty() {
            None
        } else {
            Some(DirectProxy::from_system(
                &values.proxy_server,
                &values.proxy_override,
            )?)
        };
        Ok(ProxySettings {
            enabled: values.proxy_enable == 1,
            proxy,
        })
    }

    fn apply_profile(&self, profile: &ProxyProfile) -> Result<()> {
        let mut resolved = profile.resolve(self.gateway_address())?;
        if !self.keeps_socks_version() {
            resolved.protocol = resolved.protocol.without_socks_version();
        }
        debug!("Writing proxy server {} to memory backend", resolved.url());
        self.update(StateCategory::Proxy, |v| {
            v.proxy_server = resolved.url();
            v.proxy_override = resolved.bypass_string();
        });
        Ok(())
    }

    fn keeps_socks_version(&self) -> bool {
        self.values().socks_version
    }

    fn set_proxy_enabled(&self, enabled: bool) -> Result<()> {
        self.update(StateCategory::Proxy, |v| v.proxy_enable = u32::from(enabled));
        Ok(())
    }

    fn read_network_identity(&self) -> Result<NetworkIdentity> {
        self.values()
            .identity
            .ok_or_else(|| Error::Unavailable("network identity not available".to_string()))
    }

    fn gateway_address(&self) -> Option<IpAddr> {
        self.values().gateway
    }

    fn is_connected(&self) -> bool {
        self.values().connected
    }

    fn read_theme_flags(&self) -> Result<ThemeFlags> {
        let values = self.values();
        Ok(ThemeFlags {
            window_light: values.apps_light == 1,
            taskbar_light: values.system_light == 1,
        })
    }

    fn watch(&self, category: StateCategory) -> Result<Arc<dyn ChangeHandle>> {
        let seen = lock(&self.shared.inner, "memory backend").generation(category);
        Ok(Arc::new(MemoryWatch {
            shared: Arc::clone(&self.shared),
            category,
            seen: AtomicU64::new(seen),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Change handle over the in-memory generation counters.
struct MemoryWatch {
    shared: Arc<Shared>,
    category: StateCategory,
    seen: AtomicU64,
    closed: AtomicBool,
}

impl ChangeHandle for MemoryWatch {
    fn wait(&self) -> Result<WatchEvent> {
        let mut inner = lock(&self.shared.inner, "memory backend");
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(WatchEvent::Closed);
            }
            let generation = inner.generation(self.category);
            if generation != self.seen.load(Ordering::SeqCst) {
                self.seen.store(generation, Ordering::SeqCst);
                return Ok(WatchEvent::Changed);
            }
            inner = self
                .shared
                .changed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Taking the lock orders this notify after any waiter's closed check.
        let _inner = lock(&self.shared.inner, "memory backend");
        self.shared.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GatewayProxy, ProxyProtocol};
    use std::net::Ipv4Addr;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_unset_server_reads_as_none() {
        let backend = MemoryBackend::new();
        let settings = backend.read_proxy_settings().unwrap();
        assert!(!settings.enabled);
        assert!(settings.proxy.is_none());
    }

    #[test]
    fn test_malformed_server_fails_read() {
        let backend = MemoryBackend::new();
        backend.update(StateCategory::Proxy, |v| v.proxy_server = "not a url".into());
        assert!(backend.read_proxy_settings().unwrap_err().is_malformed());
    }

    #[test]
    fn test_write_resolves_gateway() {
        let backend = MemoryBackend::new();
        let profile: ProxyProfile = GatewayProxy::new(ProxyProtocol::Http, 3128)
            .with_bypass(vec!["localhost".into(), "*.lan".into()])
            .into();

        assert!(backend.write_proxy_settings(&profile, true).unwrap_err().is_unavailable());

        backend.set_network(None, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 0, 1))));
        backend.write_proxy_settings(&profile, true).unwrap();
        let values = backend.values();
        assert_eq!(values.proxy_server, "http://10.1.0.1:3128");
        assert_eq!(values.proxy_override, "localhost;*.lan");
        assert_eq!(values.proxy_enable, 1);
    }

    #[test]
    fn test_ipv6_host_reads_back() {
        let backend = MemoryBackend::new();
        let profile: ProxyProfile = DirectProxy::new(ProxyProtocol::Http, "::1", 8080)
            .with_bypass(vec!["localhost".into()])
            .into();
        backend.write_proxy_settings(&profile, true).unwrap();

        assert_eq!(backend.values().proxy_server, "http://[::1]:8080");
        let settings = backend.read_proxy_settings().unwrap();
        assert!(settings.enabled);
        let live = settings.proxy.unwrap();
        assert!(profile.matches_live(&live, None));
    }

    #[test]
    fn test_watch_sees_change() {
        let backend = MemoryBackend::new();
        let handle = backend.watch(StateCategory::Proxy).unwrap();
        backend.set_proxy_enabled(true).unwrap();
        assert_eq!(handle.wait().unwrap(), WatchEvent::Changed);
    }

    #[test]
    fn test_theme_change_does_not_wake_proxy_watch() {
        let backend = MemoryBackend::new();
        let proxy = backend.watch(StateCategory::Proxy).unwrap();
        backend.set_theme(ThemeFlags::default());

        let closer = Arc::clone(&proxy);
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            closer.close();
        });
        assert_eq!(proxy.wait().unwrap(), WatchEvent::Closed);
        t.join().unwrap();
    }

    #[test]
    fn test_close_unblocks_waiter() {
        let backend = MemoryBackend::new();
        let handle = backend.watch(StateCategory::Theme).unwrap();
        let waiter = Arc::clone(&handle);
        let t = thread::spawn(move || waiter.wait().unwrap());

        thread::sleep(Duration::from_millis(50));
        handle.close();
        assert_eq!(t.join().unwrap(), WatchEvent::Closed);
        // Future waits return at once.
        assert_eq!(handle.wait().unwrap(), WatchEvent::Closed);
    }
}
