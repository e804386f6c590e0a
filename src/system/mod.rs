// Proxy Control - System State Access
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Access to OS-level state: proxy settings, network identity and theme.
//!
//! Every backend implements [`SystemState`]. The backend is chosen once at
//! startup by [`detect`]; nothing above this module knows which one is live.

pub mod gnome;
pub mod memory;

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{DirectProxy, NetworkIdentity, ProxyProfile, Result};

pub use gnome::GnomeBackend;
pub use memory::MemoryBackend;

/// Category of observable state, each with its own change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateCategory {
    Proxy,
    Theme,
}

impl StateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Theme => "theme",
        }
    }
}

/// Live proxy settings as kept by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub enabled: bool,
    /// `None` when no proxy server is configured at all.
    pub proxy: Option<DirectProxy>,
}

/// OS theme flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThemeFlags {
    pub window_light: bool,
    pub taskbar_light: bool,
}

/// Outcome of a blocking wait on a change handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The store signalled a change (possibly spurious).
    Changed,
    /// The handle was closed; no further events will arrive.
    Closed,
}

/// Change-notification handle for one [`StateCategory`].
///
/// `close` may be called from any thread while another thread is blocked in
/// `wait`; after it, every in-flight and future `wait` returns
/// [`WatchEvent::Closed`].
pub trait ChangeHandle: Send + Sync {
    fn wait(&self) -> Result<WatchEvent>;
    fn close(&self);
}

/// Query/command capability over OS state. Implementations hold no state
/// of their own beyond what the OS keeps.
pub trait SystemState: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Read the enabled flag and proxy server.
    ///
    /// Fails with a malformed error if the stored URL does not match
    /// `scheme://host:port`.
    fn read_proxy_settings(&self) -> Result<ProxySettings>;

    /// Write server and bypass list, leaving the enabled flag alone.
    /// A gateway-following profile is resolved against the current gateway.
    fn apply_profile(&self, profile: &ProxyProfile) -> Result<()>;

    /// Whether a SOCKS proxy reads back with the version it was written
    /// with.
    fn keeps_socks_version(&self) -> bool {
        true
    }

    /// Turn the system proxy on or off.
    fn set_proxy_enabled(&self, enabled: bool) -> Result<()>;

    /// Write a profile and the enabled flag. Visible system-wide at once.
    fn write_proxy_settings(&self, profile: &ProxyProfile, enabled: bool) -> Result<()> {
        self.apply_profile(profile)?;
        self.set_proxy_enabled(enabled)
    }

    /// Current SSID and gateway hardware address, each optional.
    fn read_network_identity(&self) -> Result<NetworkIdentity>;

    /// Current default gateway, if any.
    fn gateway_address(&self) -> Option<IpAddr>;

    /// Heuristic reachability check. Any failure is `false`.
    fn is_connected(&self) -> bool;

    fn read_theme_flags(&self) -> Result<ThemeFlags>;

    /// Open a change-notification handle for `category`.
    fn watch(&self, category: StateCategory) -> Result<Arc<dyn ChangeHandle>>;
}

/// Select the backend for this machine.
pub fn detect() -> Arc<dyn SystemState> {
    match GnomeBackend::detect() {
        Ok(backend) => {
            info!("Using {} system backend", backend.name());
            Arc::new(backend)
        }
        Err(e) => {
            warn!("No desktop proxy backend available ({}), using in-memory state", e);
            Arc::new(MemoryBackend::new())
        }
    }
}
