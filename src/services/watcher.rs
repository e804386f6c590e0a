// Proxy Control - Change Watchers
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Change watchers over OS state.
//!
//! A [`Watcher`] blocks on a backend change handle in its own thread. On
//! every wake it re-reads the tracked fields, diffs them against the last
//! snapshot and emits one event per changed field. Two targets exist:
//! [`ProxyWatch`] and [`ThemeWatch`].

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::events::{ProxyEvents, ThemeEvents};
use crate::models::{Error, ProxyProtocol, Result};
use crate::sync::lock;
use crate::system::{ChangeHandle, StateCategory, SystemState, ThemeFlags, WatchEvent};

/// What a watcher reads and how it reports differences.
pub trait WatchTarget: Send + Sync + 'static {
    type Snapshot: Clone + PartialEq + Send + std::fmt::Debug + 'static;

    const NAME: &'static str;
    const CATEGORY: StateCategory;

    /// Read every tracked field.
    fn snapshot(&self, system: &dyn SystemState) -> Result<Self::Snapshot>;

    /// Emit an event for each field that differs.
    fn dispatch(&self, previous: &Self::Snapshot, current: &Self::Snapshot);
}

struct Session {
    handle: Arc<dyn ChangeHandle>,
    thread: JoinHandle<()>,
}

/// Stopped/Watching state machine around one [`WatchTarget`].
pub struct Watcher<T: WatchTarget> {
    target: Arc<T>,
    system: Arc<dyn SystemState>,
    running: Arc<AtomicBool>,
    last: Arc<Mutex<Option<T::Snapshot>>>,
    session: Mutex<Option<Session>>,
}

impl<T: WatchTarget> Watcher<T> {
    pub fn new(target: T, system: Arc<dyn SystemState>) -> Self {
        Self {
            target: Arc::new(target),
            system,
            running: Arc::new(AtomicBool::new(false)),
            last: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Whether the monitoring loop is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Last snapshot read by the loop.
    pub fn last_snapshot(&self) -> Option<T::Snapshot> {
        lock(&self.last, T::NAME).clone()
    }

    /// Open a change handle, snapshot the fields and start the loop.
    ///
    /// Starting a watcher whose loop has already died restarts it.
    pub fn start(&self) -> Result<()> {
        let mut session = lock(&self.session, T::NAME);
        if session.is_some() && self.is_running() {
            debug!("{} watcher already running", T::NAME);
            return Ok(());
        }
        if let Some(dead) = session.take() {
            dead.handle.close();
            let _ = dead.thread.join();
        }

        let handle = self.system.watch(T::CATEGORY)?;
        let initial = match self.target.snapshot(&*self.system) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                handle.close();
                return Err(e);
            }
        };
        *lock(&self.last, T::NAME) = Some(initial);

        self.running.store(true, Ordering::SeqCst);
        let thread = {
            let handle = Arc::clone(&handle);
            let target = Arc::clone(&self.target);
            let system = Arc::clone(&self.system);
            let running = Arc::clone(&self.running);
            let last = Arc::clone(&self.last);
            thread::Builder::new()
                .name(format!("{}-watcher", T::NAME))
                .spawn(move || {
                    monitor(&*handle, &*target, &*system, &last);
                    handle.close();
                    running.store(false, Ordering::SeqCst);
                })
        };

        match thread {
            Ok(thread) => {
                info!("{} watcher started", T::NAME);
                *session = Some(Session { handle, thread });
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                handle.close();
                Err(Error::Internal(format!("failed to spawn {} watcher: {}", T::NAME, e)))
            }
        }
    }

    /// Close the change handle and join the loop. Idempotent.
    pub fn stop(&self) {
        let Some(session) = lock(&self.session, T::NAME).take() else {
            return;
        };
        session.handle.close();
        if session.thread.join().is_err() {
            warn!("{} watcher thread panicked", T::NAME);
        }
        self.running.store(false, Ordering::SeqCst);
        info!("{} watcher stopped", T::NAME);
    }
}

impl<T: WatchTarget> Drop for Watcher<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor<T: WatchTarget>(
    handle: &dyn ChangeHandle,
    target: &T,
    system: &dyn SystemState,
    last: &Mutex<Option<T::Snapshot>>,
) {
    loop {
        match handle.wait() {
            Ok(WatchEvent::Closed) => return,
            Ok(WatchEvent::Changed) => {}
            Err(e) => {
                error!("{} watcher failed waiting for changes: {}", T::NAME, e);
                return;
            }
        }

        let current = match target.snapshot(system) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("{} watcher stopped: {}", T::NAME, e);
                return;
            }
        };

        let mut last = lock(last, T::NAME);
        if last.as_ref() != Some(&current) {
            debug!("{} changed: {:?}", T::NAME, current);
            if let Some(previous) = last.as_ref() {
                target.dispatch(previous, &current);
            }
        }
        *last = Some(current);
    }
}

// ============================================================================
// Proxy settings
// ============================================================================

/// Per-field view of the live proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxySnapshot {
    pub enabled: bool,
    pub protocol: Option<ProxyProtocol>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub bypass_list: Vec<String>,
    /// The live host is the current default gateway.
    pub follow_gateway: bool,
}

impl ProxySnapshot {
    pub fn read(system: &dyn SystemState) -> Result<Self> {
        let settings = system.read_proxy_settings()?;
        let gateway = system.gateway_address();
        Ok(match settings.proxy {
            Some(proxy) => Self {
                enabled: settings.enabled,
                follow_gateway: is_gateway(&proxy.host, gateway),
                protocol: Some(proxy.protocol),
                host: Some(proxy.host),
                port: Some(proxy.port),
                bypass_list: proxy.bypass_list,
            },
            None => Self {
                enabled: settings.enabled,
                ..Self::default()
            },
        })
    }
}

fn is_gateway(host: &str, gateway: Option<IpAddr>) -> bool {
    gateway.is_some_and(|gw| host.parse::<IpAddr>().is_ok_and(|h| h == gw))
}

/// Watches proxy settings.
#[derive(Debug, Default)]
pub struct ProxyWatch {
    events: Arc<ProxyEvents>,
}

impl ProxyWatch {
    pub fn new(events: Arc<ProxyEvents>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &Arc<ProxyEvents> {
        &self.events
    }
}

impl WatchTarget for ProxyWatch {
    type Snapshot = ProxySnapshot;

    const NAME: &'static str = "proxy";
    const CATEGORY: StateCategory = StateCategory::Proxy;

    fn snapshot(&self, system: &dyn SystemState) -> Result<ProxySnapshot> {
        ProxySnapshot::read(system)
    }

    fn dispatch(&self, previous: &ProxySnapshot, current: &ProxySnapshot) {
        let events = &self.events;
        if previous.enabled != current.enabled {
            events.enabled.emit(current.enabled);
        }
        if previous.protocol != current.protocol {
            events.protocol.emit(current.protocol);
        }
        if previous.host != current.host {
            events.host.emit(current.host.clone());
        }
        if previous.port != current.port {
            events.port.emit(current.port);
        }
        if previous.bypass_list != current.bypass_list {
            events.bypass_list.emit(current.bypass_list.clone());
        }
        if previous.follow_gateway != current.follow_gateway {
            events.follow_gateway.emit(current.follow_gateway);
        }
    }
}

// ============================================================================
// Theme
// ============================================================================

/// Watches OS theme flags.
#[derive(Debug, Default)]
pub struct ThemeWatch {
    events: Arc<ThemeEvents>,
}

impl ThemeWatch {
    pub fn new(events: Arc<ThemeEvents>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &Arc<ThemeEvents> {
        &self.events
    }
}

impl WatchTarget for ThemeWatch {
    type Snapshot = ThemeFlags;

    const NAME: &'static str = "theme";
    const CATEGORY: StateCategory = StateCategory::Theme;

    fn snapshot(&self, system: &dyn SystemState) -> Result<ThemeFlags> {
        system.read_theme_flags()
    }

    fn dispatch(&self, previous: &ThemeFlags, current: &ThemeFlags) {
        if previous.window_light != current.window_light {
            self.events.window.emit(current.window_light);
        }
        if previous.taskbar_light != current.taskbar_light {
            self.events.taskbar.emit(current.taskbar_light);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DirectProxy, GatewayProxy, ProxyProfile};
    use crate::system::MemoryBackend;
    use std::net::Ipv4Addr;
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn proxy_watcher(backend: &MemoryBackend) -> (Watcher<ProxyWatch>, Arc<ProxyEvents>) {
        let events = Arc::new(ProxyEvents::default());
        let watcher = Watcher::new(
            ProxyWatch::new(Arc::clone(&events)),
            Arc::new(backend.clone()) as Arc<dyn SystemState>,
        );
        (watcher, events)
    }

    #[test]
    fn test_start_stop_idempotent() {
        let backend = MemoryBackend::new();
        let (watcher, _events) = proxy_watcher(&backend);

        watcher.stop();
        watcher.start().unwrap();
        watcher.start().unwrap();
        assert!(watcher.is_running());

        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_only_changed_fields_fire() {
        let backend = MemoryBackend::new();
        let (watcher, events) = proxy_watcher(&backend);
        let (tx, rx) = mpsc::channel();

        let enabled_tx = Mutex::new(tx.clone());
        events.enabled.set(move |v| {
            let _ = enabled_tx.lock().unwrap().send(format!("enabled={}", v));
        });
        let port_tx = Mutex::new(tx);
        events.port.set(move |v| {
            let _ = port_tx.lock().unwrap().send(format!("port={:?}", v));
        });

        watcher.start().unwrap();
        backend.set_proxy_enabled(true).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "enabled=true");

        let profile: ProxyProfile = DirectProxy::new(ProxyProtocol::Http, "10.0.0.1", 8080).into();
        backend.apply_profile(&profile).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "port=Some(8080)");

        // Same values again: nothing differs, nothing fires.
        backend.apply_profile(&profile).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        watcher.stop();
    }

    #[test]
    fn test_follow_gateway_derived_from_gateway() {
        let backend = MemoryBackend::new();
        backend.set_network(None, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
        let (watcher, events) = proxy_watcher(&backend);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        events.follow_gateway.set(move |v| {
            let _ = tx.lock().unwrap().send(v);
        });

        watcher.start().unwrap();
        backend
            .apply_profile(&GatewayProxy::new(ProxyProtocol::Http, 3128).into())
            .unwrap();
        assert!(rx.recv_timeout(TIMEOUT).unwrap());

        backend
            .apply_profile(&DirectProxy::new(ProxyProtocol::Http, "10.0.0.1", 3128).into())
            .unwrap();
        assert!(!rx.recv_timeout(TIMEOUT).unwrap());
        watcher.stop();
    }

    #[test]
    fn test_malformed_read_terminates_loop() {
        let backend = MemoryBackend::new();
        let (watcher, _events) = proxy_watcher(&backend);
        watcher.start().unwrap();

        backend.update(StateCategory::Proxy, |v| v.proxy_server = "garbage".into());
        for _ in 0..100 {
            if !watcher.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!watcher.is_running());

        // An explicit restart picks the watcher back up once state is sane.
        backend.update(StateCategory::Proxy, |v| v.proxy_server.clear());
        watcher.start().unwrap();
        assert!(watcher.is_running());
        watcher.stop();
    }

    #[test]
    fn test_theme_events() {
        let backend = MemoryBackend::new();
        let events = Arc::new(ThemeEvents::default());
        let watcher = Watcher::new(
            ThemeWatch::new(Arc::clone(&events)),
            Arc::new(backend.clone()) as Arc<dyn SystemState>,
        );
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        events.window.set(move |v| {
            let _ = tx.lock().unwrap().send(v);
        });

        watcher.start().unwrap();
        assert_eq!(
            watcher.last_snapshot(),
            Some(ThemeFlags {
                window_light: true,
                taskbar_light: true
            })
        );
        backend.set_theme(ThemeFlags {
            window_light: false,
            taskbar_light: true,
        });
        assert!(!rx.recv_timeout(TIMEOUT).unwrap());
        watcher.stop();
    }
}
