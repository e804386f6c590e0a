// Proxy Control - Network Change Poller
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Polls connectivity and the network identity, and schedules a
//! reconciliation whenever the identity changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::reconciler::Reconciler;
use crate::models::config::{AUTO_MAP_ENABLED_KEY, CHECK_INTERVAL_KEY, DEFAULT_CHECK_INTERVAL_SECS};
use crate::models::{NetworkIdentity, Result};
use crate::storage::ConfigStore;
use crate::sync::lock;
use crate::system::SystemState;

/// Network-change poller.
pub struct NetworkPoller {
    system: Arc<dyn SystemState>,
    config: Arc<ConfigStore>,
    reconciler: Arc<Reconciler>,
    active: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Length of one interval second; shortened in tests.
    tick_unit: Duration,
}

impl NetworkPoller {
    pub fn with_tick_unit(
        system: Arc<dyn SystemState>,
        config: Arc<ConfigStore>,
        reconciler: Arc<Reconciler>,
        tick_unit: Duration,
    ) -> Self {
        Self {
            system,
            config,
            reconciler,
            active: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            tick_unit,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Poll interval in seconds, at least 1.
    pub fn check_interval(&self) -> u64 {
        self.config
            .general(CHECK_INTERVAL_KEY, DEFAULT_CHECK_INTERVAL_SECS)
            .max(1)
    }

    /// Persist a new poll interval. Takes effect on the next start.
    pub fn set_check_interval(&self, seconds: u64) -> Result<()> {
        self.config.set_general(CHECK_INTERVAL_KEY, seconds.max(1))
    }

    /// Activate polling, optionally persisting the auto-map flag.
    pub fn start(&self, persist: bool) {
        if persist {
            if let Err(e) = self.config.set_general(AUTO_MAP_ENABLED_KEY, true) {
                error!("Failed to persist auto-map flag: {}", e);
            }
        }
        self.active.store(true, Ordering::SeqCst);

        let mut thread = lock(&self.thread, "poller");
        if thread.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Network poller already running");
            return;
        }
        if let Some(finished) = thread.take() {
            let _ = finished.join();
        }

        let interval = self.tick_unit * u32::try_from(self.check_interval()).unwrap_or(u32::MAX);
        let system = Arc::clone(&self.system);
        let reconciler = Arc::clone(&self.reconciler);
        let active = Arc::clone(&self.active);
        let unit = self.tick_unit;

        let spawned = thread::Builder::new()
            .name("network-poller".to_string())
            .spawn(move || poll(&*system, &reconciler, &active, unit, interval));
        match spawned {
            Ok(handle) => {
                info!("Network poller started (interval {:?})", interval);
                *thread = Some(handle);
            }
            Err(e) => {
                error!("Failed to start network poller: {}", e);
                self.active.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Deactivate polling and persist the auto-map flag as off.
    pub fn stop(&self) {
        if let Err(e) = self.config.set_general(AUTO_MAP_ENABLED_KEY, false) {
            error!("Failed to persist auto-map flag: {}", e);
        }
        self.halt();
    }

    /// Deactivate polling, leaving the persisted flag alone.
    pub fn shutdown(&self) {
        self.halt();
    }

    fn halt(&self) {
        self.active.store(false, Ordering::SeqCst);
        let Some(handle) = lock(&self.thread, "poller").take() else {
            return;
        };
        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("Network poller thread panicked");
        }
        info!("Network poller stopped");
    }
}

impl Drop for NetworkPoller {
    fn drop(&mut self) {
        self.halt();
    }
}

fn poll(
    system: &dyn SystemState,
    reconciler: &Reconciler,
    active: &AtomicBool,
    unit: Duration,
    interval: Duration,
) {
    while active.load(Ordering::SeqCst) {
        if !system.is_connected() {
            debug!("Network disconnected, waiting for connectivity");
            loop {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                if system.is_connected() {
                    break;
                }
                pause(active, unit);
            }
            debug!("Network connectivity restored");
        }

        let current = match system.read_network_identity() {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("Cannot read network identity: {}", e);
                None
            }
        };
        let last = reconciler.last_identity();
        if current != last {
            info!(
                "Network changed: {} -> {}",
                describe(last.as_ref()),
                describe(current.as_ref())
            );
            reconciler.record_identity(current);
            reconciler.apply_mapping(false);
        }

        pause(active, interval);
    }
}

/// Sleep for `duration`, waking early once `active` is cleared and the
/// thread is unparked.
fn pause(active: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while active.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}

fn describe(identity: Option<&NetworkIdentity>) -> String {
    identity.map_or_else(|| "unknown".to_string(), |i| i.to_string())
}
