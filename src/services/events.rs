// Proxy Control - Event Slots
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Single-subscriber event slots.
//!
//! Each observable field has one slot. Setting a slot replaces the previous
//! subscriber (last writer wins); an unset slot drops events.

use std::sync::{Arc, RwLock};
use std::thread;
use tracing::{trace, warn};

use crate::models::ProxyProtocol;
use crate::sync::{read, write};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A replaceable callback for one field.
pub struct CallbackSlot<T> {
    name: &'static str,
    callback: RwLock<Option<Callback<T>>>,
}

impl<T: Send + 'static> CallbackSlot<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            callback: RwLock::new(None),
        }
    }

    /// Install `f`, replacing any previous subscriber.
    pub fn set<F>(&self, f: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *write(&self.callback, self.name) = Some(Arc::new(f));
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        *write(&self.callback, self.name) = None;
    }

    #[allow(dead_code)]
    pub fn is_set(&self) -> bool {
        read(&self.callback, self.name).is_some()
    }

    /// Invoke the subscriber on its own thread.
    pub fn emit(&self, value: T) {
        let Some(callback) = read(&self.callback, self.name).clone() else {
            return;
        };

        trace!("Dispatching {}", self.name);
        let spawned = thread::Builder::new()
            .name(format!("on-{}", self.name))
            .spawn(move || callback(value));
        if let Err(e) = spawned {
            warn!("Failed to dispatch {}: {}", self.name, e);
        }
    }

    /// Invoke the subscriber on the calling thread.
    pub fn call(&self, value: T) {
        let callback = read(&self.callback, self.name).clone();
        if let Some(callback) = callback {
            callback(value);
        }
    }
}

impl<T> std::fmt::Debug for CallbackSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Field-level change events of the live proxy settings.
#[derive(Debug)]
pub struct ProxyEvents {
    pub enabled: CallbackSlot<bool>,
    pub protocol: CallbackSlot<Option<ProxyProtocol>>,
    pub host: CallbackSlot<Option<String>>,
    pub port: CallbackSlot<Option<u16>>,
    pub bypass_list: CallbackSlot<Vec<String>>,
    pub follow_gateway: CallbackSlot<bool>,
}

impl Default for ProxyEvents {
    fn default() -> Self {
        Self {
            enabled: CallbackSlot::new("enabled-changed"),
            protocol: CallbackSlot::new("protocol-changed"),
            host: CallbackSlot::new("host-changed"),
            port: CallbackSlot::new("port-changed"),
            bypass_list: CallbackSlot::new("bypass-list-changed"),
            follow_gateway: CallbackSlot::new("follow-gateway-changed"),
        }
    }
}

/// OS theme change events.
#[derive(Debug)]
pub struct ThemeEvents {
    pub window: CallbackSlot<bool>,
    pub taskbar: CallbackSlot<bool>,
}

impl Default for ThemeEvents {
    fn default() -> Self {
        Self {
            window: CallbackSlot::new("window-theme-changed"),
            taskbar: CallbackSlot::new("taskbar-theme-changed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_unset_slot_is_noop() {
        let slot: CallbackSlot<bool> = CallbackSlot::new("test");
        assert!(!slot.is_set());
        slot.emit(true);
        slot.call(false);
    }

    #[test]
    fn test_emit_runs_on_other_thread() {
        let slot = CallbackSlot::new("test");
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        slot.set(move |v: u16| {
            let name = thread::current().name().map(str::to_string);
            let _ = tx.lock().unwrap().send((v, name));
        });

        slot.emit(8080);
        let (value, name) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(value, 8080);
        assert_eq!(name.as_deref(), Some("on-test"));
    }

    #[test]
    fn test_last_writer_wins() {
        let slot = CallbackSlot::new("test");
        let (tx, rx) = mpsc::channel();
        let first = std::sync::Mutex::new(tx.clone());
        let second = std::sync::Mutex::new(tx);
        slot.set(move |_: ()| {
            let _ = first.lock().unwrap().send("first");
        });
        slot.set(move |_: ()| {
            let _ = second.lock().unwrap().send("second");
        });

        slot.call(());
        assert_eq!(rx.try_recv().unwrap(), "second");
        assert!(rx.try_recv().is_err());

        slot.clear();
        slot.call(());
        assert!(rx.try_recv().is_err());
    }
}
