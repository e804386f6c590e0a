// Proxy Control - Background Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Background services for automated operations.
//!
//! This module contains the services that keep the system proxy in sync
//! with the attached network:
//! - Watcher: follows proxy and theme changes made by anyone
//! - Poller: detects network changes
//! - Reconciler: debounced "apply mapping" for the current network
//! - Mapping: network identity to profile table
//! - Notifier: user-visible messages

pub mod debounce;
pub mod events;
pub mod mapping;
pub mod notifier;
pub mod poller;
pub mod reconciler;
pub mod watcher;

pub use events::{ProxyEvents, ThemeEvents};
pub use mapping::{MappingStore, MappingTarget};
pub use notifier::Notifier;
pub use poller::NetworkPoller;
pub use reconciler::Reconciler;
pub use watcher::{ProxyWatch, ThemeWatch, Watcher};
