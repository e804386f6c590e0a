// Proxy Control - Shared Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Proxy Control Models
//!
//! Value types shared by the stores, the reconciler and the system backends:
//!
//! - **Network**: the (gateway MAC, SSID) identity of the attached network
//! - **Proxy**: direct and gateway-following proxy profiles
//! - **Profile**: named profiles in insertion order
//! - **Config**: the persisted configuration file
//! - **Error**: shared error types

pub mod config;
pub mod error;
pub mod network;
pub mod profile;
pub mod proxy;
pub mod validation;

// Re-export main types for convenience
pub use config::ConfigFile;
pub use error::{Error, Result};
pub use network::NetworkIdentity;
pub use profile::NamedProfile;
pub use proxy::{DirectProxy, GatewayProxy, ProxyProfile, ProxyProtocol};

/// Human-readable application name.
pub const APP_NAME: &str = "Proxy Control";

/// Configuration directory name (under XDG_CONFIG_HOME).
pub const CONFIG_DIR_NAME: &str = "proxy-control";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.json";
