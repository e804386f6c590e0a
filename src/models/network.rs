// Proxy Control - Network Identity
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Network identity: the (gateway hardware address, SSID) pair that tells
//! one network attachment apart from another.
//!
//! The text form is used as the key of the persisted mapping table, whose
//! backing store only supports string keys:
//!
//! - `"{ssid} | {mac}"` for a wireless network (`mac` may be empty)
//! - `"{mac}"` for a wired network (no separator at all)
//! - `""` for a wired network whose gateway address is unknown

use std::fmt;

/// Separator between SSID and hardware address in the text form.
pub const IDENTITY_SEPARATOR: &str = " | ";

/// A distinguishable network attachment point.
///
/// `ssid == None` denotes a wired connection. `hardware_address == None`
/// means "match by SSID only". Empty strings are never stored; they are
/// normalized to `None` on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkIdentity {
    hardware_address: Option<String>,
    ssid: Option<String>,
}

impl NetworkIdentity {
    /// Create a new identity.
    pub fn new(hardware_address: Option<String>, ssid: Option<String>) -> Self {
        Self {
            hardware_address: hardware_address.filter(|s| !s.is_empty()),
            ssid: ssid.filter(|s| !s.is_empty()),
        }
    }

    /// Identity matching any gateway on the given SSID.
    pub fn wildcard(ssid: impl Into<String>) -> Self {
        Self::new(None, Some(ssid.into()))
    }

    /// Wireless network name; `None` for a wired connection.
    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    #[allow(dead_code)]
    pub fn is_wired(&self) -> bool {
        self.ssid.is_none()
    }

    /// Whether this entry ignores the gateway address.
    pub fn is_wildcard(&self) -> bool {
        self.hardware_address.is_none()
    }

    /// Encode to the persisted text form.
    pub fn to_text(&self) -> String {
        let mac = self.hardware_address.as_deref().unwrap_or_default();
        match &self.ssid {
            Some(ssid) => format!("{}{}{}", ssid, IDENTITY_SEPARATOR, mac),
            None => mac.to_string(),
        }
    }

    /// Decode from the persisted text form.
    ///
    /// The split happens on the last separator so an SSID may itself
    /// contain `" | "`; hardware addresses never do.
    pub fn from_text(text: &str) -> Self {
        match text.rsplit_once(IDENTITY_SEPARATOR) {
            Some((ssid, mac)) => Self::new(Some(mac.to_string()), Some(ssid.to_string())),
            None => Self::new(Some(text.to_string()), None),
        }
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.ssid, &self.hardware_address) {
            (Some(ssid), Some(mac)) => write!(f, "{} ({})", ssid, mac),
            (Some(ssid), None) => write!(f, "{}", ssid),
            (None, Some(mac)) => write!(f, "Wired connection ({})", mac),
            (None, None) => write!(f, "Wired connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_strings_normalize_to_none() {
        let id = NetworkIdentity::new(Some(String::new()), Some(String::new()));
        assert_eq!(id, NetworkIdentity::default());
        assert!(id.is_wired());
        assert!(id.is_wildcard());
    }

    #[test]
    fn test_text_forms() {
        let wifi = NetworkIdentity::new(Some("aa:bb".into()), Some("Home".into()));
        assert_eq!(wifi.to_text(), "Home | aa:bb");

        let wildcard = NetworkIdentity::wildcard("Home");
        assert_eq!(wildcard.to_text(), "Home | ");

        let wired = NetworkIdentity::new(Some("aa:bb".into()), None);
        assert_eq!(wired.to_text(), "aa:bb");

        assert_eq!(NetworkIdentity::default().to_text(), "");
    }

    #[test]
    fn test_decode_edge_cases() {
        assert_eq!(NetworkIdentity::from_text(""), NetworkIdentity::default());
        assert_eq!(
            NetworkIdentity::from_text("Home | "),
            NetworkIdentity::wildcard("Home")
        );
        assert_eq!(
            NetworkIdentity::from_text("a | b | cc:dd"),
            NetworkIdentity::new(Some("cc:dd".into()), Some("a | b".into()))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(NetworkIdentity::default().to_string(), "Wired connection");
        assert_eq!(NetworkIdentity::wildcard("Cafe").to_string(), "Cafe");
    }

    fn identity_strategy() -> impl Strategy<Value = NetworkIdentity> {
        let mac = proptest::option::of("[0-9a-f]{2}(:[0-9a-f]{2}){5}");
        let ssid = proptest::option::of(".{0,32}");
        (mac, ssid).prop_map(|(mac, ssid)| NetworkIdentity::new(mac, ssid))
    }

    proptest! {
        #[test]
        fn prop_text_encoding_is_invertible(id in identity_strategy()) {
            prop_assert_eq!(NetworkIdentity::from_text(&id.to_text()), id);
        }
    }
}
