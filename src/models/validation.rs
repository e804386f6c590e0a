// Proxy Control - Validation Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Input validation utilities for profiles and network identities.

use once_cell::sync::Lazy;
use regex::Regex;
use std::net::IpAddr;
use std::str::FromStr;

use super::error::{Error, Result};
use super::proxy::ProxyProfile;

static PROFILE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\d_]+$").expect("Profile name regex should compile"));

/// Validate a profile name.
///
/// Names are non-empty, do not start with `_` (reserved for sentinels) and
/// consist of word characters only.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('_') || !PROFILE_NAME_REGEX.is_match(name) {
        return Err(Error::InvalidProfileName(name.to_string()));
    }
    Ok(())
}

/// Normalize a MAC address to lowercase, colon-separated form.
///
/// Accepts `AA:BB:CC:DD:EE:FF` and `AA-BB-CC-DD-EE-FF`.
pub fn normalize_mac_address(s: &str) -> Option<String> {
    let normalized = s.trim().replace('-', ":").to_lowercase();
    let parts: Vec<&str> = normalized.split(':').collect();

    if parts.len() != 6 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    if normalized == "00:00:00:00:00:00" {
        return None;
    }

    Some(normalized)
}

/// Validate a proxy host (IP address or hostname).
pub fn validate_host(s: &str) -> Result<()> {
    if IpAddr::from_str(s).is_ok() {
        return Ok(());
    }

    if s.is_empty() || s.len() > 253 {
        return Err(Error::malformed_value("host", s));
    }

    for label in s.split('.') {
        if label.is_empty()
            || label.len() > 63
            || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            || label.starts_with('-')
            || label.ends_with('-')
        {
            return Err(Error::malformed_value("host", s));
        }
    }

    Ok(())
}

/// Validate a profile before it enters the store.
pub fn validate_profile(profile: &ProxyProfile) -> Result<()> {
    if !profile.protocol().is_supported() {
        return Err(Error::UnsupportedProtocol(profile.protocol().to_string()));
    }
    if let ProxyProfile::Direct(p) = profile {
        validate_host(&p.host)?;
    }
    Ok(())
}
