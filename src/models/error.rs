// Proxy Control - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the Proxy Control application.

use thiserror::Error;

/// Result type alias for Proxy Control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Proxy Control operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Profile Errors
    // ========================================
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Profile already exists: {0}")]
    ProfileAlreadyExists(String),

    #[error("Invalid profile name: {0:?}")]
    InvalidProfileName(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    // ========================================
    // Mapping Errors
    // ========================================
    #[error("No mapping for network: {0}")]
    MappingNotFound(String),

    // ========================================
    // System State Errors
    // ========================================
    #[error("Malformed proxy URL: {0:?}")]
    MalformedProxyUrl(String),

    #[error("Malformed system value: {key} = {value:?}")]
    MalformedValue { key: String, value: String },

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Backend not supported on this system: {0}")]
    BackendNotSupported(String),

    #[error("Command failed: {command} - {reason}")]
    CommandFailed { command: String, reason: String },

    // ========================================
    // Storage Errors
    // ========================================
    #[error("Failed to read configuration: {0}")]
    ConfigReadFailed(String),

    #[error("Failed to write configuration: {0}")]
    ConfigWriteFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    // ========================================
    // System Errors
    // ========================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new command failed error.
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create a new malformed value error.
    pub fn malformed_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedValue {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Unknown profile or mapping key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProfileNotFound(_) | Self::MappingNotFound(_))
    }

    /// Duplicate name on add.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::ProfileAlreadyExists(_))
    }

    /// Unparseable external state or corrupt configuration.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MalformedProxyUrl(_) | Self::MalformedValue { .. } | Self::ConfigParseFailed(_)
        )
    }

    /// No network or no gateway reachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_predicates() {
        assert!(Error::ProfileNotFound("a".into()).is_not_found());
        assert!(Error::MappingNotFound("Home".into()).is_not_found());
        assert!(Error::ProfileAlreadyExists("a".into()).is_already_exists());
        assert!(Error::MalformedProxyUrl("ftp://x".into()).is_malformed());
        assert!(Error::malformed_value("mode", "'weird'").is_malformed());
        assert!(Error::Unavailable("no gateway".into()).is_unavailable());
        assert!(!Error::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_json_error_is_parse_failure() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, Error::ConfigParseFailed(_)));
        assert!(err.is_malformed());
    }
}
