// Proxy Control - Proxy Profiles
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Proxy profile types.
//!
//! A profile either points at a fixed host or follows whatever the current
//! default gateway is. Profiles serialize to the persisted `ProfileObject`
//! shape, discriminated by `proxyType`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;

use super::error::{Error, Result};

/// Grammar of the single proxy URL kept by the OS.
static PROXY_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<protocol>[a-z0-9]+)://(?:\[(?P<ipv6>[^\]]+)\]|(?P<host>[^:/\[\]]+)):(?P<port>\d+)$",
    )
        .expect("Proxy URL regex should compile")
});

/// Delimiter of the bypass list on the wire.
pub const BYPASS_DELIMITER: char = ';';

/// Proxy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
    /// SOCKS5 with remote DNS resolution. Not available on Windows.
    Socks5h,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
            Self::Socks5h => "socks5h",
        }
    }

    /// Protocols accepted on this platform.
    pub fn allowed() -> &'static [ProxyProtocol] {
        if cfg!(windows) {
            &[Self::Http, Self::Https, Self::Socks4, Self::Socks5]
        } else {
            &[Self::Http, Self::Https, Self::Socks4, Self::Socks5, Self::Socks5h]
        }
    }

    pub fn is_supported(&self) -> bool {
        Self::allowed().contains(self)
    }

    /// Fold every SOCKS version onto `socks5`.
    pub fn without_socks_version(self) -> Self {
        match self {
            Self::Socks4 | Self::Socks5 | Self::Socks5h => Self::Socks5,
            other => other,
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let protocol = match s {
            "http" => Self::Http,
            "https" => Self::Https,
            "socks4" => Self::Socks4,
            "socks5" => Self::Socks5,
            "socks5h" => Self::Socks5h,
            other => return Err(Error::UnsupportedProtocol(other.to_string())),
        };
        if !protocol.is_supported() {
            return Err(Error::UnsupportedProtocol(s.to_string()));
        }
        Ok(protocol)
    }
}

/// Proxy pointing at a fixed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectProxy {
    #[serde(rename = "proto")]
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    #[serde(rename = "noProxyies", default)]
    pub bypass_list: Vec<String>,
}

impl DirectProxy {
    pub fn new(protocol: ProxyProtocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            bypass_list: Vec::new(),
        }
    }

    pub fn with_bypass(mut self, bypass_list: Vec<String>) -> Self {
        self.bypass_list = bypass_list;
        self
    }

    /// The `scheme://host:port` form written to the OS. IPv6 literals are
    /// bracketed.
    pub fn url(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("{}://[{}]:{}", self.protocol, self.host, self.port)
        } else {
            format!("{}://{}:{}", self.protocol, self.host, self.port)
        }
    }

    /// Parse the OS representation: a proxy URL and a `;`-joined bypass list.
    pub fn from_system(url: &str, bypass: &str) -> Result<Self> {
        let (protocol, host, port) = split_url(url)?;
        Ok(Self {
            protocol,
            host,
            port,
            bypass_list: split_bypass_list(bypass),
        })
    }

    pub fn bypass_string(&self) -> String {
        join_bypass_list(&self.bypass_list)
    }
}

/// Proxy whose host is the default gateway at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayProxy {
    #[serde(rename = "proto")]
    pub protocol: ProxyProtocol,
    pub port: u16,
    #[serde(rename = "noProxyies", default)]
    pub bypass_list: Vec<String>,
}

impl GatewayProxy {
    pub fn new(protocol: ProxyProtocol, port: u16) -> Self {
        Self {
            protocol,
            port,
            bypass_list: Vec::new(),
        }
    }

    pub fn with_bypass(mut self, bypass_list: Vec<String>) -> Self {
        self.bypass_list = bypass_list;
        self
    }
}

/// A proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "proxyType")]
pub enum ProxyProfile {
    /// Fixed `host:port`.
    #[serde(rename = "SpecificProxy")]
    Direct(DirectProxy),
    /// Host resolved to the current default gateway.
    #[serde(rename = "GatewayProxy")]
    FollowGateway(GatewayProxy),
}

impl ProxyProfile {
    pub fn protocol(&self) -> ProxyProtocol {
        match self {
            Self::Direct(p) => p.protocol,
            Self::FollowGateway(p) => p.protocol,
        }
    }

    /// Resolve to concrete settings. A gateway-following profile needs the
    /// current default gateway; without one it is [`Error::Unavailable`].
    pub fn resolve(&self, gateway: Option<IpAddr>) -> Result<DirectProxy> {
        match self {
            Self::Direct(p) => Ok(p.clone()),
            Self::FollowGateway(p) => {
                let gateway = gateway.ok_or_else(|| {
                    Error::Unavailable("no default gateway to follow".to_string())
                })?;
                Ok(DirectProxy {
                    protocol: p.protocol,
                    host: gateway.to_string(),
                    port: p.port,
                    bypass_list: p.bypass_list.clone(),
                })
            }
        }
    }

    /// Whether the live system settings are what this profile would apply.
    pub fn matches_live(&self, live: &DirectProxy, gateway: Option<IpAddr>) -> bool {
        self.resolve(gateway).map(|p| &p == live).unwrap_or(false)
    }

    /// [`ProxyProfile::matches_live`] for a store that does not keep the
    /// SOCKS version.
    pub fn matches_live_unversioned(&self, live: &DirectProxy, gateway: Option<IpAddr>) -> bool {
        let Ok(mut resolved) = self.resolve(gateway) else {
            return false;
        };
        resolved.protocol = resolved.protocol.without_socks_version();
        let mut live = live.clone();
        live.protocol = live.protocol.without_socks_version();
        resolved == live
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Direct(p) => p.url(),
            Self::FollowGateway(p) => format!("{}://<gateway>:{}", p.protocol, p.port),
        }
    }
}

impl From<DirectProxy> for ProxyProfile {
    fn from(p: DirectProxy) -> Self {
        Self::Direct(p)
    }
}

impl From<GatewayProxy> for ProxyProfile {
    fn from(p: GatewayProxy) -> Self {
        Self::FollowGateway(p)
    }
}

/// Split a `scheme://host:port` URL.
pub fn split_url(url: &str) -> Result<(ProxyProtocol, String, u16)> {
    let caps = PROXY_URL_REGEX
        .captures(url)
        .ok_or_else(|| Error::MalformedProxyUrl(url.to_string()))?;
    let protocol = caps["protocol"]
        .parse::<ProxyProtocol>()
        .map_err(|_| Error::MalformedProxyUrl(url.to_string()))?;
    let port = caps["port"]
        .parse::<u16>()
        .map_err(|_| Error::MalformedProxyUrl(url.to_string()))?;
    let host = match (caps.name("ipv6"), caps.name("host")) {
        (Some(v6), _) => v6
            .as_str()
            .parse::<Ipv6Addr>()
            .map_err(|_| Error::MalformedProxyUrl(url.to_string()))?
            .to_string(),
        (None, Some(host)) => host.as_str().to_string(),
        (None, None) => return Err(Error::MalformedProxyUrl(url.to_string())),
    };
    Ok((protocol, host, port))
}

/// Split the wire form of a bypass list. An empty string is an empty list.
pub fn split_bypass_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(BYPASS_DELIMITER).map(|p| p.to_string()).collect()
}

pub fn join_bypass_list(list: &[String]) -> String {
    list.join(&BYPASS_DELIMITER.to_string())
}
