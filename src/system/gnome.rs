// Proxy Control - GNOME System Backend
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! GNOME backend.
//!
//! Proxy and theme settings live in GSettings (`org.gnome.system.proxy*`,
//! `org.gnome.desktop.interface`) and are read and written with the
//! `gsettings` tool. Change notification follows the dconf directory that
//! backs each schema through a `dconf watch` child process.

use std::io::{BufRead, BufReader};
use std::iter::Peekable;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::str::Chars;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::{ChangeHandle, ProxySettings, StateCategory, SystemState, ThemeFlags, WatchEvent};
use crate::models::{DirectProxy, Error, NetworkIdentity, ProxyProfile, ProxyProtocol, Result};
use crate::network_utils;
use crate::sync::lock;

const PROXY_SCHEMA: &str = "org.gnome.system.proxy";
const HTTP_SCHEMA: &str = "org.gnome.system.proxy.http";
const HTTPS_SCHEMA: &str = "org.gnome.system.proxy.https";
const SOCKS_SCHEMA: &str = "org.gnome.system.proxy.socks";
const INTERFACE_SCHEMA: &str = "org.gnome.desktop.interface";

const PROXY_DCONF_DIR: &str = "/system/proxy/";
const INTERFACE_DCONF_DIR: &str = "/org/gnome/desktop/interface/";

/// Well-known public DNS endpoint used for the reachability check.
pub const CONNECTIVITY_TARGET: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 53));

pub const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(1);

/// Host schemas in read-back precedence order.
const HOST_SCHEMAS: [(&str, ProxyProtocol); 3] = [
    (HTTP_SCHEMA, ProxyProtocol::Http),
    (HTTPS_SCHEMA, ProxyProtocol::Https),
    // GSettings does not record the SOCKS version.
    (SOCKS_SCHEMA, ProxyProtocol::Socks5),
];

/// GSettings-backed [`SystemState`].
///
/// GSettings keeps one SOCKS host with no version, so every SOCKS proxy
/// reads back as `socks5`. A `socks4` or `socks5h` profile shows up as a
/// protocol change once applied, and active-profile identification
/// compares SOCKS profiles without their version on this backend.
#[derive(Debug, Clone)]
pub struct GnomeBackend {
    reach_target: SocketAddr,
    reach_timeout: Duration,
}

impl GnomeBackend {
    /// Check that the proxy schema and the dconf tool are both present.
    pub fn detect() -> Result<Self> {
        if !cfg!(target_os = "linux") {
            return Err(Error::BackendNotSupported("not a Linux desktop".to_string()));
        }

        // The schema may be missing on non-GNOME desktops.
        let schema_exists = Command::new("gsettings")
            .args(["list-keys", PROXY_SCHEMA])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !schema_exists {
            return Err(Error::BackendNotSupported(format!(
                "{} schema not found",
                PROXY_SCHEMA
            )));
        }

        let dconf_exists = Command::new("dconf")
            .arg("help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok();
        if !dconf_exists {
            return Err(Error::BackendNotSupported("dconf not found".to_string()));
        }

        Ok(Self {
            reach_target: CONNECTIVITY_TARGET,
            reach_timeout: CONNECTIVITY_TIMEOUT,
        })
    }

    fn get(schema: &str, key: &str) -> Result<String> {
        gsettings(&["get", schema, key])
    }

    fn set(schema: &str, key: &str, value: &str) -> Result<()> {
        trace!("gsettings set {} {} {}", schema, key, value);
        gsettings(&["set", schema, key, value]).map(|_| ())
    }

    fn get_string(schema: &str, key: &str) -> Result<String> {
        let raw = Self::get(schema, key)?;
        parse_string(&raw).ok_or_else(|| Error::malformed_value(key, raw))
    }
}

impl SystemState for GnomeBackend {
    fn name(&self) -> &'static str {
        "gnome"
    }

    fn keeps_socks_version(&self) -> bool {
        false
    }

    fn read_proxy_settings(&self) -> Result<ProxySettings> {
        let enabled = Self::get_string(PROXY_SCHEMA, "mode")? == "manual";

        for (schema, protocol) in HOST_SCHEMAS {
            let host = Self::get_string(schema, "host")?;
            if host.is_empty() {
                continue;
            }
            let raw_port = Self::get(schema, "port")?;
            let port = raw_port
                .parse::<u16>()
                .map_err(|_| Error::malformed_value("port", raw_port.as_str()))?;
            let raw_ignore = Self::get(PROXY_SCHEMA, "ignore-hosts")?;
            let bypass_list = parse_string_list(&raw_ignore)
                .ok_or_else(|| Error::malformed_value("ignore-hosts", raw_ignore.as_str()))?;

            return Ok(ProxySettings {
                enabled,
                proxy: Some(DirectProxy::new(protocol, host, port).with_bypass(bypass_list)),
            });
        }

        Ok(ProxySettings { enabled, proxy: None })
    }

    fn apply_profile(&self, profile: &ProxyProfile) -> Result<()> {
        let resolved = profile.resolve(self.gateway_address())?;
        let target = host_schema(resolved.protocol);
        debug!("Applying {} through {}", resolved.url(), target);

        // Only one host schema may be populated for the read-back to be exact.
        for (schema, _) in HOST_SCHEMAS {
            if schema != target {
                Self::set(schema, "host", &format_string(""))?;
            }
        }
        Self::set(target, "host", &format_string(&resolved.host))?;
        Self::set(target, "port", &resolved.port.to_string())?;
        Self::set(
            PROXY_SCHEMA,
            "ignore-hosts",
            &format_string_list(&resolved.bypass_list),
        )
    }

    fn set_proxy_enabled(&self, enabled: bool) -> Result<()> {
        let mode = if enabled { "manual" } else { "none" };
        Self::set(PROXY_SCHEMA, "mode", &format_string(mode))
    }

    fn read_network_identity(&self) -> Result<NetworkIdentity> {
        let ssid = network_utils::current_ssid();
        let mac = network_utils::default_gateway().and_then(network_utils::neighbour_mac);
        Ok(NetworkIdentity::new(mac, ssid))
    }

    fn gateway_address(&self) -> Option<IpAddr> {
        network_utils::default_gateway()
    }

    fn is_connected(&self) -> bool {
        network_utils::check_reachable(self.reach_target, self.reach_timeout)
    }

    fn read_theme_flags(&self) -> Result<ThemeFlags> {
        let gtk_theme = Self::get_string(INTERFACE_SCHEMA, "gtk-theme")?;
        let taskbar_light = !gtk_theme.to_lowercase().contains("dark");

        // color-scheme only exists on GNOME 42 and later.
        let window_light = match Self::get_string(INTERFACE_SCHEMA, "color-scheme") {
            Ok(scheme) => scheme != "prefer-dark",
            Err(e) => {
                trace!("color-scheme unavailable ({}), using gtk-theme", e);
                taskbar_light
            }
        };

        Ok(ThemeFlags {
            window_light,
            taskbar_light,
        })
    }

    fn watch(&self, category: StateCategory) -> Result<Arc<dyn ChangeHandle>> {
        let dir = match category {
            StateCategory::Proxy => PROXY_DCONF_DIR,
            StateCategory::Theme => INTERFACE_DCONF_DIR,
        };
        debug!("Watching {} changes under {}", category.as_str(), dir);
        Ok(Arc::new(DconfWatch::spawn(dir)?))
    }
}

fn host_schema(protocol: ProxyProtocol) -> &'static str {
    match protocol {
        ProxyProtocol::Http => HTTP_SCHEMA,
        ProxyProtocol::Https => HTTPS_SCHEMA,
        ProxyProtocol::Socks4 | ProxyProtocol::Socks5 | ProxyProtocol::Socks5h => SOCKS_SCHEMA,
    }
}

fn gsettings(args: &[&str]) -> Result<String> {
    let output = Command::new("gsettings")
        .args(args)
        .output()
        .map_err(|e| Error::command_failed("gsettings", e.to_string()))?;

    if !output.status.success() {
        return Err(Error::command_failed(
            format!("gsettings {}", args.join(" ")),
            String::from_utf8_lossy(&output.stderr).trim(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `dconf watch` child process. Each printed key path is one change.
struct DconfWatch {
    dir: &'static str,
    child: Mutex<Child>,
    stdout: Mutex<BufReader<ChildStdout>>,
    closed: AtomicBool,
}

impl DconfWatch {
    fn spawn(dir: &'static str) -> Result<Self> {
        let mut child = Command::new("dconf")
            .args(["watch", dir])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::command_failed(format!("dconf watch {}", dir), e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("dconf watch has no stdout".to_string()))?;

        debug!("Watching dconf directory {}", dir);
        Ok(Self {
            dir,
            child: Mutex::new(child),
            stdout: Mutex::new(BufReader::new(stdout)),
            closed: AtomicBool::new(false),
        })
    }
}

impl ChangeHandle for DconfWatch {
    fn wait(&self) -> Result<WatchEvent> {
        let mut stdout = lock(&self.stdout, "dconf watch");
        let mut line = String::new();
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(WatchEvent::Closed);
            }
            line.clear();
            match stdout.read_line(&mut line) {
                Ok(0) => return Ok(WatchEvent::Closed),
                // Value lines are indented and records end with a blank line.
                Ok(_) if line.starts_with('/') => {
                    trace!("dconf change: {}", line.trim_end());
                    return Ok(if self.closed.load(Ordering::SeqCst) {
                        WatchEvent::Closed
                    } else {
                        WatchEvent::Changed
                    });
                }
                Ok(_) => continue,
                Err(_) if self.closed.load(Ordering::SeqCst) => return Ok(WatchEvent::Closed),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Killing the child ends the blocked read with EOF.
        let mut child = lock(&self.child, "dconf watch");
        if let Err(e) = child.kill() {
            warn!("Failed to stop dconf watch on {}: {}", self.dir, e);
        }
        let _ = child.wait();
    }
}

impl Drop for DconfWatch {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read a quoted GVariant string body up to the closing `quote`.
fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> Option<String> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
    None
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

/// Parse GVariant text of type `s`, e.g. `'manual'`.
fn parse_string(raw: &str) -> Option<String> {
    let mut chars = raw.trim().chars().peekable();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;
    let value = read_quoted(&mut chars, quote)?;
    chars.next().is_none().then_some(value)
}

/// Parse GVariant text of type `as`, e.g. `['localhost', '127.0.0.0/8']`
/// or `@as []`.
fn parse_string_list(raw: &str) -> Option<Vec<String>> {
    let text = raw.trim();
    let text = text.strip_prefix("@as").map(str::trim_start).unwrap_or(text);
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        skip_whitespace(&mut chars);
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };
        items.push(read_quoted(&mut chars, quote)?);
        skip_whitespace(&mut chars);
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(_) => return None,
        }
    }
    Some(items)
}

fn format_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn format_string_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| format_string(v)).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string() {
        assert_eq!(parse_string("'manual'").as_deref(), Some("manual"));
        assert_eq!(parse_string("''").as_deref(), Some(""));
        assert_eq!(parse_string("'it\\'s'").as_deref(), Some("it's"));
        assert_eq!(parse_string("\"prefer-dark\"").as_deref(), Some("prefer-dark"));
        assert_eq!(parse_string("manual"), None);
        assert_eq!(parse_string("'open"), None);
        assert_eq!(parse_string("'a' 'b'"), None);
    }

    #[test]
    fn test_parse_string_list() {
        assert_eq!(
            parse_string_list("['localhost', '127.0.0.0/8', '::1']"),
            Some(vec![
                "localhost".to_string(),
                "127.0.0.0/8".to_string(),
                "::1".to_string()
            ])
        );
        assert_eq!(parse_string_list("@as []"), Some(Vec::new()));
        assert_eq!(parse_string_list("[]"), Some(Vec::new()));
        assert_eq!(
            parse_string_list("['a, b']").as_deref(),
            Some(&["a, b".to_string()][..])
        );
        assert_eq!(parse_string_list("['a' 'b']"), None);
        assert_eq!(parse_string_list("'a'"), None);
    }

    #[test]
    fn test_format_round_trip() {
        let list = vec!["*.corp".to_string(), "it's".to_string()];
        assert_eq!(parse_string_list(&format_string_list(&list)), Some(list));
        assert_eq!(parse_string(&format_string("a\\b")).as_deref(), Some("a\\b"));
    }

    #[test]
    fn test_host_schema_per_protocol() {
        assert_eq!(host_schema(ProxyProtocol::Http), HTTP_SCHEMA);
        assert_eq!(host_schema(ProxyProtocol::Https), HTTPS_SCHEMA);
        assert_eq!(host_schema(ProxyProtocol::Socks4), SOCKS_SCHEMA);
    }
}
