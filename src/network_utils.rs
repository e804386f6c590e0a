// Proxy Control - Network Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Network attachment queries.
//!
//! This module reads the default gateway and its hardware address from the
//! Linux procfs tables, falling back to the `ip` tool, and the active Wi-Fi
//! SSID from `nmcli`.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, trace};

use crate::models::validation::normalize_mac_address;

const ROUTE_TABLE_PATH: &str = "/proc/net/route";
const ARP_TABLE_PATH: &str = "/proc/net/arp";

/// `RTF_GATEWAY` route flag.
const RTF_GATEWAY: u32 = 0x2;

/// Get the active Wi-Fi SSID, if any.
pub fn current_ssid() -> Option<String> {
    let output = Command::new("nmcli")
        .args(["-t", "-f", "active,ssid", "dev", "wifi"])
        .output()
        .ok()?;

    if !output.status.success() {
        debug!("nmcli exited with {}", output.status);
        return None;
    }

    parse_nmcli_ssid(&String::from_utf8_lossy(&output.stdout))
}

/// Get the IPv4 default gateway.
pub fn default_gateway() -> Option<IpAddr> {
    let gateway = match fs::read_to_string(ROUTE_TABLE_PATH) {
        Ok(table) => parse_route_table(&table),
        Err(e) => {
            trace!("Cannot read {}: {}", ROUTE_TABLE_PATH, e);
            gateway_from_ip_route()
        }
    };
    gateway.map(IpAddr::V4)
}

/// Get the hardware address of a neighbour, lowercased.
pub fn neighbour_mac(ip: IpAddr) -> Option<String> {
    match fs::read_to_string(ARP_TABLE_PATH) {
        Ok(table) => parse_arp_table(&table, ip),
        Err(e) => {
            trace!("Cannot read {}: {}", ARP_TABLE_PATH, e);
            mac_from_ip_neigh(ip)
        }
    }
}

/// TCP reachability check. Any failure counts as unreachable.
pub fn check_reachable(target: SocketAddr, timeout: Duration) -> bool {
    match TcpStream::connect_timeout(&target, timeout) {
        Ok(_) => true,
        Err(e) => {
            trace!("Connectivity check to {} failed: {}", target, e);
            false
        }
    }
}

/// Parse `nmcli -t -f active,ssid dev wifi` output.
fn parse_nmcli_ssid(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("yes:"))
        // Terse mode escapes the field separator.
        .map(|ssid| ssid.replace("\\:", ":").replace("\\\\", "\\"))
        .filter(|ssid| !ssid.is_empty())
}

/// Parse `/proc/net/route` for the default route's gateway.
///
/// Addresses are hex words in host byte order.
fn parse_route_table(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "00000000" {
            return None;
        }
        let flags = u32::from_str_radix(fields[3], 16).ok()?;
        if flags & RTF_GATEWAY == 0 {
            return None;
        }
        let word = u32::from_str_radix(fields[2], 16).ok()?;
        let gateway = Ipv4Addr::from(word.to_ne_bytes());
        (!gateway.is_unspecified()).then_some(gateway)
    })
}

/// Parse `/proc/net/arp` for the entry of `ip`.
fn parse_arp_table(table: &str, ip: IpAddr) -> Option<String> {
    let wanted = ip.to_string();
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != wanted {
            return None;
        }
        normalize_mac_address(fields[3])
    })
}

fn gateway_from_ip_route() -> Option<Ipv4Addr> {
    let output = Command::new("ip")
        .args(["route", "show", "default"])
        .output()
        .ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()?
        .split_whitespace()
        .nth(2)?
        .parse()
        .ok()
}

fn mac_from_ip_neigh(ip: IpAddr) -> Option<String> {
    let output = Command::new("ip")
        .args(["neigh", "show", &ip.to_string()])
        .output()
        .ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()?
        .split_whitespace()
        .nth(4)
        .and_then(normalize_mac_address)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlp2s0\t0000A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0
wlp2s0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
";

    const ARP_TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         AA:BB:CC:DD:EE:01     *        wlp2s0
192.168.1.7      0x1         0x0         00:00:00:00:00:00     *        wlp2s0
";

    #[test]
    #[cfg(target_endian = "little")]
    fn test_parse_route_table() {
        assert_eq!(
            parse_route_table(ROUTE_TABLE),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
    }

    #[test]
    fn test_route_table_without_default() {
        let table = ROUTE_TABLE.lines().take(2).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_route_table(&table), None);
        assert_eq!(parse_route_table(""), None);
    }

    #[test]
    fn test_parse_arp_table() {
        let gw = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(
            parse_arp_table(ARP_TABLE, gw).as_deref(),
            Some("aa:bb:cc:dd:ee:01")
        );

        // Incomplete entries carry an all-zero address.
        let incomplete = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(parse_arp_table(ARP_TABLE, incomplete), None);

        let missing = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(parse_arp_table(ARP_TABLE, missing), None);
    }

    #[test]
    fn test_parse_nmcli_ssid() {
        assert_eq!(
            parse_nmcli_ssid("no:Neighbour\nyes:OfficeWifi\n").as_deref(),
            Some("OfficeWifi")
        );
        assert_eq!(
            parse_nmcli_ssid("yes:Cafe\\: Guest\n").as_deref(),
            Some("Cafe: Guest")
        );
        assert_eq!(parse_nmcli_ssid("no:Neighbour\n"), None);
        assert_eq!(parse_nmcli_ssid(""), None);
    }

    #[test]
    fn test_refused_connection_is_unreachable() {
        // Nothing listens on the discard port of loopback in test sandboxes.
        let target: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(!check_reachable(target, Duration::from_millis(200)));
    }
}
