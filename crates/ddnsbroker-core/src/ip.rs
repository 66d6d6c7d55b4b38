//! Address helpers
//!
//! - [`normalize_ip`]: canonical rendering of a raw caller address
//! - [`compose_ipv4`] / [`compose_ipv6`]: effective address of a record,
//!   built from the host's address (network part) and the record's host
//!   identifier (low bits)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4, 32 bits
    V4,
    /// IPv6, 128 bits
    V6,
}

impl AddressFamily {
    /// Both families, v4 first
    pub const ALL: [AddressFamily; 2] = [AddressFamily::V4, AddressFamily::V6];

    /// Address width in bits
    pub fn width(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    /// Family of a parsed address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("IPv4"),
            AddressFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// Canonicalize a raw address string.
///
/// IPv4-mapped IPv6 (`::ffff:a.b.c.d`) collapses to plain IPv4, any other
/// IPv6 is rendered canonically, and input that is not IPv6 at all is
/// returned unchanged.
pub fn normalize_ip(raw: &str) -> String {
    match raw.parse::<Ipv6Addr>() {
        Ok(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

/// Effective IPv4 address for a record.
///
/// `None` when the host has no IPv4 address. The netmask is clamped to 32.
pub fn compose_ipv4(host: Option<Ipv4Addr>, netmask: u8, host_id: Ipv4Addr) -> Option<Ipv4Addr> {
    let host = host?;
    let bits = compose_bits(
        u128::from(u32::from(host)),
        u128::from(u32::from(host_id)),
        netmask,
        AddressFamily::V4.width(),
    );
    // compose_bits masks to the family width, so this never truncates
    Some(Ipv4Addr::from(bits as u32))
}

/// Effective IPv6 address for a record.
///
/// `None` when the host has no IPv6 address. The netmask is clamped to 128.
pub fn compose_ipv6(host: Option<Ipv6Addr>, netmask: u8, host_id: Ipv6Addr) -> Option<Ipv6Addr> {
    let host = host?;
    let bits = compose_bits(
        u128::from(host),
        u128::from(host_id),
        netmask,
        AddressFamily::V6.width(),
    );
    Some(Ipv6Addr::from(bits))
}

/// network(host / netmask) + (host_id & low (width - netmask) bits), modulo 2^width
fn compose_bits(host: u128, host_id: u128, netmask: u8, width: u8) -> u128 {
    let netmask = u32::from(netmask.min(width));
    let full = u128::MAX.checked_shr(128 - u32::from(width)).unwrap_or(0);
    let host_mask = full.checked_shr(netmask).unwrap_or(0);

    let network = host & full & !host_mask;
    let suffix = host_id & host_mask;

    network.wrapping_add(suffix) & full
}
