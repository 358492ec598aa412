use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::ScanError;

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<IpNet> = set.into_iter().map(IpNet::V4).collect();
    // Sort for stable output
    cidrs.sort_by_key(|n| match n {
        IpNet::V4(n4) => (u32::from(n4.network()), n4.prefix_len()),
        IpNet::V6(_) => (0, 0),
    });
    Ok(cidrs)
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).expect("/24 is always valid")
}

/// Check that `range` is a host specifier nmap will read as a target, never as an option.
///
/// Accepted forms:
/// - CIDR: `192.168.1.0/24`
/// - single address: `10.0.0.5`, `fe80::1`
/// - IPv4 octet ranges: `192.168.1.1-50`, `10.0.*.1`
/// - hostnames: `printer.lan`
///
/// Returns the trimmed range.
pub fn validate_range(range: &str) -> Result<&str, ScanError> {
    let range = range.trim();
    if range.is_empty() {
        return Err(ScanError::InvalidInput("address range is empty".into()));
    }
    if range.parse::<IpNet>().is_ok() || range.parse::<IpAddr>().is_ok() {
        return Ok(range);
    }
    if is_octet_range(range) || is_hostname(range) {
        return Ok(range);
    }
    Err(ScanError::InvalidInput(format!(
        "not a CIDR, address, octet range or hostname: {range}"
    )))
}

/// True when `range` is an IPv6 network or address; nmap needs `-6` for those.
pub fn is_ipv6(range: &str) -> bool {
    let range = range.trim();
    matches!(range.parse::<IpNet>(), Ok(IpNet::V6(_)))
        || matches!(range.parse::<IpAddr>(), Ok(IpAddr::V6(_)))
}

fn is_octet_range(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| is_octet_spec(p))
}

fn is_octet_spec(part: &str) -> bool {
    if part == "*" {
        return true;
    }
    match part.split_once('-') {
        Some((a, b)) => match (parse_octet(a), parse_octet(b)) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        },
        None => parse_octet(part).is_some(),
    }
}

fn parse_octet(s: &str) -> Option<u8> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn is_hostname(s: &str) -> bool {
    if s.len() > 253 {
        return false;
    }
    // an all-numeric dotted string that failed IP parsing is a typo, not a name
    if s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}
