//! Literal address classification.
//!
//! Decides, without touching the network, whether a hostname or IP literal
//! names a private, loopback, link-local or otherwise internal destination.
//! Anything that cannot be parsed cleanly is treated as private.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Serialize;

/// Hostnames that always denote the local machine.
const BLOCKED_HOSTNAMES: &[&str] = &["localhost"];

/// Label suffixes reserved for internal name resolution.
const BLOCKED_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal"];

/// Maximum length of a DNS name in presentation form.
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Why an address was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressReason {
    Loopback,
    Rfc1918,
    LinkLocal,
    UniqueLocal,
    Unspecified,
    /// Shared address space, multicast or other non-unicast ranges.
    Reserved,
    SuffixBlocklisted,
    /// The input looked numeric or contained characters no hostname may carry.
    Malformed,
    ResolutionFailed,
    Public,
}

/// Result of classifying a single host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressVerdict {
    pub is_private: bool,
    pub reason: AddressReason,
}

impl AddressVerdict {
    pub const PUBLIC: Self = Self {
        is_private: false,
        reason: AddressReason::Public,
    };

    pub fn private(reason: AddressReason) -> Self {
        Self {
            is_private: true,
            reason,
        }
    }
}

/// Classify a hostname or IP literal.
///
/// Accepts bracketed IPv6 (`[::1]`), ignores case and a single trailing dot.
/// Numeric hosts that are not canonical dotted-quad IPv4 (`0x7f.1`, `2130706433`,
/// `127.1`) are reported as [`AddressReason::Malformed`] so they never reach DNS.
pub fn classify(host_or_ip: &str) -> AddressVerdict {
    let host = normalize_host(host_or_ip);
    if host.is_empty() {
        return AddressVerdict::private(AddressReason::Malformed);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return classify_ip(ip);
    }

    if looks_numeric(&host) || !is_valid_hostname(&host) {
        return AddressVerdict::private(AddressReason::Malformed);
    }

    if is_blocklisted_name(&host) {
        return AddressVerdict::private(AddressReason::SuffixBlocklisted);
    }

    AddressVerdict::PUBLIC
}

/// Classify a parsed IP address.
pub fn classify_ip(ip: IpAddr) -> AddressVerdict {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

/// Lowercase, strip IPv6 brackets and one trailing root dot.
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    let undotted = unbracketed.strip_suffix('.').unwrap_or(unbracketed);
    undotted.to_ascii_lowercase()
}

fn classify_v4(ip: Ipv4Addr) -> AddressVerdict {
    let reason = match ip.octets() {
        [127, ..] => AddressReason::Loopback,
        [10, ..] | [172, 16..=31, ..] | [192, 168, ..] => AddressReason::Rfc1918,
        [169, 254, ..] => AddressReason::LinkLocal,
        [0, ..] => AddressReason::Unspecified,
        [100, 64..=127, ..] => AddressReason::Reserved,
        [192, 0, 0, _] => AddressReason::Reserved,
        [198, 18..=19, ..] => AddressReason::Reserved,
        [224..=255, ..] => AddressReason::Reserved,
        _ => return AddressVerdict::PUBLIC,
    };
    AddressVerdict::private(reason)
}

fn classify_v6(ip: Ipv6Addr) -> AddressVerdict {
    if ip.is_loopback() {
        return AddressVerdict::private(AddressReason::Loopback);
    }
    if ip.is_unspecified() {
        return AddressVerdict::private(AddressReason::Unspecified);
    }
    if let Some(embedded) = embedded_v4(&ip) {
        return classify_v4(embedded);
    }

    let first = ip.segments()[0];
    let reason = if first & 0xfe00 == 0xfc00 {
        AddressReason::UniqueLocal
    } else if first & 0xffc0 == 0xfe80 {
        AddressReason::LinkLocal
    } else if first & 0xff00 == 0xff00 {
        AddressReason::Reserved
    } else {
        return AddressVerdict::PUBLIC;
    };
    AddressVerdict::private(reason)
}

/// IPv4 carried inside an IPv6 address: mapped (`::ffff:a.b.c.d`),
/// compatible (`::a.b.c.d`) or NAT64 (`64:ff9b::a.b.c.d`).
fn embedded_v4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return Some(mapped);
    }
    let segs = ip.segments();
    let tail = Ipv4Addr::new(
        (segs[6] >> 8) as u8,
        segs[6] as u8,
        (segs[7] >> 8) as u8,
        segs[7] as u8,
    );
    match segs[..6] {
        [0, 0, 0, 0, 0, 0] => Some(tail),
        [0x64, 0xff9b, 0, 0, 0, 0] => Some(tail),
        _ => None,
    }
}

/// A host whose final label is numeric is an IPv4 parse attempt. If it
/// failed `Ipv4Addr` parsing it is an alternate encoding and not a name.
fn looks_numeric(host: &str) -> bool {
    let last = host.rsplit('.').find(|l| !l.is_empty()).unwrap_or(host);
    if last.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    match last.strip_prefix("0x") {
        Some(hex) => hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

fn is_valid_hostname(host: &str) -> bool {
    if host.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

fn is_blocklisted_name(host: &str) -> bool {
    BLOCKED_HOSTNAMES.contains(&host) || BLOCKED_SUFFIXES.iter().any(|s| host.ends_with(s))
}
