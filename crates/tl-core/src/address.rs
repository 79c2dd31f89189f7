//! Client address resolution from request origin hints.
//!
//! Forwarding headers are client-controlled, so the resolver only trusts a
//! hinted address that parses and lies outside private and reserved IPv4
//! space. IPv6 hints are accepted unfiltered.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Header hints in precedence order, in normalized form.
const HINT_HEADERS: [&str; 6] = [
    "client-ip",
    "x-forwarded-for",
    "x-forwarded",
    "x-cluster-client-ip",
    "forwarded-for",
    "forwarded",
];

/// IPv4 networks never reported as a client address: (network, prefix length).
const FILTERED_V4: [(Ipv4Addr, u8); 10] = [
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(255, 255, 255, 0), 24),
];

/// Network-origin data for one logged request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    /// Header name/value pairs, in arrival order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Peer address of the direct connection.
    #[serde(default)]
    pub remote_addr: Option<String>,
}

impl RequestOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    fn header_values<'a>(&'a self, wanted: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(name, _)| normalize_header(name) == wanted)
            .map(|(_, value)| value.as_str())
    }
}

/// Lowercase, drop a CGI `HTTP_` prefix, and map `_` to `-`.
fn normalize_header(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let stripped = lower.strip_prefix("http_").unwrap_or(&lower);
    stripped.replace('_', "-")
}

/// Best-guess client address: the first hint that validates, else the
/// direct peer address as reported.
pub fn resolve_client_address(origin: &RequestOrigin) -> Option<String> {
    for header in HINT_HEADERS {
        for value in origin.header_values(header) {
            let candidates: Vec<&str> = if header == "x-forwarded-for" {
                value.split(',').map(str::trim).collect()
            } else {
                vec![value.trim()]
            };
            if let Some(found) = candidates.into_iter().find(|c| validate_address(c)) {
                return Some(found.to_string());
            }
        }
    }
    origin.remote_addr.clone()
}

/// Whether `address` is usable as a public client address.
pub fn validate_address(address: &str) -> bool {
    let address = address.trim();
    if address.eq_ignore_ascii_case("unknown") {
        return false;
    }
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => !is_filtered_v4(v4),
        Ok(IpAddr::V6(_)) => true,
        Err(_) => false,
    }
}

fn is_filtered_v4(addr: Ipv4Addr) -> bool {
    let value = u32::from(addr);
    FILTERED_V4.iter().any(|(network, prefix)| {
        let mask = u32::MAX << (32 - u32::from(*prefix));
        value & mask == u32::from(*network) & mask
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn validates_known_addresses() {
        assert!(!validate_address("127.0.0.1"));
        assert!(validate_address("8.8.8.8"));
        assert!(!validate_address("unknown"));
        assert!(!validate_address("UNKNOWN"));
        assert!(!validate_address("10.0.0.5"));
        assert!(!validate_address("not.an.ip.addr"));
        assert!(!validate_address("300.1.1.1"));
        assert!(!validate_address(""));
    }

    #[test]
    fn filters_reserved_blocks() {
        for addr in [
            "0.1.2.3",
            "169.254.10.10",
            "172.16.0.1",
            "172.31.255.255",
            "192.0.2.44",
            "192.168.1.1",
            "198.51.100.7",
            "203.0.113.9",
            "255.255.255.255",
        ] {
            assert!(!validate_address(addr), "{addr} should be filtered");
        }
        assert!(validate_address("172.32.0.1"));
        assert!(validate_address("172.15.255.255"));
        assert!(validate_address("1.1.1.1"));
    }

    #[test]
    fn ipv6_passes_through() {
        assert!(validate_address("::1"));
        assert!(validate_address("2001:db8::1"));
    }

    #[test]
    fn client_ip_has_precedence() {
        let origin = RequestOrigin::new()
            .with_header("X-Forwarded-For", "8.8.4.4")
            .with_header("Client-IP", "9.9.9.9")
            .with_remote_addr("10.0.0.1");
        assert_eq!(resolve_client_address(&origin).as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn forwarded_for_scans_left_to_right() {
        let origin = RequestOrigin::new()
            .with_header("x-forwarded-for", "unknown, 10.1.1.1 , 93.184.216.34, 1.1.1.1");
        assert_eq!(resolve_client_address(&origin).as_deref(), Some("93.184.216.34"));
    }

    #[test]
    fn invalid_client_ip_falls_through() {
        let origin = RequestOrigin::new()
            .with_header("client-ip", "192.168.0.9")
            .with_header("x-cluster-client-ip", "4.4.4.4");
        assert_eq!(resolve_client_address(&origin).as_deref(), Some("4.4.4.4"));
    }

    #[test]
    fn cgi_style_names_are_recognized() {
        let origin = RequestOrigin::new().with_header("HTTP_X_FORWARDED_FOR", "5.6.7.8");
        assert_eq!(resolve_client_address(&origin).as_deref(), Some("5.6.7.8"));
    }

    #[test]
    fn falls_back_to_remote_addr_unvalidated() {
        let origin = RequestOrigin::new()
            .with_header("forwarded", "127.0.0.1")
            .with_remote_addr("10.0.0.7");
        assert_eq!(resolve_client_address(&origin).as_deref(), Some("10.0.0.7"));
        assert_eq!(resolve_client_address(&RequestOrigin::new()), None);
    }

    #[test]
    fn unrelated_headers_ignored() {
        let origin = RequestOrigin::new().with_header("x-real-ip", "8.8.8.8");
        assert_eq!(resolve_client_address(&origin), None);
    }

    proptest! {
        #[test]
        fn ten_slash_eight_always_filtered(b in any::<u8>(), c in any::<u8>(), d in any::<u8>()) {
            let addr = format!("10.{b}.{c}.{d}");
            prop_assert!(!validate_address(&addr));
        }

        #[test]
        fn resolved_hint_always_validates(
            a in 1u8..=254, b in any::<u8>(), c in any::<u8>(), d in any::<u8>()
        ) {
            let addr = format!("{a}.{b}.{c}.{d}");
            let origin = RequestOrigin::new().with_header("x-forwarded-for", addr.clone());
            match resolve_client_address(&origin) {
                Some(resolved) => {
                    prop_assert_eq!(&resolved, &addr);
                    prop_assert!(validate_address(&resolved));
                }
                None => prop_assert!(!validate_address(&addr)),
            }
        }
    }
}
