//! Client identification for rate limiting.

use std::net::IpAddr;

use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;

/// Headers carrying the original client IP, most trusted first.
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "true-client-ip",
    "x-real-ip",
    "x-forwarded-for",
];

/// Characters of the user agent folded into the key.
const USER_AGENT_PREFIX_CHARS: usize = 50;

/// Build a rate limit key from proxy headers, the socket peer and the
/// user agent.
///
/// Header values that do not parse as an IP are ignored. For
/// `x-forwarded-for` only the first (client-most) entry is used.
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let ip = client_ip(headers)
        .or(peer)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let agent: String = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .chars()
        .take(USER_AGENT_PREFIX_CHARS)
        .collect();

    format!("{}|{}", ip, agent)
}

fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next()?.trim();
        first.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let h = headers(&[
            ("x-forwarded-for", "198.51.100.1"),
            ("cf-connecting-ip", "203.0.113.7"),
        ]);
        assert_eq!(client_key(&h, None), "203.0.113.7|");
    }

    #[test]
    fn test_forwarded_for_uses_first_entry() {
        let h = headers(&[
            ("x-forwarded-for", "198.51.100.1, 10.0.0.1, 10.0.0.2"),
            ("user-agent", "curl/8.0"),
        ]);
        assert_eq!(client_key(&h, None), "198.51.100.1|curl/8.0");
    }

    #[test]
    fn test_invalid_header_falls_through_to_peer() {
        let h = headers(&[("x-real-ip", "not-an-ip")]);
        let peer: IpAddr = "192.0.2.9".parse().expect("ip");
        assert_eq!(client_key(&h, Some(peer)), "192.0.2.9|");
    }

    #[test]
    fn test_unknown_when_nothing_identifies_client() {
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown|");
    }

    #[test]
    fn test_user_agent_truncated() {
        let long = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";
        let h = headers(&[("user-agent", long)]);
        let key = client_key(&h, None);
        let agent = key.split_once('|').map(|(_, a)| a).expect("separator");
        assert_eq!(agent.chars().count(), 50);
        assert!(long.starts_with(agent));
    }
}
