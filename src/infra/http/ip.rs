//! Client address resolution behind reverse proxies.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "proxy-client-ip", "wl-proxy-client-ip"];
const LOCALHOST: &str = "127.0.0.1";

/// First usable address from the proxy headers, falling back to the peer.
///
/// Returns an empty string when neither headers nor peer are available.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = FORWARDED_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .and_then(usable)
    });

    let ip = match forwarded {
        Some(ip) => ip,
        None => match peer {
            Some(peer) => peer.ip().to_string(),
            None => return String::new(),
        },
    };

    normalize_loopback(ip)
}

fn usable(raw: &str) -> Option<String> {
    let first = raw.split(',').next()?.trim();
    if first.is_empty() || first.eq_ignore_ascii_case("unknown") {
        return None;
    }
    Some(first.to_string())
}

fn normalize_loopback(ip: String) -> String {
    match ip.as_str() {
        "::1" | "0:0:0:0:0:0:0:1" => LOCALHOST.to_string(),
        _ => ip,
    }
}

/// Coarse origin of an address: `intranet`, `internet` or `unknown`.
pub fn ip_source(ip: &str) -> &'static str {
    let Ok(addr) = ip.trim().parse::<IpAddr>() else {
        return "unknown";
    };
    let internal = match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_private() || v4.is_loopback())
        }
    };
    if internal { "intranet" } else { "internet" }
}
