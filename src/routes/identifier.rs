use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

use crate::config::Config;
use crate::constants::{HEADER_FORWARDED_FOR, HEADER_REAL_IP, HEADER_USER_ID, MAX_IDENTIFIER_LEN};

const USER_PREFIX: &str = "user:";

/// Which client-supplied identity headers an upstream layer vouches for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderTrust {
    /// `X-User-Id` is set by an upstream session layer and stripped from client input
    pub user_id: bool,
    /// `X-Forwarded-For` / `X-Real-IP` are set by a trusted proxy
    pub forwarded: bool,
}

impl HeaderTrust {
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_id: config.trust_user_id_header,
            forwarded: config.trust_forwarded_headers,
        }
    }
}

/// Derive the rate limit identifier for a request
///
/// Precedence: authenticated user id, first `X-Forwarded-For` hop,
/// `X-Real-IP`, then the socket peer. Each header is only honoured when
/// `trust` says so. Returns `None` when nothing identifies the caller.
pub fn resolve_identifier(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust: HeaderTrust,
) -> Option<String> {
    if trust.user_id {
        if let Some(user_id) = header_value(headers, HEADER_USER_ID) {
            if USER_PREFIX.len() + user_id.len() <= MAX_IDENTIFIER_LEN {
                return Some(format!("{}{}", USER_PREFIX, user_id));
            }
            tracing::debug!("Ignoring oversized user id header");
        }
    }

    if trust.forwarded {
        let forwarded = header_value(headers, HEADER_FORWARDED_FOR)
            .and_then(|value| value.split(',').next().and_then(parse_ip));
        if let Some(ip) = forwarded {
            return Some(format!("ip:{}", ip));
        }

        if let Some(ip) = header_value(headers, HEADER_REAL_IP).and_then(parse_ip) {
            return Some(format!("ip:{}", ip));
        }
    }

    peer.map(|addr| format!("ip:{}", addr.ip()))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse().ok()
}
