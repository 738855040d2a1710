//! Client address resolution shared by rate limiting and request logging.
//!
//! # Resolution Order
//!
//! 1. When `trust_proxy` is enabled: the first entry of `X-Forwarded-For`,
//!    then `X-Real-IP`
//! 2. The peer address of the TCP connection (`ConnectInfo<SocketAddr>`)
//! 3. [`UNKNOWN_CLIENT`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Proxy headers are client-controlled. Only enable `TRUST_PROXY` when the
//! service sits behind a reverse proxy that overwrites (not appends to) them
//! and cannot be reached directly:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! Otherwise a client can rotate spoofed addresses to dodge its rate limit.
//!
//! # The "unknown" Fallback
//!
//! Requests with no resolvable address (e.g. a router driven without
//! `into_make_service_with_connect_info`) all share the `"unknown"` key and
//! are therefore rate-limited collectively.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;

/// Fallback key when no client address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Where a proxy-supplied address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyIp<'a> {
    /// First address in `X-Forwarded-For`.
    FromXff(&'a str),
    /// `X-Real-IP`.
    FromRealIp(&'a str),
    NotFound,
}

/// Borrow the proxy-reported client address, if any. No allocations.
#[inline]
fn proxy_ip<B>(req: &Request<B>) -> ProxyIp<'_> {
    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first_ip) = value.split(',').next()
        && !first_ip.trim().is_empty()
    {
        return ProxyIp::FromXff(first_ip.trim());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return ProxyIp::FromRealIp(value.trim());
    }

    ProxyIp::NotFound
}

/// Resolve the client address used to key rate limits and label log records.
///
/// Returns `Cow::Borrowed` for the shared [`UNKNOWN_CLIENT`] fallback and an
/// owned string otherwise; call `.into_owned()` before moving it into a
/// `'static` future.
#[inline]
pub fn client_addr<B>(req: &Request<B>, trust_proxy: bool) -> Cow<'static, str> {
    if trust_proxy {
        match proxy_ip(req) {
            ProxyIp::FromXff(ip) | ProxyIp::FromRealIp(ip) => return Cow::Owned(ip.to_string()),
            ProxyIp::NotFound => {}
        }
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(peer)) => Cow::Owned(peer.ip().to_string()),
        None => Cow::Borrowed(UNKNOWN_CLIENT),
    }
}
