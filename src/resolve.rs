use std::net::{IpAddr, SocketAddr};

use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ScanError;

/// Resolve `host` to a scan target.
///
/// Literal IPv4/IPv6 addresses are returned as-is without touching DNS. Names go
/// through the system resolver and the first IPv4 answer wins. Cancellation
/// surfaces as [`ScanError::Cancelled`], never as a resolution failure.
pub async fn resolve_host(host: &str, cancel: &CancellationToken) -> Result<IpAddr, ScanError> {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }

    let lookup = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ScanError::Cancelled),
        res = lookup_host((host, 0)) => res,
    };
    let addrs = lookup.map_err(|e| ScanError::HostResolution {
        host: host.to_string(),
        reason: e.to_string(),
    })?;

    let ip = first_ipv4(addrs).ok_or_else(|| ScanError::HostResolution {
        host: host.to_string(),
        reason: "no IPv4 address found".to_string(),
    })?;
    debug!(%host, %ip, "resolved host");
    Ok(ip)
}

fn first_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<IpAddr> {
    addrs.into_iter().map(|sa| sa.ip()).find(IpAddr::is_ipv4)
}
