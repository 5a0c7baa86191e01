use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, SurgeError, ICMP};
use thiserror::Error;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ScanError;
use crate::resolve::resolve_host;
use crate::types::{PingReport, PingStat, PingSummary, ScanStatus};

/// Pause between consecutive echo requests.
pub const INTER_PROBE_DELAY: Duration = Duration::from_millis(1000);

/// Echo request payload size in bytes.
pub const PAYLOAD_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum EchoError {
    #[error("request timed out")]
    TimedOut,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("icmp error: {0}")]
    Icmp(String),
}

/// A received echo reply. The TTL is only known for IPv4 replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub rtt: Duration,
    pub ttl: Option<u8>,
}

impl EchoReply {
    pub fn new(rtt: Duration) -> Self {
        Self { rtt, ttl: None }
    }

    pub fn with_ttl(mut self, ttl: Option<u8>) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Sends a single ICMP echo and waits for its reply.
pub trait Pinger: Send + Sync {
    fn echo(
        &self,
        address: IpAddr,
        sequence: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<EchoReply, EchoError>> + Send;
}

/// `surge-ping` backed pinger. Opening the ICMP socket may require elevated
/// privileges; that failure is reported per echo, not up front.
#[derive(Debug, Clone)]
pub struct IcmpPinger {
    identifier: u16,
}

impl IcmpPinger {
    pub fn new() -> Self {
        Self {
            identifier: (std::process::id() & 0xffff) as u16,
        }
    }
}

impl Default for IcmpPinger {
    fn default() -> Self {
        Self::new()
    }
}

impl Pinger for IcmpPinger {
    async fn echo(
        &self,
        address: IpAddr,
        sequence: u16,
        timeout: Duration,
    ) -> Result<EchoReply, EchoError> {
        let config = match address {
            IpAddr::V4(_) => Config::default(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
        };
        let client = Client::new(&config)?;
        let mut pinger = client.pinger(address, PingIdentifier(self.identifier)).await;
        pinger.timeout(timeout);

        let payload = [0u8; PAYLOAD_SIZE];
        match pinger.ping(PingSequence(sequence), &payload).await {
            Ok((IcmpPacket::V4(packet), rtt)) => {
                let ttl: Option<u8> = packet.get_ttl().into();
                Ok(EchoReply::new(rtt).with_ttl(ttl))
            }
            Ok((IcmpPacket::V6(_), rtt)) => Ok(EchoReply::new(rtt)),
            Err(SurgeError::Timeout { .. }) => Err(EchoError::TimedOut),
            Err(e) => Err(EchoError::Icmp(e.to_string())),
        }
    }
}

/// Send `count` echo requests one after another, [`INTER_PROBE_DELAY`] apart.
///
/// Failed echoes are logged and counted as lost; they never stop the loop.
/// Cancellation stops it and the report covers the echoes already sent; an echo
/// still waiting for its reply when the token fires counts as lost.
pub async fn run_pings<P: Pinger>(
    pinger: &P,
    address: IpAddr,
    count: u32,
    timeout: Duration,
    cancel: &CancellationToken,
) -> PingReport {
    // `count` comes straight from the user; grow as echoes are sent.
    let mut stats = Vec::new();
    let mut status = ScanStatus::Completed;

    for seq in 0..count {
        if cancel.is_cancelled() {
            status = ScanStatus::Cancelled;
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                stats.push(PingStat::failed(address, "cancelled before reply"));
                status = ScanStatus::Cancelled;
                break;
            }
            res = pinger.echo(address, echo_sequence(seq), timeout) => res,
        };

        let stat = match result {
            Ok(reply) => {
                let ttl = reply
                    .ttl
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                info!(
                    %address,
                    rtt_ms = reply.rtt.as_millis() as u64,
                    "reply from {}: bytes={} time={}ms TTL={}",
                    address,
                    PAYLOAD_SIZE,
                    reply.rtt.as_millis(),
                    ttl
                );
                PingStat::reply(address, reply.rtt).with_ttl(reply.ttl)
            }
            Err(EchoError::TimedOut) => {
                info!(%address, "request timed out");
                PingStat::failed(address, EchoError::TimedOut.to_string())
            }
            Err(e) => {
                error!(%address, error = %e, "ping failed: {e}");
                PingStat::failed(address, e.to_string())
            }
        };
        stats.push(stat);

        if seq + 1 < count {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    status = ScanStatus::Cancelled;
                    break;
                }
                _ = time::sleep(INTER_PROBE_DELAY) => {}
            }
        }
    }

    let summary = PingSummary::from_stats(address, &stats);
    PingReport {
        address,
        status,
        stats,
        summary,
    }
}

/// ICMP sequence numbers are 16 bits wide and wrap.
fn echo_sequence(seq: u32) -> u16 {
    (seq % (u32::from(u16::MAX) + 1)) as u16
}

#[derive(Debug, Clone)]
pub struct PingRequest {
    pub host: String,
    pub count: u32,
    pub timeout_ms: u64,
}

/// Resolve `request.host` and ping it, logging each reply and the statistics.
pub async fn ping_host<P: Pinger>(
    pinger: &P,
    request: &PingRequest,
    cancel: &CancellationToken,
) -> Result<PingReport, ScanError> {
    info!("=== ping {} ===", request.host);
    info!(
        count = request.count,
        timeout_ms = request.timeout_ms,
        "packets: {}, timeout: {}ms",
        request.count,
        request.timeout_ms
    );

    let address = resolve_host(&request.host, cancel).await?;
    let report = run_pings(
        pinger,
        address,
        request.count,
        Duration::from_millis(request.timeout_ms),
        cancel,
    )
    .await;

    if report.status == ScanStatus::Cancelled {
        warn!(sent = report.summary.sent, "ping interrupted");
    }
    log_statistics(&report.summary);
    Ok(report)
}

fn log_statistics(summary: &PingSummary) {
    info!("=== ping statistics ===");
    match summary.loss_percent {
        Some(loss) => info!(
            "packets: sent = {}, received = {}, lost = {} ({:.1}% loss)",
            summary.sent,
            summary.received,
            summary.sent - summary.received,
            loss
        ),
        None => info!("packets: none sent"),
    }
    if let Some(avg) = summary.average_rtt {
        info!("average round trip: {:.1}ms", avg.as_secs_f64() * 1000.0);
    }
}
