use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use time::OffsetDateTime;

use crate::services;

/// Result of one TCP connect attempt against `address:port`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub address: IpAddr,
    pub port: u16,
    pub is_open: bool,
    #[serde(rename = "response_time_ms", with = "millis")]
    pub response_time: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl ProbeOutcome {
    pub fn new(target: SocketAddr, is_open: bool, response_time: Duration) -> Self {
        Self {
            address: target.ip(),
            port: target.port(),
            is_open,
            response_time,
            observed_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn service_name(&self) -> &'static str {
        services::service_name(self.port)
    }
}

/// Final tallies of a scan. `open_ports` is ordered by ascending port.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total_ports: usize,
    pub open_count: usize,
    pub closed_count: usize,
    pub open_ports: Vec<ProbeOutcome>,
}

impl ScanSummary {
    /// Number of ports that received an outcome.
    pub fn probed(&self) -> usize {
        self.open_count + self.closed_count
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    Cancelled,
}

/// What the probe engine hands back once a scan has finished or been cancelled.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: IpAddr,
    pub status: ScanStatus,
    #[serde(rename = "elapsed_ms", with = "millis")]
    pub elapsed: Duration,
    pub summary: ScanSummary,
}

/// Point-in-time progress derived from the outcome stream.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
    pub elapsed: Duration,
}

/// One ICMP echo attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingStat {
    pub address: IpAddr,
    #[serde(rename = "round_trip_time_ms", with = "opt_millis")]
    pub round_trip_time: Option<Duration>,
    pub succeeded: bool,
    #[serde(default)]
    pub ttl: Option<u8>,
    pub failure: Option<String>,
}

impl PingStat {
    pub fn reply(address: IpAddr, rtt: Duration) -> Self {
        Self {
            address,
            round_trip_time: Some(rtt),
            succeeded: true,
            ttl: None,
            failure: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<u8>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn failed(address: IpAddr, reason: impl Into<String>) -> Self {
        Self {
            address,
            round_trip_time: None,
            succeeded: false,
            ttl: None,
            failure: Some(reason.into()),
        }
    }
}

/// Aggregate ping statistics. Loss and average are absent when nothing was sent;
/// the average is also absent when no reply arrived.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingSummary {
    pub address: IpAddr,
    pub sent: u32,
    pub received: u32,
    pub loss_percent: Option<f64>,
    #[serde(rename = "average_rtt_ms", with = "opt_millis")]
    pub average_rtt: Option<Duration>,
}

impl PingSummary {
    pub fn from_stats(address: IpAddr, stats: &[PingStat]) -> Self {
        let sent = stats.len() as u32;
        let replies: Vec<Duration> = stats
            .iter()
            .filter(|s| s.succeeded)
            .filter_map(|s| s.round_trip_time)
            .collect();
        let received = replies.len() as u32;

        let loss_percent =
            (sent > 0).then(|| f64::from(sent - received) * 100.0 / f64::from(sent));
        let average_rtt = (received > 0).then(|| replies.iter().sum::<Duration>() / received);

        Self {
            address,
            sent,
            received,
            loss_percent,
            average_rtt,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingReport {
    pub address: IpAddr,
    pub status: ScanStatus,
    pub stats: Vec<PingStat>,
    pub summary: PingSummary,
}

/// Durations as fractional milliseconds.
mod millis {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_nanos() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Duration::try_from_secs_f64(ms / 1000.0).map_err(D::Error::custom)
    }
}

mod opt_millis {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_nanos() as f64 / 1_000_000.0)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|ms| Duration::try_from_secs_f64(ms / 1000.0).map_err(D::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn ping_summary_loss_and_average() {
        let stats = vec![
            PingStat::reply(ADDR, Duration::from_millis(10)),
            PingStat::reply(ADDR, Duration::from_millis(20)),
            PingStat::failed(ADDR, "request timed out"),
            PingStat::reply(ADDR, Duration::from_millis(30)),
        ];
        let summary = PingSummary::from_stats(ADDR, &stats);
        assert_eq!(summary.sent, 4);
        assert_eq!(summary.received, 3);
        assert_eq!(summary.loss_percent, Some(25.0));
        assert_eq!(summary.average_rtt, Some(Duration::from_millis(20)));
    }

    #[test]
    fn ping_summary_without_pings_has_no_ratios() {
        let summary = PingSummary::from_stats(ADDR, &[]);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.loss_percent, None);
        assert_eq!(summary.average_rtt, None);
    }

    #[test]
    fn ping_summary_all_lost() {
        let stats = vec![PingStat::failed(ADDR, "unreachable"); 2];
        let summary = PingSummary::from_stats(ADDR, &stats);
        assert_eq!(summary.loss_percent, Some(100.0));
        assert_eq!(summary.average_rtt, None);
    }

    #[test]
    fn outcome_serializes_latency_in_millis() {
        let outcome = ProbeOutcome::new(
            SocketAddr::new(ADDR, 22),
            true,
            Duration::from_micros(1500),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["port"], 22);
        assert_eq!(json["response_time_ms"], 1.5);
        assert!(json["observed_at"].as_str().unwrap().contains('T'));
        assert_eq!(outcome.service_name(), "SSH");
    }
}
