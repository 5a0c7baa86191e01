use crate::aggregator::ResultAggregator;
use crate::error::ScanError;
use crate::ports::PortSource;
use crate::progress::ProgressReporter;
use crate::resolve::resolve_host;
use crate::types::{ProbeOutcome, ScanReport, ScanStatus};
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A progress line is logged every this many completed probes.
pub const PROGRESS_LOG_INTERVAL: usize = 10;

/// Opens a TCP connection to a socket address. The probe engine only cares
/// whether the handshake completes.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, target: SocketAddr) -> impl Future<Output = io::Result<()>> + Send;
}

/// Plain `tokio` TCP connect; the stream is dropped as soon as it is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    async fn connect(&self, target: SocketAddr) -> io::Result<()> {
        TcpStream::connect(target).await.map(drop)
    }
}

/// Validated engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub timeout: Duration,
    pub concurrency: usize,
}

impl ScanConfig {
    /// Rejects a zero timeout and a concurrency outside `1..=Semaphore::MAX_PERMITS`.
    pub fn new(timeout_ms: u64, concurrency: usize) -> Result<Self, ScanError> {
        if concurrency == 0 {
            return Err(ScanError::InvalidConfiguration(
                "concurrency must be greater than zero".into(),
            ));
        }
        if concurrency > Semaphore::MAX_PERMITS {
            return Err(ScanError::InvalidConfiguration(format!(
                "concurrency {concurrency} exceeds the maximum of {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if timeout_ms == 0 {
            return Err(ScanError::InvalidConfiguration(
                "timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            timeout: Duration::from_millis(timeout_ms),
            concurrency,
        })
    }
}

/// Attempt one connection, racing it against `timeout` and `cancel`.
///
/// Returns `None` only when `cancel` fires first; refusals, errors and timeouts
/// are closed outcomes carrying the time it took to fail.
pub async fn probe_port<C: Connector>(
    connector: &C,
    target: SocketAddr,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<ProbeOutcome> {
    let start = Instant::now();
    let is_open = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        res = time::timeout(timeout, connector.connect(target)) => matches!(res, Ok(Ok(()))),
    };
    Some(ProbeOutcome::new(target, is_open, start.elapsed()))
}

/// Bounded-concurrency TCP connect scanner for a single address.
#[derive(Debug)]
pub struct Scanner<C = TcpConnector> {
    connector: Arc<C>,
    config: ScanConfig,
}

impl Scanner<TcpConnector> {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Scanner<C> {
    pub fn with_connector(config: ScanConfig, connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Probe every port in `ports` once.
    ///
    /// - At most `concurrency` connects are in flight; a permit is taken before a
    ///   probe task is spawned and released as soon as its attempt resolves.
    /// - Every outcome is recorded by the probe task itself and relayed, in
    ///   completion order, to `observer` if one is given.
    /// - Once `cancel` fires no further probe is admitted; in-flight probes abort
    ///   and the report covers only ports that produced an outcome.
    pub async fn scan(
        &self,
        address: IpAddr,
        ports: &[u16],
        cancel: &CancellationToken,
        observer: Option<mpsc::UnboundedSender<ProbeOutcome>>,
    ) -> ScanReport {
        let started = Instant::now();
        let total = ports.len();
        let aggregator = Arc::new(ResultAggregator::new(total));
        let gate = Arc::new(Semaphore::new(self.config.concurrency));
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = tokio::spawn(relay_outcomes(
            rx,
            ProgressReporter::starting_at(total, started.into_std()),
            observer,
        ));

        let mut set = JoinSet::new();
        for &port in ports {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&gate).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let connector = Arc::clone(&self.connector);
            let aggregator = Arc::clone(&aggregator);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let timeout = self.config.timeout;

            set.spawn(async move {
                let target = SocketAddr::new(address, port);
                let outcome = probe_port(&*connector, target, timeout, &cancel).await;
                drop(permit);

                if let Some(outcome) = outcome {
                    aggregator.record(outcome.clone());
                    // Receiver lives until every sender is gone.
                    let _ = tx.send(outcome);
                }
            });
        }
        drop(tx);

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "probe task failed");
            }
        }
        if let Err(e) = relay.await {
            error!(error = %e, "outcome relay task failed");
        }

        let summary = aggregator.finalize();
        let status = if summary.probed() < total && cancel.is_cancelled() {
            ScanStatus::Cancelled
        } else {
            ScanStatus::Completed
        };

        ScanReport {
            target: address,
            status,
            elapsed: started.elapsed(),
            summary,
        }
    }
}

async fn relay_outcomes(
    mut rx: mpsc::UnboundedReceiver<ProbeOutcome>,
    mut progress: ProgressReporter,
    observer: Option<mpsc::UnboundedSender<ProbeOutcome>>,
) {
    while let Some(outcome) = rx.recv().await {
        let snapshot = progress.observe(&outcome);
        if outcome.is_open {
            info!(
                port = outcome.port,
                service = outcome.service_name(),
                "port {:05}: {} open ({:.1}ms)",
                outcome.port,
                outcome.service_name(),
                outcome.response_time.as_secs_f64() * 1000.0
            );
        }
        if snapshot.completed % PROGRESS_LOG_INTERVAL == 0 {
            info!(
                completed = snapshot.completed,
                total = snapshot.total,
                "progress: {:.1}% ({}/{})",
                snapshot.percent,
                snapshot.completed,
                snapshot.total
            );
        }
        if let Some(observer) = &observer {
            // A caller that stopped listening does not stop the scan.
            let _ = observer.send(outcome);
        }
    }
}

/// Everything a caller supplies to run one scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub host: String,
    pub ports: PortSource,
    pub timeout_ms: u64,
    pub concurrency: usize,
}

/// Validate, resolve and scan `request.host`, logging the banner and summary.
///
/// Fails before probing on invalid configuration or an unresolvable host, and with
/// [`ScanError::Cancelled`] if `cancel` fires during resolution. Cancellation
/// during the scan itself is not an error: the report carries
/// [`ScanStatus::Cancelled`] and the partial summary.
pub async fn scan_host(
    request: &ScanRequest,
    cancel: &CancellationToken,
    observer: Option<mpsc::UnboundedSender<ProbeOutcome>>,
) -> Result<ScanReport, ScanError> {
    scan_host_with(TcpConnector, request, cancel, observer).await
}

/// [`scan_host`] with a caller-supplied connector.
pub async fn scan_host_with<C: Connector>(
    connector: C,
    request: &ScanRequest,
    cancel: &CancellationToken,
    observer: Option<mpsc::UnboundedSender<ProbeOutcome>>,
) -> Result<ScanReport, ScanError> {
    let config = ScanConfig::new(request.timeout_ms, request.concurrency)?;

    info!("=== host-scan-rs port scan ===");
    info!(host = %request.host, "target: {}", request.host);
    info!(
        timeout_ms = request.timeout_ms,
        concurrency = config.concurrency,
        "timeout: {}ms, concurrency: {}",
        request.timeout_ms,
        config.concurrency
    );

    let ports = request.ports.resolve();
    let address = resolve_host(&request.host, cancel).await?;
    info!(%address, ports = ports.len(), "scanning {} ports on {}", ports.len(), address);

    let scanner = Scanner::with_connector(config, connector);
    let report = scanner.scan(address, &ports, cancel, observer).await;
    log_summary(&report);
    Ok(report)
}

fn log_summary(report: &ScanReport) {
    let summary = &report.summary;
    if report.status == ScanStatus::Cancelled {
        warn!(
            probed = summary.probed(),
            total = summary.total_ports,
            "scan interrupted after {} of {} ports",
            summary.probed(),
            summary.total_ports
        );
    }

    info!("=== scan summary ===");
    info!("ports scanned: {}", summary.probed());
    info!("open ports: {}", summary.open_count);
    info!("closed ports: {}", summary.closed_count);
    if !summary.open_ports.is_empty() {
        info!("=== open ports ===");
        for outcome in &summary.open_ports {
            info!(
                "port {:05}: {} (response time: {:.1}ms)",
                outcome.port,
                outcome.service_name(),
                outcome.response_time.as_secs_f64() * 1000.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Ports listed in `open` accept immediately, everything else is refused.
    struct FixedConnector {
        open: Vec<u16>,
    }

    impl Connector for FixedConnector {
        async fn connect(&self, target: SocketAddr) -> io::Result<()> {
            if self.open.contains(&target.port()) {
                Ok(())
            } else {
                Err(io::ErrorKind::ConnectionRefused.into())
            }
        }
    }

    struct HangingConnector;

    impl Connector for HangingConnector {
        async fn connect(&self, _target: SocketAddr) -> io::Result<()> {
            std::future::pending().await
        }
    }

    #[test]
    fn config_rejects_zero_concurrency() {
        let err = ScanConfig::new(1000, 0).unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfiguration(_)));
        assert!(ScanConfig::new(0, 10).is_err());
        assert!(ScanConfig::new(1000, Semaphore::MAX_PERMITS + 1).is_err());
        assert_eq!(ScanConfig::new(250, 4).unwrap().timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn probe_times_out_as_closed() {
        let cancel = CancellationToken::new();
        let target = SocketAddr::new(LOCALHOST, 9);
        let outcome = probe_port(&HangingConnector, target, Duration::from_millis(30), &cancel)
            .await
            .expect("not cancelled");
        assert!(!outcome.is_open);
        assert!(outcome.response_time >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn probe_returns_nothing_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let target = SocketAddr::new(LOCALHOST, 9);
        let outcome = probe_port(&HangingConnector, target, Duration::from_secs(5), &cancel).await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn scan_tallies_every_port() {
        let config = ScanConfig::new(100, 4).unwrap();
        let scanner = Scanner::with_connector(config, FixedConnector { open: vec![443, 22] });
        let ports: Vec<u16> = (1..=30).chain([443]).collect();
        let report = scanner
            .scan(LOCALHOST, &ports, &CancellationToken::new(), None)
            .await;

        assert_eq!(report.status, ScanStatus::Completed);
        let s = &report.summary;
        assert_eq!(s.total_ports, 31);
        assert_eq!(s.open_count + s.closed_count, s.total_ports);
        let open: Vec<u16> = s.open_ports.iter().map(|o| o.port).collect();
        assert_eq!(open, vec![22, 443]);
    }

    #[tokio::test]
    async fn empty_port_set_completes_immediately() {
        let scanner = Scanner::with_connector(ScanConfig::new(100, 1).unwrap(), HangingConnector);
        let report = scanner.scan(LOCALHOST, &[], &CancellationToken::new(), None).await;
        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.summary, Default::default());
    }

    #[tokio::test]
    async fn observer_sees_every_outcome() {
        let scanner = Scanner::with_connector(
            ScanConfig::new(100, 3).unwrap(),
            FixedConnector { open: vec![5] },
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ports: Vec<u16> = (1..=12).collect();
        let report = scanner
            .scan(LOCALHOST, &ports, &CancellationToken::new(), Some(tx))
            .await;

        let mut seen = Vec::new();
        while let Some(outcome) = rx.recv().await {
            seen.push(outcome.port);
        }
        seen.sort_unstable();
        assert_eq!(seen, ports);
        assert_eq!(report.summary.open_count, 1);
    }

    #[tokio::test]
    async fn scan_host_rejects_bad_config_before_resolving() {
        let request = ScanRequest {
            host: "no-such-host.invalid".into(),
            ports: PortSource::default(),
            timeout_ms: 100,
            concurrency: 0,
        };
        let err = scan_host(&request, &CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfiguration(_)));
    }
}
