use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use host_scan_rs::config::{AppConfig, DEFAULT_CONFIG_PATH};
use host_scan_rs::logging::{self, LogFormat};
use host_scan_rs::ping::{self, IcmpPinger, PingRequest};
use host_scan_rs::scanner::{self, ScanRequest};
use host_scan_rs::types::{PingReport, ScanReport, ScanStatus};
use host_scan_rs::pipeline;
use host_scan_rs::ports::{self, PortSource};

/// host-scan-rs: async TCP connect port scanner and ping tool for a single host.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "host-scan-rs",
    version,
    about = "Async TCP connect port scanner and ping tool for a single host.",
    long_about = None
)]
struct Cli {
    /// JSON settings file. Missing file means built-in defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level or filter directive (overridden by RUST_LOG).
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json.
    #[arg(long = "log-format", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check which TCP ports are open on a host.
    Scan {
        /// Host name or address to scan.
        #[arg(short = 'H', long, default_value = "localhost")]
        host: String,

        /// Ports to scan, e.g. `1-100` or `80,443,8080`. Defaults to common ports.
        #[arg(short = 'p', long = "port-range")]
        port_range: Option<String>,

        /// File with port specs, one or more per line, `#` comments allowed.
        #[arg(long = "ports-file", conflicts_with = "port_range")]
        ports_file: Option<PathBuf>,

        /// Connect timeout per port in milliseconds.
        #[arg(short = 't', long = "timeout")]
        timeout_ms: Option<u64>,

        /// Max concurrent TCP connect attempts.
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,

        /// Write the scan report as pretty JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Send ICMP echo requests to a host.
    Ping {
        /// Host name or address to ping.
        #[arg(short = 'H', long)]
        host: String,

        /// Number of echo requests.
        #[arg(short = 'c', long)]
        count: Option<u32>,

        /// Reply timeout in milliseconds.
        #[arg(short = 't', long = "timeout")]
        timeout_ms: Option<u64>,

        /// Write the ping report as pretty JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?.merge_env();

    logging::init_logging(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.log_format.unwrap_or(config.logging.format),
    )?;

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    match cli.command {
        Command::Scan {
            host,
            port_range,
            ports_file,
            timeout_ms,
            concurrency,
            output,
        } => {
            // A ports file is expanded up front; an empty result means no ports, not defaults.
            let ports = match ports_file {
                Some(path) => PortSource::List(ports::load_ports_from_path(path)?),
                None => PortSource::Spec(port_range.or(config.scan.port_range.clone())),
            };
            let request = ScanRequest {
                host,
                ports,
                timeout_ms: timeout_ms.unwrap_or(config.scan.timeout_ms),
                concurrency: concurrency.unwrap_or(config.scan.concurrency),
            };

            let report = pipeline::run_command(
                "scan",
                &cancel,
                scanner::scan_host(&request, &cancel, None),
            )
            .await?;

            if let Some(report) = report {
                print_scan_table(&request.host, &report);
                if let Some(path) = output.as_deref() {
                    write_json(path, &report);
                }
            }
        }
        Command::Ping {
            host,
            count,
            timeout_ms,
            output,
        } => {
            let request = PingRequest {
                host,
                count: count.unwrap_or(config.ping.count),
                timeout_ms: timeout_ms.unwrap_or(config.ping.timeout_ms),
            };
            let pinger = IcmpPinger::new();

            let report = pipeline::run_command(
                "ping",
                &cancel,
                ping::ping_host(&pinger, &request, &cancel),
            )
            .await?;

            if let Some(report) = report {
                print_ping_line(&request.host, &report);
                if let Some(path) = output.as_deref() {
                    write_json(path, &report);
                }
            }
        }
    }

    Ok(())
}

fn print_scan_table(host: &str, report: &ScanReport) {
    let summary = &report.summary;
    let port_w = 5usize;
    let mut service_w = "service".len();
    for o in &summary.open_ports {
        service_w = service_w.max(o.service_name().len());
    }
    let lat_w = "latency_ms".len();

    let state = match report.status {
        ScanStatus::Completed => "complete",
        ScanStatus::Cancelled => "interrupted",
    };
    println!(
        "\n{} ({}): open {} / closed {} / total {} [{}]",
        host,
        report.target,
        summary.open_count,
        summary.closed_count,
        summary.total_ports,
        state
    );
    if summary.open_ports.is_empty() {
        println!("No open ports found.");
        return;
    }
    println!(
        "{:>port_w$}  {:<service_w$}  {:>lat_w$}",
        "port",
        "service",
        "latency_ms",
        port_w = port_w,
        service_w = service_w,
        lat_w = lat_w
    );
    println!(
        "{:-<port_w$}  {:-<service_w$}  {:-<lat_w$}",
        "",
        "",
        "",
        port_w = port_w,
        service_w = service_w,
        lat_w = lat_w
    );
    for o in &summary.open_ports {
        println!(
            "{:>port_w$}  {:<service_w$}  {:>lat_w$.1}",
            o.port,
            o.service_name(),
            o.response_time.as_secs_f64() * 1000.0,
            port_w = port_w,
            service_w = service_w,
            lat_w = lat_w
        );
    }
}

fn print_ping_line(host: &str, report: &PingReport) {
    let s = &report.summary;
    let loss = s
        .loss_percent
        .map(|l| format!("{l:.1}% loss"))
        .unwrap_or_else(|| "no packets sent".to_string());
    let avg = s
        .average_rtt
        .map(|a| format!(", avg {:.1}ms", a.as_secs_f64() * 1000.0))
        .unwrap_or_default();
    println!(
        "\n{} ({}): sent {}, received {}, {}{}",
        host, report.address, s.sent, s.received, loss, avg
    );
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
    let res = File::create(path)
        .map_err(anyhow::Error::from)
        .and_then(|file| serde_json::to_writer_pretty(file, value).map_err(Into::into));
    match res {
        Ok(()) => println!("Wrote JSON report to {}", path.display()),
        Err(e) => eprintln!("Failed to write JSON to {}: {}", path.display(), e),
    }
}
