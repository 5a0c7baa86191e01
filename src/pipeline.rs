//! Wraps each CLI command with timing, logging, a cancellation notice and error translation.

use std::future::Future;
use std::time::{Duration, Instant};

use time::macros::format_description;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ScanError;

/// Run `command`, logging its start and finish.
///
/// Returns `Ok(None)` if the command ended with [`ScanError::Cancelled`]; an
/// interruption is not a failure. Other errors are logged and returned.
pub async fn run_command<T, F>(
    name: &str,
    cancel: &CancellationToken,
    command: F,
) -> anyhow::Result<Option<T>>
where
    F: Future<Output = Result<T, ScanError>>,
{
    let started = Instant::now();
    info!(command = name, "command started: {} at {}", name, clock_now());

    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            cancel.cancelled().await;
            info!("[{}] interrupted by user, cleaning up...", clock_now());
        }
    });

    let res = command.await;
    watcher.abort();
    let elapsed = format_elapsed(started.elapsed());

    match res {
        Ok(value) => {
            if cancel.is_cancelled() {
                warn!(command = name, "command interrupted: {}, elapsed {}", name, elapsed);
            } else {
                info!(command = name, "command finished: {}, elapsed {}", name, elapsed);
            }
            Ok(Some(value))
        }
        Err(ScanError::Cancelled) => {
            warn!(command = name, "command interrupted: {}, elapsed {}", name, elapsed);
            Ok(None)
        }
        Err(e) => {
            error!(
                command = name,
                code = e.code(),
                "command failed: {}, elapsed {}, error: {}",
                name,
                elapsed,
                e
            );
            Err(e.into())
        }
    }
}

/// `mm:ss.fff`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let minutes = total_ms / 60_000;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{minutes:02}:{seconds:02}.{millis:03}")
}

fn clock_now() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| String::from("--:--:--"))
}
