//! Relay reachability probe
//!
//! `kubectl port-forward` reports nothing useful on launch; the process
//! being alive does not mean the local socket accepts connections yet.
//! Key injection must not proceed until the relay is actually reachable,
//! so the probe retries a local TCP connect with a bounded budget.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Connect-probe `127.0.0.1:<port>` until it accepts, up to `attempts`
/// tries spaced `delay` apart. An interrupt on `cancel` aborts the probe
/// instead of waiting out the remaining retries.
pub async fn wait_reachable(
    port: u16,
    attempts: u32,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            bail!("relay probe interrupted");
        }
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => {
                tracing::debug!("relay on port {port} reachable after {attempt} attempt(s)");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!("relay probe {attempt}/{attempts} failed: {e}");
                if attempt < attempts {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => bail!("relay probe interrupted"),
                    }
                }
            }
        }
    }
    bail!("port relay on 127.0.0.1:{port} never became reachable after {attempts} attempts");
}
