//! Groundlink relay
//!
//! Reads telemetry from the configured serial port (or the flight simulator
//! with `TELEM_DEMO=1`), and prints every decoded event to stdout as one
//! JSON object per line. Exits on Ctrl-C.
//!
//! Usage: `groundlink-relay [config.json]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use groundlink_core::prelude::*;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = RelayConfig::load(config_path.as_deref()).context("loading configuration")?;
    tracing::info!(
        "groundlink {} port={} baud={} backpressure={:?} demo={}",
        groundlink_core::VERSION,
        config.port_name,
        config.baud_rate,
        config.backpressure,
        config.demo
    );

    let hub = BroadcastHub::new(config.subscriber_capacity, config.backpressure);
    let viewer = hub.subscribe();
    let cancel = CancellationToken::new();

    let ingest = (if config.demo {
        let connector = DemoConnector::new(config.baud_rate, config.read_timeout());
        Ingestor::new(connector, hub.clone(), config.ingest_options()).spawn(cancel.clone())
    } else {
        let connector =
            SerialConnector::new(&config.port_name, config.baud_rate, config.read_timeout());
        Ingestor::new(connector, hub.clone(), config.ingest_options()).spawn(cancel.clone())
    })
    .context("starting ingestion")?;

    let console = tokio::spawn(print_events(viewer, tokio::io::stdout()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
        _ = wait_for_exit(&ingest) => {
            tracing::warn!("Ingestion loop exited");
        }
    }

    cancel.cancel();
    let counters = ingest.counters();
    let result = tokio::task::spawn_blocking(move || ingest.join())
        .await
        .context("joining ingestion thread")?;
    // Last strong reference: the viewer drains what is queued, then ends
    drop(hub);
    match console.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("console output failed: {}", e),
        Err(e) => tracing::warn!("console task failed: {}", e),
    }

    let stats = counters.snapshot();
    tracing::info!(
        "lines={} telemetry={} json={} raw={} sessions={} read_failures={}",
        stats.lines,
        stats.telemetry,
        stats.json,
        stats.raw,
        stats.sessions,
        stats.read_failures
    );
    result.context("telemetry ingestion failed")
}

/// Console viewer: one JSON object per line
///
/// Returns once the hub is gone and every queued event has been written.
async fn print_events<W>(mut viewer: Subscription, mut out: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = viewer.recv().await {
        let mut line = match serde_json::to_vec(&*event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to encode event: {}", e);
                continue;
            }
        };
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(())
}

async fn wait_for_exit(ingest: &IngestHandle) {
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(250));
    while !ingest.is_finished() {
        ticker.tick().await;
    }
}
