//! Ingestion loop
//!
//! Pulls lines from a [`DeviceReader`], decodes them and publishes the
//! events to an [`EventSink`]. Runs on its own OS thread so device reads
//! never stall the async runtime serving viewers.
//!
//! Failure policy:
//! - read timeout: keep reading
//! - read error: close the session, wait `reconnect_delay`, reopen
//! - open failure at startup: terminate (unless `retry_initial_open`)
//! - open failure after a session existed: retry after `reconnect_delay`

mod error;

pub use error::IngestError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceConnector, DeviceReader};
use crate::frame::{EventKind, RawLine};
use crate::hub::EventSink;

/// Default pause between a session failure and the next open attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 200;

/// Longest uninterrupted sleep while waiting to reconnect
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Name of the ingestion thread
pub const INGEST_THREAD_NAME: &str = "groundlink-ingest";

/// Retry behaviour of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Pause before reopening after a failure
    pub reconnect_delay: Duration,
    /// Keep retrying when the very first open fails
    pub retry_initial_open: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            retry_initial_open: false,
        }
    }
}

/// Live counters, readable from other threads while the loop runs
#[derive(Debug, Default)]
pub struct IngestStats {
    lines: AtomicU64,
    telemetry: AtomicU64,
    json: AtomicU64,
    raw: AtomicU64,
    sessions: AtomicU64,
    read_failures: AtomicU64,
}

impl IngestStats {
    fn record(&self, kind: EventKind) {
        self.lines.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            EventKind::Telemetry => &self.telemetry,
            EventKind::Json => &self.json,
            EventKind::Raw => &self.raw,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            telemetry: self.telemetry.load(Ordering::Relaxed),
            json: self.json.load(Ordering::Relaxed),
            raw: self.raw.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestSnapshot {
    /// Non-empty lines decoded and published
    pub lines: u64,
    /// Lines decoded as flight-computer records
    pub telemetry: u64,
    /// Lines decoded as JSON documents
    pub json: u64,
    /// Lines passed through as raw text
    pub raw: u64,
    /// Sessions successfully opened
    pub sessions: u64,
    /// Sessions ended by an I/O error
    pub read_failures: u64,
}

/// The device → decoder → sink orchestrator
pub struct Ingestor<C, S> {
    reader: DeviceReader<C>,
    sink: S,
    options: IngestOptions,
    stats: Arc<IngestStats>,
}

impl<C: DeviceConnector, S: EventSink> Ingestor<C, S> {
    /// Create an ingestor for one device
    pub fn new(connector: C, sink: S, options: IngestOptions) -> Self {
        Self {
            reader: DeviceReader::new(connector),
            sink,
            options,
            stats: Arc::new(IngestStats::default()),
        }
    }

    /// Shared handle to the live counters
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Run until cancelled
    ///
    /// Returns `Ok(())` on cancellation and an error only when the device
    /// cannot be opened at startup.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<(), IngestError> {
        let mut opened_once = false;

        while !cancel.is_cancelled() {
            if let Err(e) = self.reader.open() {
                if !opened_once && !self.options.retry_initial_open {
                    tracing::error!(
                        "Failed to open {}: {}",
                        self.reader.connector().port_name(),
                        e
                    );
                    log_candidate_ports(self.reader.connector().port_name());
                    return Err(IngestError::InitialOpen(e));
                }
                tracing::warn!(
                    "Failed to reopen {}: {}",
                    self.reader.connector().port_name(),
                    e
                );
                if wait_or_cancel(cancel, self.options.reconnect_delay) {
                    break;
                }
                continue;
            }

            opened_once = true;
            self.stats.sessions.fetch_add(1, Ordering::Relaxed);
            self.pump(cancel);

            if cancel.is_cancelled() || wait_or_cancel(cancel, self.options.reconnect_delay) {
                break;
            }
        }

        self.reader.close();
        tracing::info!("Ingestion stopped");
        Ok(())
    }

    /// Read lines until the session ends or cancellation is observed
    fn pump(&mut self, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            match self.reader.read_line() {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => {}
                Err(e) => {
                    self.stats.read_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Serial read error: {}", e);
                    return;
                }
            }
        }
    }

    fn handle_line(&self, line: &RawLine) {
        if line.is_blank() {
            return;
        }
        tracing::debug!("RX RAW: {}", line.text().trim());

        let event = line.decode();
        self.stats.record(event.kind());
        self.sink.publish(event);
    }
}

impl<C, S> Ingestor<C, S>
where
    C: DeviceConnector + 'static,
    S: EventSink + 'static,
{
    /// Move the loop onto a dedicated, named OS thread
    pub fn spawn(mut self, cancel: CancellationToken) -> Result<IngestHandle, IngestError> {
        let stats = self.stats();
        let thread = std::thread::Builder::new()
            .name(INGEST_THREAD_NAME.to_string())
            .spawn(move || self.run(&cancel))?;
        Ok(IngestHandle { thread, stats })
    }
}

/// A running ingestion thread
pub struct IngestHandle {
    thread: JoinHandle<Result<(), IngestError>>,
    stats: Arc<IngestStats>,
}

impl IngestHandle {
    /// Live counters of the running loop
    pub fn stats(&self) -> IngestSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters, still readable after [`join`](Self::join)
    pub fn counters(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop to exit
    pub fn join(self) -> Result<(), IngestError> {
        self.thread.join().map_err(|panic| {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            IngestError::Panicked(msg)
        })?
    }
}

/// Sleep for `delay`, waking early on cancellation. Returns true if cancelled.
fn wait_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}

fn log_candidate_ports(configured: &str) {
    let ports = crate::device::list_ports();
    if ports.is_empty() {
        tracing::warn!("No serial ports detected");
        return;
    }
    if !ports.iter().any(|p| p.name == configured) {
        tracing::warn!("{} is not among the detected ports", configured);
    }
    for port in ports {
        tracing::info!("Available port: {}", port);
    }
}
