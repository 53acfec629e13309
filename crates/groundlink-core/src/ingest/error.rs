//! Ingestion errors

use thiserror::Error;

use crate::device::DeviceError;

/// Conditions that terminate the ingestion loop
#[derive(Error, Debug)]
pub enum IngestError {
    /// The device could not be opened at startup
    #[error("Telemetry source unavailable: {0}")]
    InitialOpen(#[source] DeviceError),

    /// The ingestion thread could not be started
    #[error("Failed to start ingestion thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The ingestion thread panicked
    #[error("Ingestion thread panicked: {0}")]
    Panicked(String),
}
