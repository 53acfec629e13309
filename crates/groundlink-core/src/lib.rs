//! # Groundlink Core Library
//!
//! Core functionality for the Groundlink telemetry relay.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Line classification into telemetry, JSON and raw events
//! - Serial device sessions with timeout-tolerant line reads
//! - A broadcast hub fanning events out to many viewers
//! - The ingestion loop tying them together, with reconnect on failure
//! - A simulated flight computer for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use groundlink_core::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = RelayConfig::from_env()?;
//! let hub = BroadcastHub::new(config.subscriber_capacity, config.backpressure);
//! let mut viewer = hub.subscribe();
//!
//! let connector = SerialConnector::new(&config.port_name, config.baud_rate, config.read_timeout());
//! let cancel = CancellationToken::new();
//! let handle = Ingestor::new(connector, hub.clone(), config.ingest_options()).spawn(cancel.clone())?;
//!
//! while let Some(event) = viewer.recv().await {
//!     println!("{}", serde_json::to_string(&*event)?);
//! }
//! ```

pub mod config;
pub mod demo;
pub mod device;
pub mod frame;
pub mod hub;
pub mod ingest;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigError, RelayConfig};
    pub use crate::demo::{DemoConnector, FlightSimulator};
    pub use crate::device::{
        DeviceConnector, DeviceError, DeviceReader, DeviceSession, DeviceState, LineReader,
        LineSource, SerialConnector,
    };
    pub use crate::frame::{decode, EventKind, RawLine, TelemetryEvent, TelemetryRecord};
    pub use crate::hub::{BackpressurePolicy, BroadcastHub, EventSink, Subscription};
    pub use crate::ingest::{IngestError, IngestHandle, IngestOptions, Ingestor};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
