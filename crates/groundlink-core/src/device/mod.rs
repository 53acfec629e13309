//! Telemetry device access
//!
//! Owns the connection to the line-oriented telemetry source. A
//! [`DeviceReader`] walks the session state machine
//! `Closed → Opening → Open → Closed`; each (re)open creates a fresh
//! [`DeviceSession`] through a [`DeviceConnector`].
//!
//! Read timeouts are the normal idle state and are reported as "no line",
//! never as errors. Any genuine I/O failure closes the session.

mod error;
mod reader;
pub mod serial;

pub use error::DeviceError;
pub use reader::LineReader;
pub use serial::{list_ports, open_port, PortInfo, SerialConnector};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::RawLine;

/// Default baud rate of the telemetry link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Longest line buffered before it is flushed without a terminator
pub const MAX_LINE_LEN: usize = 4096;

/// A source of complete lines
pub trait LineSource: Send {
    /// Read the next line
    ///
    /// `Ok(None)` means the read timed out with no complete line available.
    /// An `Err` ends the session.
    fn read_line(&mut self) -> Result<Option<RawLine>, DeviceError>;
}

/// Opens device sessions
pub trait DeviceConnector: Send {
    /// Identifier of the device (port name)
    fn port_name(&self) -> &str;

    /// Configured baud rate
    fn baud_rate(&self) -> u32;

    /// Open a new session
    fn connect(&mut self) -> Result<DeviceSession, DeviceError>;
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// No handle held
    Closed,
    /// Open in progress
    Opening,
    /// Reading lines
    Open,
}

/// One open-to-close lifetime of the device connection
pub struct DeviceSession {
    port_name: String,
    baud_rate: u32,
    opened_at: DateTime<Utc>,
    source: Box<dyn LineSource>,
}

impl DeviceSession {
    /// Wrap an open line source
    pub fn new(port_name: &str, baud_rate: u32, source: impl LineSource + 'static) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud_rate,
            opened_at: Utc::now(),
            source: Box::new(source),
        }
    }

    /// Port identifier
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Baud rate the session was opened with
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// When the session was opened
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Read the next line from the underlying source
    pub fn read_line(&mut self) -> Result<Option<RawLine>, DeviceError> {
        self.source.read_line()
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("opened_at", &self.opened_at)
            .finish_non_exhaustive()
    }
}

/// Drives the session lifecycle for one device
pub struct DeviceReader<C> {
    connector: C,
    session: Option<DeviceSession>,
    state: DeviceState,
}

impl<C: DeviceConnector> DeviceReader<C> {
    /// Create a reader (not yet open)
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            session: None,
            state: DeviceState::Closed,
        }
    }

    /// Current session state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The open session, if any
    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    /// The connector used to open sessions
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a fresh session, releasing any previous one first
    pub fn open(&mut self) -> Result<(), DeviceError> {
        self.close();
        self.state = DeviceState::Opening;
        tracing::debug!(
            "opening {} @ {}",
            self.connector.port_name(),
            self.connector.baud_rate()
        );

        match self.connector.connect() {
            Ok(session) => {
                tracing::info!("Opened {} @ {}", session.port_name(), session.baud_rate());
                self.session = Some(session);
                self.state = DeviceState::Open;
                Ok(())
            }
            Err(e) => {
                self.state = DeviceState::Closed;
                Err(e)
            }
        }
    }

    /// Read the next line from the open session
    ///
    /// `Ok(None)` on timeout. On error the session is closed before the
    /// error is returned.
    pub fn read_line(&mut self) -> Result<Option<RawLine>, DeviceError> {
        let session = self.session.as_mut().ok_or(DeviceError::NotOpen)?;
        match session.read_line() {
            Ok(line) => Ok(line),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Release the device handle
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let uptime = Utc::now() - session.opened_at();
            tracing::info!(
                "Closed {} after {}s",
                session.port_name(),
                uptime.num_seconds()
            );
        }
        self.state = DeviceState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct CursorConnector {
        data: &'static [u8],
        opens: usize,
        fail: bool,
    }

    impl DeviceConnector for CursorConnector {
        fn port_name(&self) -> &str {
            "mock0"
        }

        fn baud_rate(&self) -> u32 {
            9600
        }

        fn connect(&mut self) -> Result<DeviceSession, DeviceError> {
            if self.fail {
                return Err(DeviceError::PortNotFound("mock0".into()));
            }
            self.opens += 1;
            Ok(DeviceSession::new(
                "mock0",
                9600,
                LineReader::new(Cursor::new(self.data.to_vec())),
            ))
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut reader = DeviceReader::new(CursorConnector {
            data: b"a\n",
            opens: 0,
            fail: false,
        });
        assert_eq!(reader.state(), DeviceState::Closed);

        reader.open().unwrap();
        assert_eq!(reader.state(), DeviceState::Open);
        assert_eq!(reader.session().unwrap().port_name(), "mock0");
        assert!(reader.session().unwrap().opened_at() <= Utc::now());

        assert_eq!(reader.read_line().unwrap().unwrap().text(), "a");
        assert!(matches!(reader.read_line(), Err(DeviceError::Disconnected)));
        assert_eq!(reader.state(), DeviceState::Closed);
        assert!(reader.session().is_none());
        assert!(matches!(reader.read_line(), Err(DeviceError::NotOpen)));
    }

    #[test]
    fn test_reopen_creates_new_session() {
        let mut reader = DeviceReader::new(CursorConnector {
            data: b"a\n",
            opens: 0,
            fail: false,
        });
        reader.open().unwrap();
        reader.open().unwrap();
        assert_eq!(reader.connector().opens, 2);
        assert_eq!(reader.read_line().unwrap().unwrap().text(), "a");
    }

    #[test]
    fn test_open_failure_leaves_closed() {
        let mut reader = DeviceReader::new(CursorConnector {
            data: b"",
            opens: 0,
            fail: true,
        });
        assert!(reader.open().is_err());
        assert_eq!(reader.state(), DeviceState::Closed);
    }
}
