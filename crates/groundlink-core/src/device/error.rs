//! Device errors

use thiserror::Error;

/// Errors that end (or prevent) a device session
///
/// A read timeout is not represented here: it is the normal idle state and
/// surfaces as `Ok(None)` from [`LineSource::read_line`](super::LineSource::read_line).
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum DeviceError {
    #[error("Failed to open {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Device not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    pub(crate) fn open_failed(port: &str, reason: impl ToString) -> Self {
        Self::OpenFailed {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }
}
