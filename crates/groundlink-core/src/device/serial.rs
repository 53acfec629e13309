//! Serial port handling
//!
//! Opens the telemetry radio/USB link as 8N1 with a bounded read timeout and
//! enumerates candidate ports for diagnostics.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::{DeviceConnector, DeviceError, DeviceSession, LineReader, DEFAULT_BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor/product ID (if USB device)
    pub usb_id: Option<(u16, u16)>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            usb_id: None,
            product: None,
        }
    }

    /// Whether the port sits behind a USB adapter, where telemetry radios
    /// and flight computers usually attach
    pub fn is_usb(&self) -> bool {
        self.usb_id.is_some()
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

impl std::fmt::Display for PortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((vid, pid)) = self.usb_id {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        Ok(())
    }
}

/// USB ports first, each group by name; a name reported twice is kept once
fn order_candidates(mut ports: Vec<PortInfo>) -> Vec<PortInfo> {
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    ports.dedup_by(|later, earlier| later.name == earlier.name);
    ports.sort_by_key(|p| !p.is_usb());
    ports
}

/// Serial ports that could carry the telemetry link
pub fn list_ports() -> Vec<PortInfo> {
    match serialport::available_ports() {
        Ok(found) => order_candidates(found.into_iter().map(PortInfo::from).collect()),
        Err(e) => {
            tracing::debug!("serial port enumeration failed: {}", e);
            Vec::new()
        }
    }
}

/// Open a serial port as 8N1, no flow control, with the given read timeout
pub fn open_port(
    name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<Box<dyn SerialPort>, DeviceError> {
    let baud = if baud_rate == 0 {
        tracing::warn!("baud rate 0 for {}, using {}", name, DEFAULT_BAUD_RATE);
        DEFAULT_BAUD_RATE
    } else {
        baud_rate
    };

    let mut port = serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => DeviceError::PortNotFound(name.to_string()),
            _ => DeviceError::open_failed(name, e),
        })?;

    hold_control_lines(port.as_mut());
    Ok(port)
}

/// Keep DTR/RTS asserted so Arduino-style flight computers are not reset
/// into their bootloader when the port opens
fn hold_control_lines(port: &mut dyn SerialPort) {
    if let Err(e) = port.write_data_terminal_ready(true) {
        tracing::debug!("failed to set DTR high: {} (continuing)", e);
    }
    if let Err(e) = port.write_request_to_send(true) {
        tracing::debug!("failed to set RTS high: {} (continuing)", e);
    }
}

/// Opens sessions on a physical serial port
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    /// Create a connector for the given port
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl DeviceConnector for SerialConnector {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn connect(&mut self) -> Result<DeviceSession, DeviceError> {
        let port = open_port(&self.port_name, self.baud_rate, self.read_timeout)?;
        if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
            tracing::debug!("failed to clear input buffer: {} (continuing)", e);
        }
        Ok(DeviceSession::new(
            &self.port_name,
            self.baud_rate,
            LineReader::new(port),
        ))
    }
}
