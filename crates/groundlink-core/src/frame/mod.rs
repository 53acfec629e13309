//! Telemetry frames
//!
//! Typed events decoded from single lines of device output, plus the
//! classifier that produces them.
//!
//! Every non-empty line yields exactly one [`TelemetryEvent`]. Lines that do
//! not match a known shape are kept as [`TelemetryEvent::Raw`] so operators
//! still see them.

mod decoder;

pub use decoder::{decode, TELEMETRY_FIELD_COUNT};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of text received from the device, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    text: String,
    received_at: DateTime<Utc>,
}

impl RawLine {
    /// Create a raw line stamped with the current time
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_timestamp(text, Utc::now())
    }

    /// Create a raw line with an explicit receive timestamp
    pub fn with_timestamp(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }

    /// The line text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// When the line was received
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Whether the line carries nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Decode this line into an event
    pub fn decode(&self) -> TelemetryEvent {
        decode(&self.text)
    }
}

/// A complete numeric telemetry record
///
/// Field order matches the CSV layout emitted by the flight computer:
/// `t,seq,ax,ay,az,pitch,roll,yaw,temp,vel,press,lat,lon,alt`.
/// Serialized names are the short keys viewers consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Mission time, verbatim from the device
    #[serde(rename = "t")]
    pub mission_time: String,
    /// Sequence number, verbatim from the device
    #[serde(rename = "seq")]
    pub sequence: String,
    /// Acceleration along x (g)
    #[serde(rename = "ax")]
    pub accel_x: f64,
    /// Acceleration along y (g)
    #[serde(rename = "ay")]
    pub accel_y: f64,
    /// Acceleration along z (g)
    #[serde(rename = "az")]
    pub accel_z: f64,
    /// Pitch (degrees)
    pub pitch: f64,
    /// Roll (degrees)
    pub roll: f64,
    /// Yaw (degrees)
    pub yaw: f64,
    /// Temperature (°C)
    #[serde(rename = "temp")]
    pub temperature: f64,
    /// Vertical velocity (m/s)
    #[serde(rename = "vel")]
    pub velocity: f64,
    /// Static pressure
    #[serde(rename = "press")]
    pub pressure: f64,
    /// GPS latitude, in the device's fixed-point units
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// GPS longitude, in the device's fixed-point units
    #[serde(rename = "lon")]
    pub longitude: f64,
    /// Altitude (m)
    #[serde(rename = "alt")]
    pub altitude: f64,
}

/// The decoded result of one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryEvent {
    /// Fixed-shape numeric record
    Telemetry(TelemetryRecord),
    /// Structured document, passed through uninterpreted
    Json {
        /// Parsed document
        data: serde_json::Value,
    },
    /// Line that matched no known shape
    Raw {
        /// Line text
        raw: String,
    },
}

impl TelemetryEvent {
    /// Short name of the variant, as used in the `type` tag
    pub fn kind(&self) -> EventKind {
        match self {
            TelemetryEvent::Telemetry(_) => EventKind::Telemetry,
            TelemetryEvent::Json { .. } => EventKind::Json,
            TelemetryEvent::Raw { .. } => EventKind::Raw,
        }
    }

    /// The telemetry record, if this is one
    pub fn as_record(&self) -> Option<&TelemetryRecord> {
        match self {
            TelemetryEvent::Telemetry(record) => Some(record),
            _ => None,
        }
    }
}

/// Variant discriminant of a [`TelemetryEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum EventKind {
    Telemetry,
    Json,
    Raw,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Telemetry => "telemetry",
            EventKind::Json => "json",
            EventKind::Raw => "raw",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_line_detection() {
        assert!(RawLine::new("   \t").is_blank());
        assert!(RawLine::new("").is_blank());
        assert!(!RawLine::new(" x ").is_blank());
    }

    #[test]
    fn test_raw_wire_shape() {
        let event = TelemetryEvent::Raw {
            raw: "hello".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "raw", "raw": "hello"}));
    }

    #[test]
    fn test_json_wire_shape() {
        let event = TelemetryEvent::Json {
            data: json!({"a": 1}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "json", "data": {"a": 1}}));
    }

    #[test]
    fn test_telemetry_wire_shape_uses_short_keys() {
        let event = decode("1,2,3,4,5,6,7,8,9,10,11,12,13,14");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "telemetry");
        assert_eq!(value["t"], "1");
        assert_eq!(value["seq"], "2");
        assert_eq!(value["ax"], 3.0);
        assert_eq!(value["press"], 11.0);
        assert_eq!(value["alt"], 14.0);
        assert_eq!(value.as_object().unwrap().len(), 15);
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(decode("hello").kind(), EventKind::Raw);
        assert_eq!(decode("{}").kind(), EventKind::Json);
        assert_eq!(EventKind::Telemetry.to_string(), "telemetry");
    }
}
