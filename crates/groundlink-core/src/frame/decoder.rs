//! Line classifier
//!
//! Three tiers, tried in order: brace-delimited JSON document, fixed-shape
//! CSV record, raw passthrough. A line that looks like a document but fails
//! to parse is never retried as CSV.

use super::{TelemetryEvent, TelemetryRecord};

/// Minimum number of CSV fields in a telemetry record
pub const TELEMETRY_FIELD_COUNT: usize = 14;

/// Decode one line of device output
///
/// Surrounding whitespace is ignored. Never fails: anything that is not a
/// valid document or a complete numeric record becomes [`TelemetryEvent::Raw`]
/// holding the trimmed line.
pub fn decode(line: &str) -> TelemetryEvent {
    let line = line.trim();

    if line.starts_with('{') && line.ends_with('}') {
        return match serde_json::from_str::<serde_json::Value>(line) {
            Ok(data) => TelemetryEvent::Json { data },
            Err(_) => raw(line),
        };
    }

    match parse_record(line) {
        Some(record) => TelemetryEvent::Telemetry(record),
        None => raw(line),
    }
}

fn raw(line: &str) -> TelemetryEvent {
    TelemetryEvent::Raw {
        raw: line.to_string(),
    }
}

/// Parse `t,seq,ax,ay,az,pitch,roll,yaw,temp,vel,press,lat,lon,alt`
fn parse_record(line: &str) -> Option<TelemetryRecord> {
    let parts: Vec<&str> = line
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() < TELEMETRY_FIELD_COUNT {
        return None;
    }

    let mut values = [0.0f64; TELEMETRY_FIELD_COUNT - 2];
    for (slot, field) in values.iter_mut().zip(&parts[2..TELEMETRY_FIELD_COUNT]) {
        *slot = parse_number(field)?;
    }
    let [
        accel_x,
        accel_y,
        accel_z,
        pitch,
        roll,
        yaw,
        temperature,
        velocity,
        pressure,
        latitude,
        longitude,
        altitude,
    ] = values;

    Some(TelemetryRecord {
        mission_time: parts[0].to_string(),
        sequence: parts[1].to_string(),
        accel_x,
        accel_y,
        accel_z,
        pitch,
        roll,
        yaw,
        temperature,
        velocity,
        pressure,
        latitude,
        longitude,
        altitude,
    })
}

/// Locale-independent decimal parse; `.` is the only decimal separator.
/// Non-finite spellings (`NaN`, `inf`) are rejected.
fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1.5"), Some(1.5));
        assert_eq!(parse_number("-0.02"), Some(-0.02));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("+7"), Some(7.0));
        assert_eq!(parse_number("1,5"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_whitespace_around_fields() {
        let event = decode("  1 , 2 ,3,4,5,6,7,8,9,10,11,12,13, 14  ");
        let record = event.as_record().expect("telemetry");
        assert_eq!(record.mission_time, "1");
        assert_eq!(record.sequence, "2");
        assert_eq!(record.altitude, 14.0);
    }

    #[test]
    fn test_empty_tokens_are_discarded() {
        // The doubled comma shifts nothing: the empty token is dropped
        let event = decode("1,2,,3,4,5,6,7,8,9,10,11,12,13,14");
        let record = event.as_record().expect("telemetry");
        assert_eq!(record.accel_x, 3.0);
        assert_eq!(record.altitude, 14.0);
    }

    #[test]
    fn test_extra_fields_ignored() {
        let event = decode("1,2,3,4,5,6,7,8,9,10,11,12,13,14,extra,fields");
        assert!(event.as_record().is_some());
    }

    #[test]
    fn test_free_form_leading_fields() {
        let event = decode("T+00:12,#42,0,0,1,0,0,0,20,0,1013,0,0,0");
        let record = event.as_record().expect("telemetry");
        assert_eq!(record.mission_time, "T+00:12");
        assert_eq!(record.sequence, "#42");
    }

    #[test]
    fn test_document_shaped_csv_is_not_a_record() {
        let line = "{1,2,3,4,5,6,7,8,9,10,11,12,13,14}";
        assert_eq!(
            decode(line),
            TelemetryEvent::Raw {
                raw: line.to_string()
            }
        );
    }
}
