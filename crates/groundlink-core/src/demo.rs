//! Demo Mode - Simulated flight computer
//!
//! Generates the CSV telemetry stream of a rocket in powered ascent so the
//! relay and viewers can be exercised without hardware.
//! Emits one line every 150 ms: steady upward acceleration, jittery attitude,
//! and pressure/temperature following a standard-atmosphere profile.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

use crate::device::{DeviceConnector, DeviceError, DeviceSession, LineSource};
use crate::frame::RawLine;

/// Interval between simulated lines
pub const DEMO_LINE_INTERVAL: Duration = Duration::from_millis(150);

/// Port name reported by the demo connector
pub const DEMO_PORT_NAME: &str = "demo";

const G0: f64 = 9.81;
/// Upward acceleration in m/s² (about 1 g on top of gravity)
const A_UP: f64 = 10.0;
const DT_S: f64 = 0.15;
const MAX_VELOCITY: f64 = 2000.0;
const ALT_STEP_M: i64 = 100;
const MAX_ALTITUDE_M: i64 = 100_000;
const BASE_LAT: i64 = 6_039_290;
const BASE_LON: i64 = 532_410;

/// Static pressure in Pa at altitude `h` metres
pub fn pressure_at_height(h: f64) -> f64 {
    if h < 11000.0 {
        101325.0 * (1.0 - 0.0065 * h / 288.15).powf(5.2561)
    } else if h < 20000.0 {
        22632.0 * (-0.000157 * (h - 11000.0)).exp()
    } else if h < 32000.0 {
        5474.0 * (1.0 + 0.001 * (h - 20000.0) / 216.65).powf(-34.1632)
    } else if h < 47000.0 {
        868.0 * (1.0 - 0.0028 * (h - 32000.0) / 228.65).powf(12.2016)
    } else if h < 51000.0 {
        110.0 * (-0.000157 * (h - 47000.0)).exp()
    } else if h < 71000.0 {
        66.0 * (1.0 - 0.0028 * (h - 51000.0) / 270.65).powf(-12.2016)
    } else {
        0.12
    }
}

/// Air temperature in °C at altitude `h` metres
pub fn temperature_at_height(h: f64) -> f64 {
    if h < 11000.0 {
        15.0 - 0.0065 * h
    } else if h < 20000.0 {
        -56.5
    } else if h < 32000.0 {
        -56.5 + 0.001 * (h - 20000.0)
    } else if h < 47000.0 {
        -44.5 + 0.0028 * (h - 32000.0)
    } else if h < 51000.0 {
        -2.5
    } else if h < 71000.0 {
        -2.5 - 0.0028 * (h - 51000.0)
    } else {
        -58.5
    }
}

/// Flight computer simulator producing CSV telemetry lines
pub struct FlightSimulator {
    seq: u64,
    altitude: i64,
    velocity: f64,
    pitch: f64,
    roll: f64,
    yaw: f64,
    rng: StdRng,
}

impl Default for FlightSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightSimulator {
    /// Create a simulator on the pad
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            seq: 0,
            altitude: 0,
            velocity: 0.0,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            rng,
        }
    }

    /// Advance one tick and render the CSV line
    ///
    /// Layout: `t,seq,ax,ay,az,pitch,roll,yaw,temp,vel,press,lat,lon,alt`
    pub fn next_line(&mut self, elapsed_ms: u64) -> String {
        let ax = self.rng.gen_range(-20..20) as f64 / 1000.0;
        let ay = self.rng.gen_range(-20..20) as f64 / 1000.0;
        let az = (G0 + A_UP) / G0;

        self.pitch = wrap_signed(self.pitch + self.rng.gen_range(-200..200) as f64 / 100.0);
        self.roll = wrap_signed(self.roll + self.rng.gen_range(-200..200) as f64 / 100.0);
        self.yaw += self.rng.gen_range(-400..400) as f64 / 100.0;
        if self.yaw > 360.0 {
            self.yaw -= 360.0;
        }

        self.velocity = (self.velocity + A_UP * DT_S).min(MAX_VELOCITY);
        self.altitude = (self.altitude + ALT_STEP_M).min(MAX_ALTITUDE_M);

        let h = self.altitude as f64;
        let press = pressure_at_height(h);
        let temp = temperature_at_height(h);

        let seq = self.seq as i64;
        let lat = BASE_LAT + seq * 2;
        let lon = BASE_LON + seq * 2;

        let line = format!(
            "{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{},{},{}",
            elapsed_ms,
            self.seq,
            ax,
            ay,
            az,
            self.pitch,
            self.roll,
            self.yaw,
            temp,
            self.velocity,
            press,
            lat,
            lon,
            self.altitude
        );
        self.seq += 1;
        line
    }
}

fn wrap_signed(angle: f64) -> f64 {
    if angle > 180.0 {
        angle - 360.0
    } else if angle < -180.0 {
        angle + 360.0
    } else {
        angle
    }
}

/// Line source pacing the simulator at [`DEMO_LINE_INTERVAL`]
struct DemoSource {
    simulator: FlightSimulator,
    started: Instant,
    next_due: Instant,
    read_timeout: Duration,
}

impl LineSource for DemoSource {
    fn read_line(&mut self) -> Result<Option<RawLine>, DeviceError> {
        let now = Instant::now();
        if now < self.next_due {
            let wait = self.next_due - now;
            if wait > self.read_timeout {
                std::thread::sleep(self.read_timeout);
                return Ok(None);
            }
            std::thread::sleep(wait);
        }

        self.next_due += DEMO_LINE_INTERVAL;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        Ok(Some(RawLine::new(self.simulator.next_line(elapsed_ms))))
    }
}

/// Connector that opens simulated sessions instead of a serial port
#[derive(Debug, Clone)]
pub struct DemoConnector {
    baud_rate: u32,
    read_timeout: Duration,
    seed: Option<u64>,
}

impl DemoConnector {
    /// Create a demo connector
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
            seed: None,
        }
    }

    /// Use a fixed seed for every session
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl DeviceConnector for DemoConnector {
    fn port_name(&self) -> &str {
        DEMO_PORT_NAME
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn connect(&mut self) -> Result<DeviceSession, DeviceError> {
        let simulator = match self.seed {
            Some(seed) => FlightSimulator::with_seed(seed),
            None => FlightSimulator::new(),
        };
        let now = Instant::now();
        let source = DemoSource {
            simulator,
            started: now,
            next_due: now,
            read_timeout: self.read_timeout,
        };
        Ok(DeviceSession::new(DEMO_PORT_NAME, self.baud_rate, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode, TelemetryEvent};

    #[test]
    fn test_lines_decode_as_telemetry() {
        let mut sim = FlightSimulator::with_seed(7);
        for i in 0..50 {
            let line = sim.next_line(i * 150);
            match decode(&line) {
                TelemetryEvent::Telemetry(record) => {
                    assert_eq!(record.sequence, i.to_string());
                    assert_eq!(record.mission_time, (i * 150).to_string());
                }
                other => panic!("expected telemetry, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_ascent_profile() {
        let mut sim = FlightSimulator::with_seed(1);
        let first = decode(&sim.next_line(0));
        let first = first.as_record().unwrap();
        assert_eq!(first.altitude, 100.0);
        assert_eq!(first.velocity, 1.5);
        assert_eq!(first.accel_z, 2.02);
        assert_eq!(first.latitude, 6039290.0);
        assert_eq!(first.longitude, 532410.0);

        let second = decode(&sim.next_line(150));
        let second = second.as_record().unwrap();
        assert_eq!(second.altitude, 200.0);
        assert_eq!(second.latitude, 6039292.0);
        assert!(second.pressure < first.pressure);
        assert!(second.temperature < first.temperature);
    }

    #[test]
    fn test_attitude_and_lateral_bounds() {
        let mut sim = FlightSimulator::with_seed(42);
        for i in 0..2000 {
            let event = decode(&sim.next_line(i));
            let r = event.as_record().unwrap();
            assert!(r.accel_x.abs() <= 0.02);
            assert!(r.accel_y.abs() <= 0.02);
            assert!((-180.0..=180.0).contains(&r.pitch));
            assert!((-180.0..=180.0).contains(&r.roll));
            assert!(r.yaw <= 360.0);
            assert!(r.velocity <= MAX_VELOCITY);
            assert!(r.altitude <= MAX_ALTITUDE_M as f64);
        }
    }

    #[test]
    fn test_seeded_simulators_agree() {
        let mut a = FlightSimulator::with_seed(99);
        let mut b = FlightSimulator::with_seed(99);
        for i in 0..10 {
            assert_eq!(a.next_line(i), b.next_line(i));
        }
    }

    #[test]
    fn test_atmosphere_layers() {
        assert!((pressure_at_height(0.0) - 101325.0).abs() < 1e-6);
        assert_eq!(temperature_at_height(0.0), 15.0);
        assert_eq!(temperature_at_height(15000.0), -56.5);
        assert_eq!(pressure_at_height(80000.0), 0.12);
        assert_eq!(temperature_at_height(80000.0), -58.5);
    }

    #[test]
    fn test_demo_connector_paces_lines() {
        let mut connector =
            DemoConnector::new(57600, Duration::from_millis(1000)).with_seed(3);
        let mut session = connector.connect().unwrap();
        assert_eq!(session.port_name(), DEMO_PORT_NAME);

        let start = Instant::now();
        let first = session.read_line().unwrap().unwrap();
        let second = session.read_line().unwrap().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(140));
        assert!(decode(first.text()).as_record().is_some());
        assert!(decode(second.text()).as_record().is_some());
    }
}
