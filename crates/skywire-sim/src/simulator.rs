//! Sensor simulator.
//!
//! Produces plausible readings for a drone hovering a few centimetres above
//! the ground: two downward distance sensors, optical flow, raw IMU and GPS.
//! Every line goes through the shared encoder, so the simulator and a live
//! bridge emit byte-identical formats.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use skywire_core::line::{
    ACK_PREFIX, DistanceSensor, FlightMessage, GpsRawInt, OpticalFlowMessage, RawImu, encode,
};

const MIN_ALTITUDE_M: f64 = 0.15;
const MAX_ALTITUDE_M: f64 = 0.20;
const INITIAL_ALTITUDE_M: f64 = 0.17;
/// Satellite count is re-rolled every this many ticks.
const SATS_REROLL_TICKS: u64 = 25;
const MIN_DISTANCE_CM: f64 = 5.0;

/// Random-walk state of the simulated vehicle.
pub struct SensorSimulator {
    rng: StdRng,
    altitude_m: f64,
    lat_deg: f64,
    lon_deg: f64,
    satellites: u8,
    tick: u64,
}

impl SensorSimulator {
    /// Deterministic simulator for `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            altitude_m: INITIAL_ALTITUDE_M,
            lat_deg: 0.0,
            lon_deg: 0.0,
            satellites: 0,
            tick: 0,
        }
    }

    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance one tick and return its messages in wire order:
    /// D0, D1, optical flow, IMU, GPS.
    pub fn next_messages(&mut self) -> [FlightMessage; 5] {
        self.update_state();
        [
            FlightMessage::DistanceSensor(self.distance(0)),
            FlightMessage::DistanceSensor(self.distance(1)),
            FlightMessage::OpticalFlow(self.optical_flow()),
            FlightMessage::RawImu(self.imu()),
            FlightMessage::GpsRawInt(self.gps()),
        ]
    }

    /// Advance one tick and return the encoded batch, one
    /// acknowledgement-prefixed line per message, each newline-terminated.
    pub fn next_batch(&mut self) -> String {
        let mut batch = String::new();
        for msg in &self.next_messages() {
            if let Some(line) = encode(msg) {
                batch.push_str(ACK_PREFIX);
                batch.push_str(&line);
                batch.push('\n');
            }
        }
        batch
    }

    fn update_state(&mut self) {
        self.tick += 1;
        self.altitude_m = (self.altitude_m + self.rng.random_range(-0.01..=0.01))
            .clamp(MIN_ALTITUDE_M, MAX_ALTITUDE_M);
        if self.tick % SATS_REROLL_TICKS == 0 {
            self.satellites = self.rng.random_range(5..=12);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn distance(&mut self, id: u8) -> DistanceSensor {
        let cm = (self.altitude_m * 100.0 + self.rng.random_range(-2.0..=2.0)).max(MIN_DISTANCE_CM);
        DistanceSensor {
            id,
            current_distance: cm as u16,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn optical_flow(&mut self) -> OpticalFlowMessage {
        let ground = (self.altitude_m + self.rng.random_range(-0.02..=0.02)).max(MIN_ALTITUDE_M);
        OpticalFlowMessage {
            flow_x: self.rng.random_range(-1..=1),
            flow_y: self.rng.random_range(-1..=1),
            flow_comp_m_x: self.rng.random_range(-0.5..=0.5),
            flow_comp_m_y: self.rng.random_range(-0.5..=0.5),
            ground_distance: ground as f32,
            quality: self.rng.random_range(40..=50),
        }
    }

    fn imu(&mut self) -> RawImu {
        RawImu {
            xacc: self.rng.random_range(-40..=-30),
            yacc: self.rng.random_range(-35..=-25),
            zacc: -980 + self.rng.random_range(-5..=5),
            xgyro: self.rng.random_range(-3..=3),
            ygyro: self.rng.random_range(-3..=3),
            zgyro: self.rng.random_range(-2..=2),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn gps(&mut self) -> GpsRawInt {
        self.lat_deg += self.rng.random_range(-1e-6..=1e-6);
        self.lon_deg += self.rng.random_range(-1e-6..=1e-6);
        GpsRawInt {
            lat: (self.lat_deg * 1e7).round() as i32,
            lon: (self.lon_deg * 1e7).round() as i32,
            alt: (self.altitude_m * 1000.0).round() as i32,
            satellites_visible: self.satellites,
        }
    }
}
