//! Line encoder: typed messages back into wire lines.

use super::types::{DistanceSensor, FlightMessage, GpsRawInt, OpticalFlowMessage, RawImu, Record};

/// Format a flight-controller message as a protocol line (no newline).
///
/// Returns `None` for message types the protocol does not carry.
pub fn encode(msg: &FlightMessage) -> Option<String> {
    match msg {
        FlightMessage::DistanceSensor(m) => Some(distance_sensor(m)),
        FlightMessage::OpticalFlow(m) => Some(optical_flow(m)),
        FlightMessage::RawImu(m) => Some(raw_imu(m)),
        FlightMessage::GpsRawInt(m) => Some(gps_raw_int(m)),
        FlightMessage::Other { .. } => None,
    }
}

fn distance_sensor(m: &DistanceSensor) -> String {
    format!("D{}:{}cm", m.id, m.current_distance)
}

fn optical_flow(m: &OpticalFlowMessage) -> String {
    let ground = if m.ground_distance > 0.0 {
        m.ground_distance
    } else {
        0.0
    };
    format!(
        "F:X{} Y{} M_X{:.3} M_Y{:.3} D{:.2} Q{}",
        m.flow_x, m.flow_y, m.flow_comp_m_x, m.flow_comp_m_y, ground, m.quality
    )
}

fn raw_imu(m: &RawImu) -> String {
    format!(
        "I:A{},{},{} G{},{},{}",
        m.xacc, m.yacc, m.zacc, m.xgyro, m.ygyro, m.zgyro
    )
}

fn gps_raw_int(m: &GpsRawInt) -> String {
    let lat = f64::from(m.lat) / 1e7;
    let lon = f64::from(m.lon) / 1e7;
    let alt = f64::from(m.alt) / 1000.0;
    format!("G:{lat:.6},{lon:.6} A{alt:.1} S{}", m.satellites_visible)
}

/// Re-serialize a decoded record into its wire line.
///
/// Decoded fields are wire text, so this reproduces the original line
/// (minus any ack prefix) for every line [`super::decode`] accepts.
pub fn format_record(record: &Record) -> String {
    match record {
        Record::Distance(d) => format!("D{}:{}", d.sensor_id, d.distance_cm),
        Record::OpticalFlow(f) => format!(
            "F:X{} Y{} M_X{} M_Y{} D{} Q{}",
            f.flow_x, f.flow_y, f.flow_comp_m_x, f.flow_comp_m_y, f.ground_distance_m, f.quality
        ),
        Record::Imu(i) => format!(
            "I:A{},{},{} G{},{},{}",
            i.acc.x, i.acc.y, i.acc.z, i.gyro.x, i.gyro.y, i.gyro.z
        ),
        Record::Gps(g) => format!(
            "G:{},{} A{} S{}",
            g.latitude, g.longitude, g.altitude_m, g.satellites_visible
        ),
    }
}
