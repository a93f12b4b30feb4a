//! Record and flight-controller message types for the telemetry line protocol.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One decoded telemetry measurement.
///
/// Numeric fields hold the exact text received on the wire so that no
/// precision is lost between the producer and the observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Distance(Distance),
    OpticalFlow(OpticalFlow),
    Imu(Imu),
    Gps(Gps),
}

impl Record {
    /// Observer-facing key for this record (`D0`, `D1`, `F`, `I`, `G`).
    pub fn key(&self) -> String {
        match self {
            Self::Distance(d) => format!("D{}", d.sensor_id),
            Self::OpticalFlow(_) => "F".to_string(),
            Self::Imu(_) => "I".to_string(),
            Self::Gps(_) => "G".to_string(),
        }
    }
}

/// Serializes as a single-entry map keyed by [`Record::key`], the shape the
/// dashboard consumes (`{"D0": "123cm"}`, `{"F": {...}}`, ...).
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        let key = self.key();
        match self {
            Self::Distance(d) => map.serialize_entry(&key, &d.distance_cm)?,
            Self::OpticalFlow(f) => map.serialize_entry(&key, f)?,
            Self::Imu(i) => map.serialize_entry(&key, i)?,
            Self::Gps(g) => map.serialize_entry(&key, g)?,
        }
        map.end()
    }
}

/// Rangefinder reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distance {
    pub sensor_id: u8,
    /// Value including its unit suffix, e.g. `"123cm"`.
    pub distance_cm: String,
}

/// Optical-flow sensor reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpticalFlow {
    pub flow_x: String,
    pub flow_y: String,
    pub flow_comp_m_x: String,
    pub flow_comp_m_y: String,
    pub ground_distance_m: String,
    pub quality: String,
}

/// A three-component vector in wire text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axes {
    pub x: String,
    pub y: String,
    pub z: String,
}

/// Raw accelerometer and gyroscope reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imu {
    pub acc: Axes,
    pub gyro: Axes,
}

impl Serialize for Imu {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Accel<'a> {
            xacc: &'a str,
            yacc: &'a str,
            zacc: &'a str,
        }

        #[derive(Serialize)]
        struct Gyro<'a> {
            xgyro: &'a str,
            ygyro: &'a str,
            zgyro: &'a str,
        }

        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(rename = "A")]
            acc: Accel<'a>,
            #[serde(rename = "G")]
            gyro: Gyro<'a>,
        }

        Wire {
            acc: Accel {
                xacc: &self.acc.x,
                yacc: &self.acc.y,
                zacc: &self.acc.z,
            },
            gyro: Gyro {
                xgyro: &self.gyro.x,
                ygyro: &self.gyro.y,
                zgyro: &self.gyro.z,
            },
        }
        .serialize(serializer)
    }
}

/// GPS fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gps {
    pub latitude: String,
    pub longitude: String,
    pub altitude_m: String,
    pub satellites_visible: String,
}

/// Flight-controller messages the live bridge knows how to forward.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightMessage {
    DistanceSensor(DistanceSensor),
    OpticalFlow(OpticalFlowMessage),
    RawImu(RawImu),
    GpsRawInt(GpsRawInt),
    /// Any other message type; never forwarded.
    Other { msg_type: String },
}

impl FlightMessage {
    /// MAVLink-style message type name.
    pub fn msg_type(&self) -> &str {
        match self {
            Self::DistanceSensor(_) => "DISTANCE_SENSOR",
            Self::OpticalFlow(_) => "OPTICAL_FLOW",
            Self::RawImu(_) => "RAW_IMU",
            Self::GpsRawInt(_) => "GPS_RAW_INT",
            Self::Other { msg_type } => msg_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceSensor {
    pub id: u8,
    /// Centimetres.
    pub current_distance: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpticalFlowMessage {
    pub flow_x: i16,
    pub flow_y: i16,
    pub flow_comp_m_x: f32,
    pub flow_comp_m_y: f32,
    /// Metres; negative means unknown.
    pub ground_distance: f32,
    pub quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawImu {
    pub xacc: i16,
    pub yacc: i16,
    pub zacc: i16,
    pub xgyro: i16,
    pub ygyro: i16,
    pub zgyro: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsRawInt {
    /// Degrees * 1e7.
    pub lat: i32,
    /// Degrees * 1e7.
    pub lon: i32,
    /// Millimetres above MSL.
    pub alt: i32,
    pub satellites_visible: u8,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn axes(x: &str, y: &str, z: &str) -> Axes {
        Axes {
            x: x.into(),
            y: y.into(),
            z: z.into(),
        }
    }

    #[test]
    fn distance_serializes_under_sensor_key() {
        let record = Record::Distance(Distance {
            sensor_id: 1,
            distance_cm: "42cm".into(),
        });
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"D1": "42cm"}));
    }

    #[test]
    fn imu_uses_dashboard_field_names() {
        let record = Record::Imu(Imu {
            acc: axes("-35", "-30", "-981"),
            gyro: axes("1", "0", "-2"),
        });
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"I": {
                "A": {"xacc": "-35", "yacc": "-30", "zacc": "-981"},
                "G": {"xgyro": "1", "ygyro": "0", "zgyro": "-2"},
            }})
        );
    }

    #[test]
    fn gps_serializes_flat_fields() {
        let record = Record::Gps(Gps {
            latitude: "51.500000".into(),
            longitude: "-0.120000".into(),
            altitude_m: "12.5".into(),
            satellites_visible: "9".into(),
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["G"]["altitude_m"], "12.5");
        assert_eq!(value["G"]["satellites_visible"], "9");
    }

    #[test]
    fn other_message_reports_its_own_type() {
        let msg = FlightMessage::Other {
            msg_type: "HEARTBEAT".into(),
        };
        assert_eq!(msg.msg_type(), "HEARTBEAT");
    }
}
