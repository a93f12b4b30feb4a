//! Line decoder for producer output.
//!
//! Tolerant reader: anything that does not match a known record shape is
//! dropped (`None`), never reported as an error. Producers share a noisy
//! radio link with partial lines, so garbage is expected.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{Axes, Distance, Gps, Imu, OpticalFlow, Record};

/// Prefix some producers put in front of every line they echo after a
/// successful radio transmit.
pub const ACK_PREFIX: &str = "[TX] ";

type Decoder = fn(&str) -> Option<Record>;

/// Prefix dispatch table, checked in order. Adding a record type means
/// adding a row here.
const DECODERS: &[(&str, Decoder)] = &[
    ("D0:", distance_0),
    ("D1:", distance_1),
    ("F:", optical_flow),
    ("I:", imu),
    ("G:", gps),
];

static FLOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^X(\S+) Y(\S+) M_X(\S+) M_Y(\S+) D(\S+) Q(\S+)").expect("static regex is valid")
});
static IMU_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^A(\S+) G(\S+)").expect("static regex is valid"));
static GPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) A(\S+) S(\S+)").expect("static regex is valid"));

/// Decode one raw producer line into a [`Record`].
///
/// Surrounding whitespace and an optional [`ACK_PREFIX`] are stripped first.
pub fn decode(line: &str) -> Option<Record> {
    let line = line.trim();
    let line = line.strip_prefix(ACK_PREFIX).unwrap_or(line);
    if line.is_empty() {
        return None;
    }

    DECODERS
        .iter()
        .find_map(|(prefix, decoder)| line.strip_prefix(prefix).map(|body| (body, decoder)))
        .and_then(|(body, decoder)| decoder(body))
}

fn distance_0(body: &str) -> Option<Record> {
    distance(0, body)
}

fn distance_1(body: &str) -> Option<Record> {
    distance(1, body)
}

fn distance(sensor_id: u8, body: &str) -> Option<Record> {
    let value = numeric(body.strip_suffix("cm")?)?;
    Some(Record::Distance(Distance {
        sensor_id,
        distance_cm: format!("{value}cm"),
    }))
}

fn optical_flow(body: &str) -> Option<Record> {
    let caps = FLOW_RE.captures(body)?;
    let field = |i: usize| caps.get(i).and_then(|m| numeric(m.as_str()));

    Some(Record::OpticalFlow(OpticalFlow {
        flow_x: field(1)?,
        flow_y: field(2)?,
        flow_comp_m_x: field(3)?,
        flow_comp_m_y: field(4)?,
        ground_distance_m: field(5)?,
        quality: field(6)?,
    }))
}

fn imu(body: &str) -> Option<Record> {
    let caps = IMU_RE.captures(body)?;
    Some(Record::Imu(Imu {
        acc: triple(caps.get(1)?.as_str())?,
        gyro: triple(caps.get(2)?.as_str())?,
    }))
}

fn gps(body: &str) -> Option<Record> {
    let caps = GPS_RE.captures(body)?;
    let (latitude, longitude) = caps.get(1)?.as_str().split_once(',')?;
    if longitude.contains(',') {
        return None;
    }

    Some(Record::Gps(Gps {
        latitude: numeric(latitude)?,
        longitude: numeric(longitude)?,
        altitude_m: numeric(caps.get(2)?.as_str())?,
        satellites_visible: numeric(caps.get(3)?.as_str())?,
    }))
}

/// Split `x,y,z`; exactly three numeric components.
fn triple(s: &str) -> Option<Axes> {
    let mut parts = s.split(',');
    let axes = Axes {
        x: numeric(parts.next()?)?,
        y: numeric(parts.next()?)?,
        z: numeric(parts.next()?)?,
    };
    match parts.next() {
        Some(_) => None,
        None => Some(axes),
    }
}

/// Keep the wire text verbatim, but only if it is a finite number.
fn numeric(s: &str) -> Option<String> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|_| s.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn ack_prefixed_distance() {
        let record = decode("[TX] D0:123cm").unwrap();
        assert_eq!(
            record,
            Record::Distance(Distance {
                sensor_id: 0,
                distance_cm: "123cm".into(),
            })
        );
    }

    #[test]
    fn second_distance_sensor() {
        let Some(Record::Distance(d)) = decode("D1:17cm") else {
            panic!("expected distance record");
        };
        assert_eq!(d.sensor_id, 1);
        assert_eq!(d.distance_cm, "17cm");
    }

    #[test]
    fn optical_flow_keeps_text() {
        let record = decode("F:X1 Y-1 M_X0.120 M_Y-0.050 D0.17 Q45").unwrap();
        assert_eq!(
            record,
            Record::OpticalFlow(OpticalFlow {
                flow_x: "1".into(),
                flow_y: "-1".into(),
                flow_comp_m_x: "0.120".into(),
                flow_comp_m_y: "-0.050".into(),
                ground_distance_m: "0.17".into(),
                quality: "45".into(),
            })
        );
    }

    #[test]
    fn imu_triples() {
        let Some(Record::Imu(imu)) = decode("[TX] I:A-35,-30,-981 G1,0,-2") else {
            panic!("expected imu record");
        };
        assert_eq!(imu.acc.z, "-981");
        assert_eq!(imu.gyro.x, "1");
        assert_eq!(imu.gyro.z, "-2");
    }

    #[test]
    fn gps_fix() {
        let Some(Record::Gps(fix)) = decode("G:51.500001,-0.120000 A0.2 S9") else {
            panic!("expected gps record");
        };
        assert_eq!(fix.latitude, "51.500001");
        assert_eq!(fix.longitude, "-0.120000");
        assert_eq!(fix.altitude_m, "0.2");
        assert_eq!(fix.satellites_visible, "9");
    }

    #[test]
    fn unknown_prefix_is_dropped() {
        assert!(decode("Started telemetry stream forwarding...").is_none());
        assert!(decode("[ERROR] Sending: timeout").is_none());
        assert!(decode("D2:10cm").is_none());
    }

    #[test]
    fn empty_and_blank_lines_are_dropped() {
        assert!(decode("").is_none());
        assert!(decode("   \n").is_none());
        assert!(decode("[TX] ").is_none());
    }

    #[test]
    fn malformed_fields_are_dropped() {
        // Missing quality field.
        assert!(decode("F:X1 Y-1 M_X0.120 M_Y-0.050 D0.17").is_none());
        // Two-component accelerometer.
        assert!(decode("I:A-35,-30 G1,0,-2").is_none());
        // Four-component gyro.
        assert!(decode("I:A-35,-30,-981 G1,0,-2,4").is_none());
        // No comma between lat/lon.
        assert!(decode("G:51.5 A0.2 S9").is_none());
        // Extra coordinate.
        assert!(decode("G:51.5,0.1,3 A0.2 S9").is_none());
        // Missing unit / non-numeric value.
        assert!(decode("D0:123").is_none());
        assert!(decode("D0:cm").is_none());
        assert!(decode("D0:abccm").is_none());
        assert!(decode("F:Xnan Y-1 M_X0.1 M_Y0.1 D0.1 Q4").is_none());
    }

    #[test]
    fn truncated_line_does_not_panic() {
        for line in ["D", "D0:", "F:", "F:X", "I:A", "G:", "G:,", "I:A,, G,,"] {
            assert!(decode(line).is_none(), "line {line:?} should be dropped");
        }
    }
}
