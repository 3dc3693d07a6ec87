//! Motion sample types and the wire codec.
//!
//! Every sample travels to clients as one flat JSON object per text frame:
//! `{"pitch":..,"yaw":..,"roll":..,"timestamp":..}`.

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// A single orientation reading, ready for the wire.
///
/// Angles are in radians, `timestamp` is fractional seconds since the
/// source's epoch. Only finite values are ever encoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotionSample {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub timestamp: f64,
}

impl MotionSample {
    pub fn new(pitch: f64, yaw: f64, roll: f64, timestamp: f64) -> Self {
        Self {
            pitch,
            yaw,
            roll,
            timestamp,
        }
    }

    /// Returns the name of the first non-finite field, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        [
            ("pitch", self.pitch),
            ("yaw", self.yaw),
            ("roll", self.roll),
            ("timestamp", self.timestamp),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| name)
    }

    pub fn is_finite(&self) -> bool {
        self.first_non_finite().is_none()
    }
}

/// A reading as delivered by the sensor, before any filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub timestamp: f64,

    /// Whether the sensor reports a calibrated orientation.
    pub calibrated: bool,
}

impl RawSample {
    pub fn new(pitch: f64, yaw: f64, roll: f64, timestamp: f64) -> Self {
        Self {
            pitch,
            yaw,
            roll,
            timestamp,
            calibrated: true,
        }
    }

    /// Marks the reading as coming from an uncalibrated sensor.
    pub fn uncalibrated(mut self) -> Self {
        self.calibrated = false;
        self
    }

    /// Strips the confidence indicator, leaving the wire value.
    pub fn sample(&self) -> MotionSample {
        MotionSample::new(self.pitch, self.yaw, self.roll, self.timestamp)
    }
}

/// Encodes a sample as a flat JSON object.
///
/// Non-finite values are rejected rather than serialized as `null`.
pub fn encode(sample: &MotionSample) -> Result<String> {
    if let Some(field) = sample.first_non_finite() {
        return Err(RelayError::NonFiniteField(field));
    }
    Ok(serde_json::to_string(sample)?)
}

/// Decodes a sample from its wire form.
pub fn decode(text: &str) -> Result<MotionSample> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_encode_field_names() {
        let sample = MotionSample::new(0.1, 0.2, 0.3, 100.0);
        let json = encode(&sample).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["pitch"], 0.1);
        assert_eq!(object["yaw"], 0.2);
        assert_eq!(object["roll"], 0.3);
        assert_eq!(object["timestamp"], 100.0);
    }

    #[test]
    fn test_encode_is_plain_decimal() {
        let sample = MotionSample::new(-1.5, 0.25, 3.0, 1_700_000_000.125);
        let json = encode(&sample).unwrap();

        assert!(!json.contains('\\'));
        assert!(json.contains("\"pitch\":-1.5"));
        assert!(json.contains("\"timestamp\":1700000000.125"));
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let nan = MotionSample::new(f64::NAN, 0.0, 0.0, 1.0);
        assert!(matches!(encode(&nan), Err(RelayError::NonFiniteField("pitch"))));

        let inf = MotionSample::new(0.0, 0.0, f64::INFINITY, 1.0);
        assert!(matches!(encode(&inf), Err(RelayError::NonFiniteField("roll"))));

        let ts = MotionSample::new(0.0, 0.0, 0.0, f64::NEG_INFINITY);
        assert!(matches!(encode(&ts), Err(RelayError::NonFiniteField("timestamp"))));
    }

    #[test]
    fn test_reencode_is_stable() {
        let samples = [
            MotionSample::new(0.0, 0.0, 0.0, 0.0),
            MotionSample::new(0.1, 0.2, 0.3, 100.0),
            MotionSample::new(-std::f64::consts::PI, 1.0e-12, 2.5e10, 1_699_999_999.999),
            MotionSample::new(FRAC_PI_4, -FRAC_PI_2, -0.0, 42.5),
        ];

        for sample in samples {
            let first = encode(&sample).unwrap();
            let second = encode(&decode(&first).unwrap()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_decode_rejects_extra_and_missing_fields() {
        assert!(decode(r#"{"pitch":0.1,"yaw":0.2,"roll":0.3}"#).is_err());
        assert!(decode(r#"{"pitch":0.1,"yaw":0.2,"roll":0.3,"timestamp":1.0,"x":1}"#).is_err());
    }

    #[test]
    fn test_raw_sample_confidence() {
        let raw = RawSample::new(0.1, 0.2, 0.3, 4.0);
        assert!(raw.calibrated);
        assert!(!raw.uncalibrated().calibrated);
        assert_eq!(raw.sample(), MotionSample::new(0.1, 0.2, 0.3, 4.0));
    }
}
