use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawGpsFix {
    pub longitude: f64,
    pub latitude: f64,
}

impl RawGpsFix {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Point `i` of `step` between `self` and `other`, evaluated as
    /// `start + (end - start) * i / step` so results are bit-stable.
    pub fn interpolate(&self, other: &RawGpsFix, i: usize, step: usize) -> RawGpsFix {
        let (i, step) = (i as f64, step as f64);
        RawGpsFix {
            longitude: self.longitude + (other.longitude - self.longitude) * i / step,
            latitude: self.latitude + (other.latitude - self.latitude) * i / step,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAccelSample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RawAccelSample {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// One accelerometer reading paired with one (possibly interpolated) GPS fix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSample {
    pub user_id: UserId,
    pub accelerometer: RawAccelSample,
    pub gps: RawGpsFix,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSample {
    pub road_state: String,
    pub agent_data: UnifiedSample,
}

impl ClassifiedSample {
    pub fn user_id(&self) -> UserId {
        self.agent_data.user_id
    }
}

/// A stored sample as returned by the record store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: i64,
    pub road_state: String,
    pub user_id: UserId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn from_sample(id: i64, sample: &ClassifiedSample) -> Self {
        let data = &sample.agent_data;
        PersistedRecord {
            id,
            road_state: sample.road_state.clone(),
            user_id: data.user_id,
            x: data.accelerometer.x,
            y: data.accelerometer.y,
            z: data.accelerometer.z,
            latitude: data.gps.latitude,
            longitude: data.gps.longitude,
            timestamp: data.timestamp,
        }
    }

    pub fn to_sample(&self) -> ClassifiedSample {
        ClassifiedSample {
            road_state: self.road_state.clone(),
            agent_data: UnifiedSample {
                user_id: self.user_id,
                accelerometer: RawAccelSample::new(self.x, self.y, self.z),
                gps: RawGpsFix::new(self.longitude, self.latitude),
                timestamp: self.timestamp,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interpolate_midpoint() {
        let a = RawGpsFix::new(10.0, 20.0);
        let b = RawGpsFix::new(20.0, 40.0);
        let mid = a.interpolate(&b, 1, 2);
        assert_relative_eq!(mid.longitude, 15.0);
        assert_relative_eq!(mid.latitude, 30.0);
    }

    #[test]
    fn test_classified_sample_wire_shape() {
        let sample = ClassifiedSample {
            road_state: "Smooth".to_string(),
            agent_data: UnifiedSample {
                user_id: 1,
                accelerometer: RawAccelSample::new(1, 2, 3),
                gps: RawGpsFix::new(50.45, 30.52),
                timestamp: "2026-01-01T00:00:00Z".parse().unwrap(),
            },
        };

        let json: serde_json::Value = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["road_state"], "Smooth");
        assert_eq!(json["agent_data"]["user_id"], 1);
        assert_eq!(json["agent_data"]["accelerometer"]["z"], 3);
        assert_eq!(json["agent_data"]["gps"]["latitude"], 30.52);
    }

    #[test]
    fn test_record_sample_conversion_keeps_fields() {
        let sample = ClassifiedSample {
            road_state: "Rough".to_string(),
            agent_data: UnifiedSample {
                user_id: 7,
                accelerometer: RawAccelSample::new(-4, 0, -16),
                gps: RawGpsFix::new(30.5, 50.4),
                timestamp: Utc::now(),
            },
        };
        let record = PersistedRecord::from_sample(3, &sample);
        assert_eq!(record.id, 3);
        assert_eq!(record.to_sample(), sample);
    }
}
