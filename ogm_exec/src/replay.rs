//! # Recorded input data
//!
//! A recording is a JSON document holding the sensor poses and the clouds of each cycle, in the
//! serialised frame form they would have when crossing a process boundary. It lets the engine be
//! run offline over captured data.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{collections::HashMap, convert::TryFrom, fs, io, path::Path};

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use comms_if::eqpt::lidar::{CloudError, PointCloud, PointCloudFrame};
use serde::{Deserialize, Serialize};

use crate::{
    fusion::CycleInput,
    loc::{Pose, PoseBuffer},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Poses of each sensor frame in the grid frame
    #[serde(default)]
    pub poses: Vec<PoseSample>,

    /// The clouds for each cycle, in processing order
    pub cycles: Vec<RecordedCycle>,
}

/// The pose of one frame at one time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseSample {
    pub frame_id: String,

    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub pose: Pose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedCycle {
    pub raw: PointCloudFrame,
    pub obstacle: PointCloudFrame,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Couldn't read the recording: {0}")]
    IoError(#[from] io::Error),

    #[error("Couldn't deserialise the recording: {0}")]
    DeserialiseError(#[from] serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Recording {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let s = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&s)?)
    }

    /// Build a pose buffer holding every pose sample in the recording.
    pub fn pose_buffer(&self, tolerance_s: f64) -> PoseBuffer {
        let mut per_frame: HashMap<&str, usize> = HashMap::new();
        for sample in self.poses.iter() {
            *per_frame.entry(sample.frame_id.as_str()).or_insert(0) += 1;
        }
        let capacity = per_frame.values().copied().max().unwrap_or(1);

        let mut buffer = PoseBuffer::new(capacity, tolerance_s);
        for sample in self.poses.iter() {
            buffer.insert(&sample.frame_id, sample.timestamp, sample.pose);
        }

        buffer
    }
}

impl RecordedCycle {
    /// Record a pair of clouds in their serialised form.
    pub fn new(raw: &PointCloud, obstacle: &PointCloud) -> Self {
        Self {
            raw: PointCloudFrame::from(raw),
            obstacle: PointCloudFrame::from(obstacle),
        }
    }
}

impl TryFrom<RecordedCycle> for CycleInput {
    type Error = CloudError;

    fn try_from(cycle: RecordedCycle) -> Result<Self, Self::Error> {
        Ok(Self {
            raw: PointCloud::try_from(cycle.raw)?,
            obstacle: PointCloud::try_from(cycle.obstacle)?,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::loc::TransformSource;
    use chrono::TimeZone;
    use nalgebra::Point3;

    #[test]
    fn test_load_and_decode() {
        let stamp = Utc.timestamp_millis(1_600_000_000_250);
        let raw = PointCloud {
            timestamp: stamp,
            frame_id: String::from("lidar"),
            points: vec![Point3::new(1.0, 2.0, 0.5), Point3::new(-3.0, 0.25, 0.0)],
        };
        let obstacle = PointCloud::empty(stamp, "lidar");

        let recording = Recording {
            poses: vec![PoseSample {
                frame_id: String::from("lidar"),
                timestamp: stamp,
                pose: Pose::from_xy_heading(1.0, -1.0, 0.0),
            }],
            cycles: vec![RecordedCycle::new(&raw, &obstacle)],
        };

        let path = std::env::temp_dir().join("ogm_replay_test.json");
        fs::write(&path, serde_json::to_string(&recording).unwrap()).unwrap();

        let loaded = Recording::load(&path).unwrap();

        let buffer = loaded.pose_buffer(0.01);
        assert_eq!(
            buffer.lookup("lidar", &stamp).unwrap().position_m.x,
            1.0
        );

        let input = CycleInput::try_from(loaded.cycles[0].clone()).unwrap();
        assert_eq!(input.raw, raw);
        assert_eq!(input.obstacle, obstacle);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Recording::load("/nonexistent/recording.json"),
            Err(ReplayError::IoError(_))
        ));
    }
}
