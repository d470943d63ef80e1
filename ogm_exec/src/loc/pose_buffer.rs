//! Bounded, time-indexed pose history for each sensor frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use util::time::abs_diff_seconds;

use super::{LookupError, Pose, TransformSource};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Holds the most recent poses of each frame and answers lookups with the sample nearest in time.
#[derive(Debug, Clone)]
pub struct PoseBuffer {
    /// Maximum number of samples kept per frame
    capacity: usize,

    /// Largest allowed gap between a lookup stamp and the nearest sample
    tolerance_s: f64,

    /// Samples for each frame, sorted oldest first
    frames: HashMap<String, VecDeque<(DateTime<Utc>, Pose)>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PoseBuffer {
    pub fn new(capacity: usize, tolerance_s: f64) -> Self {
        Self {
            capacity: capacity.max(1),
            tolerance_s,
            frames: HashMap::new(),
        }
    }

    /// Add a sample for the given frame, evicting the oldest sample if the frame is full.
    pub fn insert(&mut self, frame_id: &str, stamp: DateTime<Utc>, pose: Pose) {
        let samples = self
            .frames
            .entry(frame_id.to_string())
            .or_insert_with(VecDeque::new);

        // Samples nearly always arrive in order, so search from the back
        let idx = samples
            .iter()
            .rposition(|(s, _)| *s <= stamp)
            .map(|i| i + 1)
            .unwrap_or(0);
        samples.insert(idx, (stamp, pose));

        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// Number of samples held for the frame.
    pub fn len(&self, frame_id: &str) -> usize {
        self.frames.get(frame_id).map(|s| s.len()).unwrap_or(0)
    }
}

impl TransformSource for PoseBuffer {
    fn lookup(&self, frame_id: &str, stamp: &DateTime<Utc>) -> Result<Pose, LookupError> {
        let samples = self
            .frames
            .get(frame_id)
            .ok_or_else(|| LookupError::UnknownFrame(frame_id.to_string()))?;

        let mut nearest: Option<(f64, &Pose)> = None;

        for (sample_stamp, pose) in samples.iter() {
            let diff_s = match abs_diff_seconds(sample_stamp, stamp) {
                Some(d) => d,
                None => continue,
            };

            match nearest {
                Some((best_s, _)) if best_s <= diff_s => (),
                _ => nearest = Some((diff_s, pose)),
            }
        }

        match nearest {
            Some((diff_s, pose)) if diff_s <= self.tolerance_s => Ok(*pose),
            _ => Err(LookupError::NoPoseNearStamp {
                frame_id: frame_id.to_string(),
                stamp: *stamp,
            }),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn stamp(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis(1_600_000_000_000 + ms)
    }

    #[test]
    fn test_nearest_within_tolerance() {
        let mut buffer = PoseBuffer::new(10, 0.05);
        buffer.insert("lidar", stamp(0), Pose::from_xy_heading(0.0, 0.0, 0.0));
        buffer.insert("lidar", stamp(100), Pose::from_xy_heading(1.0, 0.0, 0.0));

        let pose = buffer.lookup("lidar", &stamp(70)).unwrap();
        assert_eq!(pose.position_m.x, 1.0);

        let pose = buffer.lookup("lidar", &stamp(20)).unwrap();
        assert_eq!(pose.position_m.x, 0.0);

        assert_eq!(
            buffer.lookup("lidar", &stamp(50 + 60)).map(|p| p.position_m.x),
            Ok(1.0)
        );
        assert!(matches!(
            buffer.lookup("lidar", &(stamp(100) + Duration::milliseconds(51))),
            Err(LookupError::NoPoseNearStamp { .. })
        ));
    }

    #[test]
    fn test_unknown_frame() {
        let buffer = PoseBuffer::new(10, 0.05);
        assert_eq!(
            buffer.lookup("lidar", &stamp(0)),
            Err(LookupError::UnknownFrame(String::from("lidar")))
        );
    }

    #[test]
    fn test_capacity_and_order() {
        let mut buffer = PoseBuffer::new(2, 1.0);
        buffer.insert("lidar", stamp(200), Pose::from_xy_heading(2.0, 0.0, 0.0));
        buffer.insert("lidar", stamp(0), Pose::from_xy_heading(0.0, 0.0, 0.0));
        buffer.insert("lidar", stamp(100), Pose::from_xy_heading(1.0, 0.0, 0.0));

        // The oldest sample is evicted even when it arrived late
        assert_eq!(buffer.len("lidar"), 2);
        assert_eq!(
            buffer.lookup("lidar", &stamp(0)).map(|p| p.position_m.x),
            Ok(1.0)
        );
    }
}
