//! # Localisation module
//!
//! Point clouds are expressed in the frame of the sensor that produced them. At the start of
//! each cycle the engine asks a [`TransformSource`] for the pose of that frame in the grid frame
//! at the cloud's timestamp.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod pose_buffer;
pub use pose_buffer::PoseBuffer;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use util::convert::Convert;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose (position and attitude) of a sensor frame in the grid frame.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The position of the sensor frame origin in the grid frame
    pub position_m: Vector3<f64>,

    /// The attitude of the sensor frame in the grid frame. This rotates a vector from the sensor
    /// frame into the grid frame.
    pub attitude_q: UnitQuaternion<f64>,
}

/// Transforms which do not change over time, keyed by frame name.
///
/// Useful for sensors rigidly mounted in an already fixed frame, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTransforms {
    poses: HashMap<String, Pose>,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of sensor poses in the grid frame.
pub trait TransformSource {
    /// Get the pose of `frame_id` in the grid frame at the given time.
    fn lookup(&self, frame_id: &str, stamp: &DateTime<Utc>) -> Result<Pose, LookupError>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LookupError {
    #[error("No transform is known for frame \"{0}\"")]
    UnknownFrame(String),

    #[error("No pose for frame \"{frame_id}\" within tolerance of {stamp}")]
    NoPoseNearStamp {
        frame_id: String,
        stamp: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(position_m: Vector3<f64>, attitude_q: UnitQuaternion<f64>) -> Self {
        Self {
            position_m,
            attitude_q,
        }
    }

    /// A level pose at the given planar position, rotated by `heading_rad` about Z.
    pub fn from_xy_heading(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector3::new(x_m, y_m, 0.0),
            attitude_q: UnitQuaternion::from_euler_angles(0.0, 0.0, heading_rad),
        }
    }

    /// Return the heading (angle to the positive X axis of the grid frame) in radians.
    pub fn get_heading(&self) -> f64 {
        self.attitude_q.euler_angles().2
    }

    /// Planar position of the sensor in the grid frame.
    pub fn position_xy(&self) -> Vector2<f64> {
        self.position_m.convert()
    }

    /// Transform a point from the sensor frame into the grid frame.
    pub fn transform_point(&self, point_m: &Vector3<f64>) -> Vector3<f64> {
        self.attitude_q.transform_vector(point_m) + self.position_m
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector3::zeros(),
            attitude_q: UnitQuaternion::identity(),
        }
    }
}

impl StaticTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pose of a frame, replacing any previous one.
    pub fn insert(&mut self, frame_id: &str, pose: Pose) {
        self.poses.insert(frame_id.to_string(), pose);
    }

    /// Builder form of [`StaticTransforms::insert`].
    pub fn with(mut self, frame_id: &str, pose: Pose) -> Self {
        self.insert(frame_id, pose);
        self
    }
}

impl TransformSource for StaticTransforms {
    fn lookup(&self, frame_id: &str, _stamp: &DateTime<Utc>) -> Result<Pose, LookupError> {
        self.poses
            .get(frame_id)
            .copied()
            .ok_or_else(|| LookupError::UnknownFrame(frame_id.to_string()))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_transform_point() {
        let pose = Pose::from_xy_heading(1.0, 2.0, FRAC_PI_2);

        let p = pose.transform_point(&Vector3::new(1.0, 0.0, 0.5));

        assert!((p - Vector3::new(1.0, 3.0, 0.5)).norm() < 1e-9);
        assert!((pose.get_heading() - FRAC_PI_2).abs() < 1e-9);
        assert_eq!(pose.position_xy(), Vector2::new(1.0, 2.0));
    }

    #[test]
    fn test_static_transforms() {
        let transforms =
            StaticTransforms::new().with("lidar", Pose::from_xy_heading(0.5, 0.5, 0.0));

        assert_eq!(
            transforms.lookup("lidar", &Utc::now()).unwrap().position_xy(),
            Vector2::new(0.5, 0.5)
        );
        assert_eq!(
            transforms.lookup("radar", &Utc::now()),
            Err(LookupError::UnknownFrame(String::from("radar")))
        );
    }
}
