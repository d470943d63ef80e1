//! # Lidar Equipment Communications Module
//!
//! Point clouds arrive either directly as a [`PointCloud`], when the producer shares the
//! engine's process, or as a serialised [`PointCloudFrame`] when they cross a message boundary.
//! Both forms decode to the same points.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::convert::TryFrom;

use base64::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{serde::ts_milliseconds, DateTime, Utc};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Size of a single `f32` field in bytes.
const FIELD_SIZE: usize = 4;

/// Point step used when encoding a frame: tightly packed x, y, z.
const PACKED_POINT_STEP: u32 = 3 * FIELD_SIZE as u32;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A timestamped collection of 3D points in the frame of the sensor which produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    /// UTC timestamp at which the cloud was acquired
    pub timestamp: DateTime<Utc>,

    /// Name of the frame the points are expressed in
    pub frame_id: String,

    /// The points, in meters
    pub points: Vec<Point3<f32>>,
}

/// Byte offsets of the coordinate fields within one point record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointFields {
    pub x_offset: u32,
    pub y_offset: u32,
    pub z_offset: u32,
}

/// A serialisable point cloud frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudFrame {
    /// UTC timestamp at which the cloud was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Name of the frame the points are expressed in
    pub frame_id: String,

    /// Number of points in the frame
    pub width: u32,

    /// Length of one point record in bytes
    pub point_step: u32,

    /// Location of the little endian `f32` coordinates in each record
    pub fields: PointFields,

    /// The packed point records encoded in base64.
    pub b64_data: String,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CloudError {
    #[error("Failed to decode point cloud from base64: {0}")]
    B64DecodeError(DecodeError),

    #[error("The encoded frame data was the wrong size, expected {expected} bytes, found {found}")]
    FrameWrongSize { expected: usize, found: usize },

    #[error("A coordinate field at offset {offset} doesn't fit in a {point_step} byte point")]
    InvalidFieldOffset { offset: u32, point_step: u32 },
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl PointCloud {
    /// Create an empty cloud in the given frame.
    pub fn empty(timestamp: DateTime<Utc>, frame_id: &str) -> Self {
        Self {
            timestamp,
            frame_id: frame_id.into(),
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Default for PointFields {
    fn default() -> Self {
        Self {
            x_offset: 0,
            y_offset: FIELD_SIZE as u32,
            z_offset: 2 * FIELD_SIZE as u32,
        }
    }
}

impl TryFrom<PointCloudFrame> for PointCloud {
    type Error = CloudError;

    fn try_from(frame: PointCloudFrame) -> Result<Self, Self::Error> {
        // Check all fields fit inside a point record
        for &offset in [frame.fields.x_offset, frame.fields.y_offset, frame.fields.z_offset].iter() {
            if offset as usize + FIELD_SIZE > frame.point_step as usize {
                return Err(CloudError::InvalidFieldOffset {
                    offset,
                    point_step: frame.point_step,
                });
            }
        }

        // Decode the bytes from the base64 string
        let bytes = base64::decode(&frame.b64_data).map_err(CloudError::B64DecodeError)?;

        let expected = frame.width as usize * frame.point_step as usize;
        if bytes.len() != expected {
            return Err(CloudError::FrameWrongSize {
                expected,
                found: bytes.len(),
            });
        }

        // Read each record, the empty frame case gives no chunks
        let step = frame.point_step as usize;
        let points = match step {
            0 => Vec::new(),
            _ => bytes
                .chunks_exact(step)
                .map(|rec| {
                    let read = |offset: u32| {
                        let o = offset as usize;
                        LittleEndian::read_f32(&rec[o..o + FIELD_SIZE])
                    };

                    Point3::new(
                        read(frame.fields.x_offset),
                        read(frame.fields.y_offset),
                        read(frame.fields.z_offset),
                    )
                })
                .collect(),
        };

        Ok(Self {
            timestamp: frame.timestamp,
            frame_id: frame.frame_id,
            points,
        })
    }
}

impl From<&PointCloud> for PointCloudFrame {
    fn from(cloud: &PointCloud) -> Self {
        // Flatten into x, y, z order then write as little endian bytes
        let flat: Vec<f32> = cloud
            .points
            .iter()
            .flat_map(|p| vec![p.x, p.y, p.z])
            .collect();
        let mut bytes = vec![0u8; flat.len() * FIELD_SIZE];
        LittleEndian::write_f32_into(&flat, &mut bytes);

        Self {
            timestamp: cloud.timestamp,
            frame_id: cloud.frame_id.clone(),
            width: cloud.points.len() as u32,
            point_step: PACKED_POINT_STEP,
            fields: PointFields::default(),
            b64_data: base64::encode(&bytes),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.timestamp_millis(1_600_000_000_123)
    }

    #[test]
    fn test_frame_decode_padded_records() {
        // 16 byte records with an intensity field first, then z, x, y
        let mut bytes = vec![0u8; 32];
        LittleEndian::write_f32_into(&[9.0, 3.0, 1.0, 2.0, 9.0, -3.0, -1.0, -2.0], &mut bytes);

        let frame = PointCloudFrame {
            timestamp: stamp(),
            frame_id: "lidar".into(),
            width: 2,
            point_step: 16,
            fields: PointFields {
                x_offset: 8,
                y_offset: 12,
                z_offset: 4,
            },
            b64_data: base64::encode(&bytes),
        };

        let cloud = PointCloud::try_from(frame).unwrap();
        assert_eq!(cloud.frame_id, "lidar");
        assert_eq!(
            cloud.points,
            vec![Point3::new(1.0, 2.0, 3.0), Point3::new(-1.0, -2.0, -3.0)]
        );
    }

    #[test]
    fn test_frame_from_cloud_keeps_points() {
        let cloud = PointCloud {
            timestamp: stamp(),
            frame_id: "base_link".into(),
            points: vec![Point3::new(0.5, 1.5, -0.25), Point3::new(10.0, 0.0, 1.0)],
        };

        let frame = PointCloudFrame::from(&cloud);
        assert_eq!(frame.width, 2);
        assert_eq!(frame.point_step, 12);

        // Through JSON as it would be on the wire
        let json = serde_json::to_string(&frame).unwrap();
        let frame: PointCloudFrame = serde_json::from_str(&json).unwrap();

        assert_eq!(PointCloud::try_from(frame).unwrap(), cloud);
    }

    #[test]
    fn test_frame_errors() {
        let mut frame = PointCloudFrame::from(&PointCloud {
            timestamp: stamp(),
            frame_id: "lidar".into(),
            points: vec![Point3::new(1.0, 1.0, 1.0)],
        });

        frame.width = 2;
        assert_eq!(
            PointCloud::try_from(frame.clone()),
            Err(CloudError::FrameWrongSize {
                expected: 24,
                found: 12
            })
        );

        frame.width = 1;
        frame.fields.z_offset = 10;
        assert_eq!(
            PointCloud::try_from(frame.clone()),
            Err(CloudError::InvalidFieldOffset {
                offset: 10,
                point_step: 12
            })
        );

        frame.fields = PointFields::default();
        frame.b64_data = "not base64!".into();
        assert!(matches!(
            PointCloud::try_from(frame),
            Err(CloudError::B64DecodeError(_))
        ));
    }
}
