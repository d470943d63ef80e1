//! Implements `Convert` functions between the nalgebra types used for points and poses.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Point3, Vector2, Vector3};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait Convert<O> {
    fn convert(&self) -> O;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

/// Single precision cloud points into double precision vectors.
impl Convert<Vector3<f64>> for Point3<f32> {
    fn convert(&self) -> Vector3<f64> {
        self.coords.map(|v| v as f64)
    }
}

/// Drop the z component, projecting onto the ground plane.
impl Convert<Vector2<f64>> for Vector3<f64> {
    fn convert(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}
