//! Bounding volumes and frustum planes
//!
//! Plane extraction follows the Gribb-Hartmann row combinations of a
//! projection-view matrix.

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, `None` for no points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, p| Self {
            min: aabb.min.inf(&p),
            max: aabb.max.sup(&p),
        }))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

}

/// Plane defined by unit normal and signed offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector
    pub normal: Vec3,
    /// Offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a plane, normalizing normal and offset together
    ///
    /// A zero normal is kept as is.
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.norm();
        if length == 0.0 {
            return Self { normal, distance };
        }
        Self {
            normal: normal / length,
            distance: distance / length,
        }
    }

    fn from_coefficients(v: Vec4) -> Self {
        Self::new(v.xyz(), v.w)
    }

    /// Signed distance from the plane to a point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Six half-spaces bounding the visible volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Planes in the order -x, +x, +y, -y, far, near
    pub planes: [Plane; 6],
}

impl Default for Frustum {
    /// Degenerate planes; nothing is culled
    fn default() -> Self {
        Self {
            planes: [Plane { normal: Vec3::zeros(), distance: 0.0 }; 6],
        }
    }
}

impl Frustum {
    /// Extract the planes of a projection-view matrix
    pub fn from_matrix(m: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { m.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 - r2),
                Plane::from_coefficients(r3 + r2),
            ],
        }
    }

    /// False iff the sphere lies entirely outside some plane
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -radius)
    }
}
