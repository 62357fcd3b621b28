//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the handful of matrix helpers the scene
//! graph and camera need (compose/decompose, homogeneous point application,
//! maximum axis scale, normal matrix).

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Local transform: position, rotation and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position relative to the parent
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Compose translation * rotation * scale
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Decompose an affine matrix into position, rotation and scale
    ///
    /// Mirrored matrices (negative determinant) put the sign on the x scale so
    /// the remaining basis is a proper rotation.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let mut scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        if matrix.fixed_view::<3, 3>(0, 0).determinant() < 0.0 {
            scale_x = -scale_x;
        }
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        let safe = |s: f32| if s == 0.0 { 1.0 } else { s };
        let rotation_matrix = Matrix3::new(
            matrix.m11 / safe(scale_x), matrix.m12 / safe(scale_y), matrix.m13 / safe(scale_z),
            matrix.m21 / safe(scale_x), matrix.m22 / safe(scale_y), matrix.m23 / safe(scale_z),
            matrix.m31 / safe(scale_x), matrix.m32 / safe(scale_y), matrix.m33 / safe(scale_z),
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::{constants, Mat3, Mat4, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Translation column of an affine matrix
    pub fn translation(matrix: &Mat4) -> Vec3 {
        Vec3::new(matrix.m14, matrix.m24, matrix.m34)
    }

    /// Apply a 4x4 matrix to a point, dividing by w
    ///
    /// A zero w is treated as 1 so degenerate projections never yield NaN.
    pub fn apply_matrix4(matrix: &Mat4, point: &Vec3) -> Vec3 {
        let v = matrix * point.push(1.0);
        let w = if v.w == 0.0 { 1.0 } else { v.w };
        Vec3::new(v.x / w, v.y / w, v.z / w)
    }

    /// Largest scale factor along any of the matrix's basis axes
    pub fn max_scale_on_axis(matrix: &Mat4) -> f32 {
        let x = matrix.fixed_view::<3, 1>(0, 0).norm_squared();
        let y = matrix.fixed_view::<3, 1>(0, 1).norm_squared();
        let z = matrix.fixed_view::<3, 1>(0, 2).norm_squared();
        x.max(y).max(z).sqrt()
    }

    /// Inverse transpose of the upper 3x3 of a model-view matrix
    ///
    /// Returns `None` when the upper 3x3 is singular.
    pub fn normal_matrix(model_view: &Mat4) -> Option<Mat3> {
        let upper: Mat3 = model_view.fixed_view::<3, 3>(0, 0).into_owned();
        upper.try_inverse().map(|inverse| inverse.transpose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_transform_matrix_round_trip() {
        let transform = Transform {
            position: Vec3::new(1.0, -2.0, 3.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
            scale: Vec3::new(2.0, 3.0, 0.5),
        };

        let decomposed = Transform::from_matrix(&transform.to_matrix());

        assert_relative_eq!(decomposed.position, transform.position, epsilon = EPSILON);
        assert_relative_eq!(decomposed.scale, transform.scale, epsilon = EPSILON);
        assert_relative_eq!(decomposed.to_matrix(), transform.to_matrix(), epsilon = EPSILON);
    }

    #[test]
    fn test_apply_matrix4_divides_by_w() {
        let mut matrix = Mat4::identity();
        matrix.m44 = 2.0;

        let result = utils::apply_matrix4(&matrix, &Vec3::new(2.0, 4.0, 6.0));
        assert_relative_eq!(result, Vec3::new(1.0, 2.0, 3.0), epsilon = EPSILON);
    }

    #[test]
    fn test_max_scale_on_axis_uses_largest_axis() {
        let matrix = Transform {
            scale: Vec3::new(1.0, 4.0, 2.0),
            ..Transform::default()
        }
        .to_matrix();

        assert_relative_eq!(utils::max_scale_on_axis(&matrix), 4.0, epsilon = EPSILON);
    }

    #[test]
    fn test_normal_matrix_of_singular_is_none() {
        let matrix = Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 0.0, 1.0));
        assert!(utils::normal_matrix(&matrix).is_none());
    }
}
