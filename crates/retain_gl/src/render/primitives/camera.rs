//! # Camera
//!
//! Projection, view and frustum state for a camera node.
//!
//! ## Design Principles
//! - **Node-driven**: the camera's world matrix comes from the scene graph;
//!   the view matrix is its inverse
//! - **Explicit updates**: matrices and planes change only through
//!   [`Camera::update_view`], [`Camera::update_projection`] and
//!   [`Camera::update_frustum`]

use crate::foundation::math::{utils, Mat4, Vec3};
use crate::render::resources::Bounds;
use crate::scene::frustum::Frustum;

/// Projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
        /// Width / height
        aspect: f32,
        /// Near clipping distance
        near: f32,
        /// Far clipping distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Left bound
        left: f32,
        /// Right bound
        right: f32,
        /// Bottom bound
        bottom: f32,
        /// Top bound
        top: f32,
        /// Near clipping distance
        near: f32,
        /// Far clipping distance
        far: f32,
        /// Bounds are divided by this factor
        zoom: f32,
    },
}

impl Projection {
    /// Build the projection matrix
    ///
    /// Uses OpenGL clip conventions: right-handed view space looking down -z,
    /// depth mapped to [-1, 1].
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Self::Perspective { fov, aspect, near, far } => {
                Mat4::new_perspective(aspect, utils::deg_to_rad(fov), near, far)
            }
            Self::Orthographic { left, right, bottom, top, near, far, zoom } => Mat4::new_orthographic(
                left / zoom,
                right / zoom,
                bottom / zoom,
                top / zoom,
                near,
                far,
            ),
        }
    }
}

/// Camera state carried by a camera node
///
/// # Coordinate System
/// Right-handed, Y-up. The camera looks down its local -z axis, so
/// [`Scene::look_at`](crate::scene::Scene::look_at) on a camera node points
/// -z at the target.
///
/// # Update Order
/// The frame driver calls [`update_view`](Self::update_view) with the node's
/// world matrix, then [`update_frustum`](Self::update_frustum) when culling.
/// Between those calls the cached matrices describe the previous frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    projection: Projection,
    projection_matrix: Mat4,
    view_matrix: Mat4,
    projection_view_matrix: Mat4,
    world_matrix: Mat4,
    frustum: Frustum,
}

impl Camera {
    /// Create a perspective camera
    ///
    /// # Arguments
    /// * `fov` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    ///
    /// # Example
    /// ```rust
    /// use retain_gl::render::primitives::Camera;
    ///
    /// let camera = Camera::perspective(45.0, 16.0 / 9.0, 0.1, 100.0);
    /// assert!(camera.is_perspective());
    /// ```
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective { fov, aspect, near, far })
    }

    /// Create an orthographic camera with unit zoom
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic { left, right, bottom, top, near, far, zoom: 1.0 })
    }

    /// Create a camera from projection parameters
    pub fn new(projection: Projection) -> Self {
        let projection_matrix = projection.matrix();
        Self {
            projection,
            projection_matrix,
            view_matrix: Mat4::identity(),
            projection_view_matrix: projection_matrix,
            world_matrix: Mat4::identity(),
            frustum: Frustum::default(),
        }
    }

    /// Projection parameters
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Whether this is a perspective camera
    pub fn is_perspective(&self) -> bool {
        matches!(self.projection, Projection::Perspective { .. })
    }

    /// Replace the projection parameters and rebuild the projection matrix
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.update_projection();
    }

    /// Update the aspect ratio of a perspective camera
    ///
    /// Orthographic cameras are left unchanged.
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: current, .. } = &mut self.projection {
            *current = aspect;
            self.update_projection();
        }
    }

    /// Rebuild the projection and projection-view matrices
    pub fn update_projection(&mut self) {
        self.projection_matrix = self.projection.matrix();
        self.projection_view_matrix = self.projection_matrix * self.view_matrix;
    }

    /// Take the camera node's world matrix and derive view matrices
    ///
    /// # Non-invertible Worlds
    /// A singular world matrix (for example a zero scale) keeps the previous
    /// view matrix and returns `false`.
    pub fn update_view(&mut self, world: &Mat4) -> bool {
        self.world_matrix = *world;
        match world.try_inverse() {
            Some(view) => {
                self.view_matrix = view;
                self.projection_view_matrix = self.projection_matrix * view;
                true
            }
            None => {
                log::warn!("Camera world matrix is not invertible, keeping previous view");
                false
            }
        }
    }

    /// Extract frustum planes from the projection-view matrix
    pub fn update_frustum(&mut self) {
        self.frustum = Frustum::from_matrix(&self.projection_view_matrix);
    }

    /// Projection matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    /// View matrix (inverse world)
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    /// Projection times view
    pub fn projection_view_matrix(&self) -> &Mat4 {
        &self.projection_view_matrix
    }

    /// World matrix captured by the last view update
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// World-space position
    pub fn world_position(&self) -> Vec3 {
        utils::translation(&self.world_matrix)
    }

    /// Frustum from the last [`update_frustum`](Self::update_frustum)
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Sphere visibility test
    ///
    /// Returns `false` only when the sphere is entirely behind some plane.
    pub fn frustum_intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.frustum.intersects_sphere(center, radius)
    }

    /// Bounding-sphere visibility test for a mesh
    ///
    /// The bounds center is moved into world space and the radius scaled by
    /// the largest axis scale of `world`. Without bounds the mesh is never
    /// culled.
    pub fn frustum_intersects_mesh(&self, world: &Mat4, bounds: Option<&Bounds>) -> bool {
        let Some(bounds) = bounds else {
            return true;
        };
        let center = utils::apply_matrix4(world, &bounds.center);
        let radius = bounds.radius * utils::max_scale_on_axis(world);
        self.frustum_intersects_sphere(center, radius)
    }

    /// World point to normalized device coordinates
    pub fn project(&self, point: &Vec3) -> Vec3 {
        utils::apply_matrix4(&self.projection_view_matrix, point)
    }

    /// Normalized device coordinates to a world point
    ///
    /// A singular projection leaves the point unchanged with a warning.
    pub fn unproject(&self, point: &Vec3) -> Vec3 {
        match self.projection_matrix.try_inverse() {
            Some(inverse) => {
                let view_space = utils::apply_matrix4(&inverse, point);
                utils::apply_matrix4(&self.world_matrix, &view_space)
            }
            None => {
                log::warn!("Camera projection is not invertible, cannot unproject");
                *point
            }
        }
    }
}

impl Default for Camera {
    /// 45 degree perspective, 1:1 aspect, near 0.1, far 100
    fn default() -> Self {
        Self::perspective(45.0, 1.0, 0.1, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    fn looking_down_negative_z() -> Camera {
        let mut camera = Camera::perspective(90.0, 1.0, 0.1, 100.0);
        camera.update_view(&Mat4::identity());
        camera.update_frustum();
        camera
    }

    #[test]
    fn test_sphere_in_front_is_visible() {
        let camera = looking_down_negative_z();

        assert!(camera.frustum_intersects_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
        assert!(!camera.frustum_intersects_sphere(Vec3::new(100.0, 0.0, -5.0), 1.0));
        assert!(!camera.frustum_intersects_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0));
    }

    #[test]
    fn test_sphere_beyond_far_plane_is_culled() {
        let camera = looking_down_negative_z();

        assert!(camera.frustum_intersects_sphere(Vec3::new(0.0, 0.0, -99.5), 1.0));
        assert!(!camera.frustum_intersects_sphere(Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn test_mesh_bounds_follow_world_scale() {
        let camera = looking_down_negative_z();
        let bounds = Bounds::from_positions(&[-1.0, 0.0, 0.0, 1.0, 0.0, 0.0], 3).unwrap();

        // Center at x = 12 is outside the 90 degree cone at z = -5 unless the
        // radius grows with the scale.
        let small = Mat4::new_translation(&Vec3::new(12.0, 0.0, -5.0));
        let large = small * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 10.0, 1.0));
        assert!(!camera.frustum_intersects_mesh(&small, Some(&bounds)));
        assert!(camera.frustum_intersects_mesh(&large, Some(&bounds)));
        assert!(camera.frustum_intersects_mesh(&small, None));
    }

    #[test]
    fn test_view_is_inverse_world() {
        let mut camera = Camera::default();
        let world = Mat4::new_translation(&Vec3::new(0.0, 2.0, 5.0));
        assert!(camera.update_view(&world));

        assert_relative_eq!(camera.view_matrix() * world, Mat4::identity(), epsilon = EPSILON);
        assert_relative_eq!(camera.world_position(), Vec3::new(0.0, 2.0, 5.0), epsilon = EPSILON);
        assert_relative_eq!(
            *camera.projection_view_matrix(),
            camera.projection_matrix() * camera.view_matrix(),
            epsilon = EPSILON
        );
    }

    #[test]
    fn test_singular_world_keeps_previous_view() {
        let mut camera = Camera::default();
        camera.update_view(&Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)));
        let previous = *camera.view_matrix();

        assert!(!camera.update_view(&Mat4::zeros()));
        assert_eq!(*camera.view_matrix(), previous);
    }

    #[test]
    fn test_project_unproject_round_trip() {
        let mut camera = Camera::perspective(60.0, 1.5, 0.5, 50.0);
        camera.update_view(&Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)));
        let point = Vec3::new(1.5, 2.5, -4.0);

        let ndc = camera.project(&point);
        assert_relative_eq!(camera.unproject(&ndc), point, epsilon = EPSILON);
    }

    #[test]
    fn test_orthographic_zoom_scales_bounds() {
        let mut camera = Camera::orthographic(-2.0, 2.0, -1.0, 1.0, 0.1, 10.0);
        let unzoomed = *camera.projection_matrix();
        camera.set_projection(Projection::Orthographic {
            left: -2.0,
            right: 2.0,
            bottom: -1.0,
            top: 1.0,
            near: 0.1,
            far: 10.0,
            zoom: 2.0,
        });

        assert!(!camera.is_perspective());
        assert_relative_eq!(camera.projection_matrix().m11, unzoomed.m11 * 2.0, epsilon = EPSILON);
        camera.set_aspect(3.0);
        assert_relative_eq!(camera.projection_matrix().m11, unzoomed.m11 * 2.0, epsilon = EPSILON);
    }
}
