//! Scene nodes
//!
//! A node is a local transform plus cached local and world matrices. What
//! the node draws, if anything, is its [`NodeKind`].

use crate::foundation::collections::{GeometryKey, NodeId, ProgramKey};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};
use crate::render::api::DrawMode;
use crate::render::primitives::Camera;

/// Something a mesh node draws
#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    /// Vertex data
    pub geometry: GeometryKey,
    /// Shader program, shareable between drawables
    pub program: ProgramKey,
    /// Primitive topology
    pub mode: DrawMode,
    /// Explicit draw order, lower first; 0 defers to depth sorting
    pub render_order: i32,
    /// Test against the camera frustum before drawing
    pub frustum_culled: bool,
}

impl Drawable {
    /// Triangles, render order 0, frustum culled
    pub fn new(geometry: GeometryKey, program: ProgramKey) -> Self {
        Self {
            geometry,
            program,
            mode: DrawMode::Triangles,
            render_order: 0,
            frustum_culled: true,
        }
    }

    /// Set the primitive topology
    pub fn with_mode(mut self, mode: DrawMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the explicit draw order
    pub fn with_render_order(mut self, order: i32) -> Self {
        self.render_order = order;
        self
    }

    /// Opt in or out of frustum culling
    pub fn with_frustum_culled(mut self, culled: bool) -> Self {
        self.frustum_culled = culled;
        self
    }
}

/// What a node is
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Transform-only grouping node
    Group,
    /// Drawable mesh
    Mesh(Drawable),
    /// Camera
    Camera(Camera),
}

/// One node of a [`Scene`](super::Scene)
#[derive(Debug, Clone)]
pub struct Node {
    pub(super) serial: u64,
    pub(super) name: Option<String>,
    pub(super) transform: Transform,
    pub(super) up: Vec3,
    pub(super) local_matrix: Mat4,
    pub(super) world_matrix: Mat4,
    pub(super) matrix_auto_update: bool,
    pub(super) local_needs_update: bool,
    pub(super) world_matrix_needs_update: bool,
    pub(super) visible: bool,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(super) kind: NodeKind,
}

impl Node {
    pub(super) fn new(serial: u64, kind: NodeKind) -> Self {
        Self {
            serial,
            name: None,
            transform: Transform::identity(),
            up: Vec3::y(),
            local_matrix: Mat4::identity(),
            world_matrix: Mat4::identity(),
            matrix_auto_update: true,
            local_needs_update: false,
            world_matrix_needs_update: true,
            visible: true,
            parent: None,
            children: Vec::new(),
            kind,
        }
    }

    /// Creation-order serial, unique within the scene
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Optional debug name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the debug name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Local position, rotation and scale
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Position relative to the parent
    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Rotation relative to the parent
    pub fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    /// Scale relative to the parent
    pub fn scale(&self) -> Vec3 {
        self.transform.scale
    }

    /// Replace the whole local transform
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.local_needs_update = true;
    }

    /// Set the position
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.local_needs_update = true;
    }

    /// Set the rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.local_needs_update = true;
    }

    /// Set the scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
        self.local_needs_update = true;
    }

    /// Up direction used by `look_at`
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Set the up direction used by `look_at`
    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
    }

    /// Local matrix from the last update
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    /// World matrix from the last update
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Set the local matrix directly and stop recomposing it from the transform
    pub fn set_local_matrix(&mut self, matrix: Mat4) {
        self.local_matrix = matrix;
        self.matrix_auto_update = false;
        self.local_needs_update = false;
        self.world_matrix_needs_update = true;
    }

    /// Copy the local matrix back into position, rotation and scale
    pub fn decompose(&mut self) {
        self.transform = Transform::from_matrix(&self.local_matrix);
    }

    /// Whether the local matrix is recomposed from the transform on update
    pub fn matrix_auto_update(&self) -> bool {
        self.matrix_auto_update
    }

    /// Enable or disable local matrix recomposition
    pub fn set_matrix_auto_update(&mut self, enabled: bool) {
        self.matrix_auto_update = enabled;
    }

    /// Whether the world matrix is stale
    pub fn world_matrix_needs_update(&self) -> bool {
        self.world_matrix_needs_update || (self.matrix_auto_update && self.local_needs_update)
    }

    /// Whether the node and its subtree are drawn
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the node and its subtree
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Parent node
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Node kind
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Mutable node kind
    pub fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    /// Drawable, for mesh nodes
    pub fn drawable(&self) -> Option<&Drawable> {
        match &self.kind {
            NodeKind::Mesh(drawable) => Some(drawable),
            _ => None,
        }
    }

    /// Mutable drawable, for mesh nodes
    pub fn drawable_mut(&mut self) -> Option<&mut Drawable> {
        match &mut self.kind {
            NodeKind::Mesh(drawable) => Some(drawable),
            _ => None,
        }
    }

    /// Camera, for camera nodes
    pub fn camera(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Mutable camera, for camera nodes
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub(super) fn update_local_matrix(&mut self) {
        if self.matrix_auto_update && self.local_needs_update {
            self.local_matrix = self.transform.to_matrix();
            self.local_needs_update = false;
            self.world_matrix_needs_update = true;
        }
    }
}
