//! Scene arena and hierarchy
//!
//! Nodes live in a [`SlotMap`]. The owning direction is each node's ordered
//! child list; the parent link is a plain key kept consistent by
//! [`Scene::set_parent`], the only place either side is changed.

use crate::foundation::collections::{NodeId, SlotMap};
use crate::foundation::math::{Mat4, Quat, Vec3};
use crate::render::primitives::Camera;

use super::node::{Drawable, Node, NodeKind};
use super::{SceneError, SceneResult};

/// Traversal control returned by visitors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Descend into the node's children
    Continue,
    /// Do not descend below this node
    SkipChildren,
}

/// Arena of scene nodes
#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeId, Node>,
    next_serial: u64,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a detached node of any kind
    pub fn add(&mut self, kind: NodeKind) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.nodes.insert(Node::new(serial, kind))
    }

    /// Add a detached group node
    pub fn add_group(&mut self) -> NodeId {
        self.add(NodeKind::Group)
    }

    /// Add a detached mesh node
    pub fn add_mesh(&mut self, drawable: Drawable) -> NodeId {
        self.add(NodeKind::Mesh(drawable))
    }

    /// Add a detached camera node
    pub fn add_camera(&mut self, camera: Camera) -> NodeId {
        self.add(NodeKind::Camera(camera))
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Whether the id refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scene has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes.get(id).ok_or(SceneError::StaleNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.nodes.get_mut(id).ok_or(SceneError::StaleNode(id))
    }

    /// Whether `ancestor` is `id` or lies on its parent chain
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.nodes.get(node).and_then(|n| n.parent);
        }
        false
    }

    /// Attach `child` under `parent`, detaching it from any previous parent
    ///
    /// The child is appended to the end of the new parent's child list, so
    /// re-adding a child to its own parent moves it last.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> SceneResult<()> {
        self.node(child)?;
        if let Some(parent) = parent {
            self.node(parent)?;
            if self.is_ancestor(child, parent) {
                return Err(SceneError::WouldCreateCycle { node: child, parent });
            }
        }

        if let Some(old) = self.node(child)?.parent {
            if let Some(old) = self.nodes.get_mut(old) {
                old.children.retain(|c| *c != child);
            }
        }
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(child);
        }

        let node = self.node_mut(child)?;
        node.parent = parent;
        node.world_matrix_needs_update = true;
        Ok(())
    }

    /// Attach `child` under `parent`
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        self.set_parent(child, Some(parent))
    }

    /// Detach `child` if its parent is `parent`; returns whether it was
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<bool> {
        if self.node(child)?.parent != Some(parent) {
            return Ok(false);
        }
        self.set_parent(child, None)?;
        Ok(true)
    }

    /// Detach a node from its parent
    pub fn detach(&mut self, id: NodeId) -> SceneResult<()> {
        self.set_parent(id, None)
    }

    /// Remove a node and its whole subtree; returns the number of nodes removed
    pub fn remove(&mut self, id: NodeId) -> SceneResult<usize> {
        self.detach(id)?;
        let mut subtree = Vec::new();
        self.traverse(id, |node, _| {
            subtree.push(node);
            Visit::Continue
        })?;
        for node in &subtree {
            self.nodes.remove(*node);
        }
        Ok(subtree.len())
    }

    /// Visit `root` and its descendants top-down, children in insertion order
    pub fn traverse<F>(&self, root: NodeId, mut visitor: F) -> SceneResult<()>
    where
        F: FnMut(NodeId, &Node) -> Visit,
    {
        self.node(root)?;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if visitor(id, node) == Visit::Continue {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(())
    }

    /// Recompute stale local and world matrices below `root`
    ///
    /// A world matrix is rebuilt when its node changed, when an ancestor's
    /// world matrix was rebuilt in this pass, or when `force` is set. Returns
    /// the number of world matrices rebuilt.
    pub fn update_world_matrices(&mut self, root: NodeId, force: bool) -> SceneResult<usize> {
        self.node(root)?;
        let mut updated = 0;
        let mut stack = vec![(root, force)];

        while let Some((id, force)) = stack.pop() {
            let parent_world = self
                .nodes
                .get(id)
                .and_then(|node| node.parent)
                .and_then(|parent| self.nodes.get(parent))
                .map(|parent| parent.world_matrix);
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };

            node.update_local_matrix();
            let dirty = node.world_matrix_needs_update || force;
            if dirty {
                node.world_matrix = match parent_world {
                    Some(parent_world) => parent_world * node.local_matrix,
                    None => node.local_matrix,
                };
                node.world_matrix_needs_update = false;
                updated += 1;
            }
            stack.extend(node.children.iter().rev().map(|child| (*child, dirty)));
        }

        log::trace!("Updated {} world matrices", updated);
        Ok(updated)
    }

    /// Bring one node's world matrix up to date from its parent's cached world
    ///
    /// Used for cameras that live outside the rendered subtree.
    pub fn update_node_world(&mut self, id: NodeId) -> SceneResult<()> {
        let parent_world = self
            .node(id)?
            .parent
            .and_then(|parent| self.nodes.get(parent))
            .map(|parent| parent.world_matrix);
        let node = self.node_mut(id)?;
        node.update_local_matrix();
        node.world_matrix = match parent_world {
            Some(parent_world) => parent_world * node.local_matrix,
            None => node.local_matrix,
        };
        node.world_matrix_needs_update = false;
        Ok(())
    }

    /// Rotate a node to face `target` (in its parent's space)
    ///
    /// Cameras point -z at the target, every other node points +z at it.
    /// A target at the node's own position leaves the rotation unchanged.
    pub fn look_at(&mut self, id: NodeId, target: Vec3) -> SceneResult<()> {
        let node = self.node_mut(id)?;
        let forward = target - node.position();
        if forward.norm_squared() == 0.0 {
            return Ok(());
        }
        let facing = if matches!(node.kind, NodeKind::Camera(_)) { -forward } else { forward };
        let rotation = Quat::face_towards(&facing, &node.up);
        node.set_rotation(rotation);
        Ok(())
    }

    /// Ids of all live nodes
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys()
    }

    /// World matrix of a node
    pub fn world_matrix(&self, id: NodeId) -> SceneResult<&Mat4> {
        Ok(self.node(id)?.world_matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::utils;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_child_translation_propagates() {
        let mut scene = Scene::new();
        let root = scene.add_group();
        let child = scene.add_group();
        scene.add_child(root, child).unwrap();
        scene.get_mut(child).unwrap().set_position(Vec3::new(1.0, 0.0, 0.0));

        scene.update_world_matrices(root, false).unwrap();
        assert_relative_eq!(utils::translation(scene.world_matrix(child).unwrap()), Vec3::new(1.0, 0.0, 0.0), epsilon = EPSILON);

        scene.get_mut(root).unwrap().set_scale(Vec3::new(2.0, 2.0, 2.0));
        scene.update_world_matrices(root, false).unwrap();
        assert_relative_eq!(utils::translation(scene.world_matrix(child).unwrap()), Vec3::new(2.0, 0.0, 0.0), epsilon = EPSILON);
    }

    #[test]
    fn test_world_is_product_of_ancestor_locals() {
        let mut scene = Scene::new();
        let a = scene.add_group();
        let b = scene.add_group();
        let c = scene.add_group();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();
        scene.get_mut(a).unwrap().set_rotation(Quat::from_axis_angle(&Vec3::z_axis(), 0.5));
        scene.get_mut(b).unwrap().set_scale(Vec3::new(1.0, 3.0, 1.0));
        scene.get_mut(c).unwrap().set_position(Vec3::new(0.0, 1.0, -2.0));

        scene.update_world_matrices(a, false).unwrap();
        let expected = scene.get(a).unwrap().local_matrix()
            * scene.get(b).unwrap().local_matrix()
            * scene.get(c).unwrap().local_matrix();
        assert_relative_eq!(*scene.world_matrix(c).unwrap(), expected, epsilon = EPSILON);
    }

    #[test]
    fn test_only_dirty_subtrees_are_recomputed() {
        let mut scene = Scene::new();
        let root = scene.add_group();
        let left = scene.add_group();
        let right = scene.add_group();
        let leaf = scene.add_group();
        scene.add_child(root, left).unwrap();
        scene.add_child(root, right).unwrap();
        scene.add_child(left, leaf).unwrap();

        assert_eq!(scene.update_world_matrices(root, false).unwrap(), 4);
        assert_eq!(scene.update_world_matrices(root, false).unwrap(), 0);

        scene.get_mut(left).unwrap().set_position(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(scene.update_world_matrices(root, false).unwrap(), 2);
        assert_eq!(scene.update_world_matrices(root, true).unwrap(), 4);
    }

    #[test]
    fn test_reparenting_keeps_single_membership() {
        let mut scene = Scene::new();
        let first = scene.add_group();
        let second = scene.add_group();
        let child = scene.add_group();

        scene.add_child(first, child).unwrap();
        scene.add_child(second, child).unwrap();
        scene.add_child(second, child).unwrap();

        assert!(scene.get(first).unwrap().children().is_empty());
        assert_eq!(scene.get(second).unwrap().children(), &[child]);
        assert_eq!(scene.get(child).unwrap().parent(), Some(second));

        assert!(!scene.remove_child(first, child).unwrap());
        assert!(scene.remove_child(second, child).unwrap());
        assert_eq!(scene.get(child).unwrap().parent(), None);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut scene = Scene::new();
        let a = scene.add_group();
        let b = scene.add_group();
        scene.add_child(a, b).unwrap();

        assert!(matches!(scene.add_child(b, a), Err(SceneError::WouldCreateCycle { .. })));
        assert!(matches!(scene.add_child(a, a), Err(SceneError::WouldCreateCycle { .. })));
        assert_eq!(scene.get(a).unwrap().parent(), None);
    }

    #[test]
    fn test_traverse_skips_subtrees() {
        let mut scene = Scene::new();
        let root = scene.add_group();
        let hidden = scene.add_group();
        let below_hidden = scene.add_group();
        let shown = scene.add_group();
        scene.add_child(root, hidden).unwrap();
        scene.add_child(hidden, below_hidden).unwrap();
        scene.add_child(root, shown).unwrap();

        let mut visited = Vec::new();
        scene
            .traverse(root, |id, _| {
                visited.push(id);
                if id == hidden { Visit::SkipChildren } else { Visit::Continue }
            })
            .unwrap();
        assert_eq!(visited, vec![root, hidden, shown]);
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut scene = Scene::new();
        let root = scene.add_group();
        let branch = scene.add_group();
        let leaf = scene.add_group();
        scene.add_child(root, branch).unwrap();
        scene.add_child(branch, leaf).unwrap();

        assert_eq!(scene.remove(branch).unwrap(), 2);
        assert!(!scene.contains(leaf));
        assert!(scene.get(root).unwrap().children().is_empty());
        assert!(matches!(scene.remove(branch), Err(SceneError::StaleNode(_))));
    }

    #[test]
    fn test_camera_look_at_faces_negative_z() {
        let mut scene = Scene::new();
        let camera = scene.add_camera(Camera::default());
        let mesh = scene.add_group();
        for id in [camera, mesh] {
            scene.get_mut(id).unwrap().set_position(Vec3::new(0.0, 0.0, 5.0));
            scene.look_at(id, Vec3::zeros()).unwrap();
        }

        let camera_forward = scene.get(camera).unwrap().rotation() * -Vec3::z();
        let mesh_forward = scene.get(mesh).unwrap().rotation() * Vec3::z();
        assert_relative_eq!(camera_forward, Vec3::new(0.0, 0.0, -1.0), epsilon = EPSILON);
        assert_relative_eq!(mesh_forward, Vec3::new(0.0, 0.0, -1.0), epsilon = EPSILON);
    }

    #[test]
    fn test_detached_camera_world_update() {
        let mut scene = Scene::new();
        let camera = scene.add_camera(Camera::default());
        scene.get_mut(camera).unwrap().set_position(Vec3::new(0.0, 0.0, 3.0));

        scene.update_node_world(camera).unwrap();
        assert_relative_eq!(utils::translation(scene.world_matrix(camera).unwrap()), Vec3::new(0.0, 0.0, 3.0), epsilon = EPSILON);
        assert!(!scene.get(camera).unwrap().world_matrix_needs_update());
    }
}
