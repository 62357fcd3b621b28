//! Per-frame render list
//!
//! Collects the visible meshes below a root, culls them against the camera
//! frustum and orders them for drawing: opaque meshes grouped by program,
//! then transparent meshes back to front, then overlay meshes drawn without
//! depth testing.

use std::cmp::Ordering;

use crate::foundation::collections::{GeometryKey, NodeId, ProgramKey, SlotMap};
use crate::foundation::logging::WarnBudget;
use crate::foundation::math::utils;
use crate::render::api::GraphicsDevice;
use crate::render::primitives::Camera;
use crate::render::resources::{Geometry, Program};

use super::graph::{Scene, Visit};
use super::SceneResult;

/// Which sorting bucket a mesh falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Program not transparent
    Opaque,
    /// Transparent and depth tested
    Transparent,
    /// Transparent without depth testing
    Ui,
}

/// One mesh scheduled for drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    /// Mesh node
    pub node: NodeId,
    /// Bucket the mesh was sorted into
    pub bucket: Bucket,
    /// Explicit draw order
    pub render_order: i32,
    /// Creation-order id of the mesh's program
    pub program_id: u64,
    /// Clip-space depth of the node origin, 0 when not computed
    pub z_depth: f32,
    serial: u64,
}

/// Output of [`build_render_list`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderList {
    /// Meshes in draw order
    pub items: Vec<RenderItem>,
    /// Meshes rejected by the frustum test
    pub culled: usize,
    /// Meshes skipped because a resource was removed
    pub skipped: usize,
}

/// Traversal and ordering switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Test opted-in meshes against the camera frustum
    pub frustum_cull: bool,
    /// Bucket and sort; otherwise keep traversal order
    pub sort: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self { frustum_cull: true, sort: true }
    }
}

/// Collect and order the meshes below `root`
///
/// Invisible nodes hide their whole subtree. Culling needs a camera whose
/// frustum is current; without a camera nothing is culled. Geometry bounds
/// are computed on first use, hence the mutable geometry arena.
pub fn build_render_list<D: GraphicsDevice>(
    scene: &Scene,
    root: NodeId,
    camera: Option<&Camera>,
    options: ListOptions,
    geometries: &mut SlotMap<GeometryKey, Geometry<D>>,
    programs: &SlotMap<ProgramKey, Program<D>>,
    warnings: &mut WarnBudget,
) -> SceneResult<RenderList> {
    let mut list = RenderList::default();

    scene.traverse(root, |id, node| {
        if !node.visible() {
            return Visit::SkipChildren;
        }
        let Some(drawable) = node.drawable() else {
            return Visit::Continue;
        };
        let (Some(geometry), Some(program)) = (geometries.get_mut(drawable.geometry), programs.get(drawable.program)) else {
            warnings.warn(format_args!("Mesh {} references a removed geometry or program", node.serial()));
            list.skipped += 1;
            return Visit::Continue;
        };

        if options.frustum_cull && drawable.frustum_culled {
            if let Some(camera) = camera {
                if !camera.frustum_intersects_mesh(node.world_matrix(), geometry.bounds()) {
                    list.culled += 1;
                    return Visit::Continue;
                }
            }
        }

        let state = program.state();
        let bucket = match (state.transparent, state.depth_test) {
            (false, _) => Bucket::Opaque,
            (true, true) => Bucket::Transparent,
            (true, false) => Bucket::Ui,
        };
        let z_depth = match camera {
            Some(camera) if options.sort && drawable.render_order == 0 && state.depth_test => {
                let origin = utils::translation(node.world_matrix());
                utils::apply_matrix4(camera.projection_view_matrix(), &origin).z
            }
            _ => 0.0,
        };

        list.items.push(RenderItem {
            node: id,
            bucket,
            render_order: drawable.render_order,
            program_id: program.id(),
            z_depth,
            serial: node.serial(),
        });
        Visit::Continue
    })?;

    if options.sort {
        sort_items(&mut list.items);
    }
    Ok(list)
}

fn sort_items(items: &mut Vec<RenderItem>) {
    let mut opaque = Vec::new();
    let mut transparent = Vec::new();
    let mut ui = Vec::new();
    for item in items.drain(..) {
        match item.bucket {
            Bucket::Opaque => opaque.push(item),
            Bucket::Transparent => transparent.push(item),
            Bucket::Ui => ui.push(item),
        }
    }

    let depth = |a: f32, b: f32| a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    opaque.sort_by(|a, b| {
        a.render_order
            .cmp(&b.render_order)
            .then(a.program_id.cmp(&b.program_id))
            .then(depth(a.z_depth, b.z_depth))
            .then(b.serial.cmp(&a.serial))
    });
    transparent.sort_by(|a, b| {
        a.render_order
            .cmp(&b.render_order)
            .then(depth(b.z_depth, a.z_depth))
            .then(b.serial.cmp(&a.serial))
    });
    ui.sort_by(|a, b| {
        a.render_order
            .cmp(&b.render_order)
            .then(a.program_id.cmp(&b.program_id))
            .then(b.serial.cmp(&a.serial))
    });

    items.extend(opaque);
    items.extend(transparent);
    items.extend(ui);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(serial: u64, bucket: Bucket, render_order: i32, program_id: u64, z_depth: f32) -> RenderItem {
        RenderItem { node: NodeId::default(), bucket, render_order, program_id, z_depth, serial }
    }

    fn serials(items: &[RenderItem]) -> Vec<u64> {
        items.iter().map(|item| item.serial).collect()
    }

    #[test]
    fn test_opaque_groups_by_program_before_depth() {
        let mut items = vec![
            item(0, Bucket::Opaque, 0, 2, 0.1),
            item(1, Bucket::Opaque, 0, 1, 0.9),
            item(2, Bucket::Opaque, 0, 1, 0.5),
        ];
        sort_items(&mut items);
        assert_eq!(serials(&items), vec![2, 1, 0]);
    }

    #[test]
    fn test_transparent_back_to_front() {
        let mut items = vec![
            item(0, Bucket::Transparent, 0, 1, 0.2),
            item(1, Bucket::Transparent, 0, 1, 0.8),
            item(2, Bucket::Transparent, 0, 1, 0.5),
        ];
        sort_items(&mut items);
        assert_eq!(serials(&items), vec![1, 2, 0]);
    }

    #[test]
    fn test_buckets_concatenate_and_render_order_wins() {
        let mut items = vec![
            item(0, Bucket::Ui, 0, 1, 0.0),
            item(1, Bucket::Transparent, 0, 1, 0.5),
            item(2, Bucket::Opaque, 1, 1, 0.0),
            item(3, Bucket::Opaque, -1, 9, 0.0),
        ];
        sort_items(&mut items);
        assert_eq!(serials(&items), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_ties_break_on_newest_node_first() {
        let mut items = vec![
            item(4, Bucket::Ui, 0, 3, 0.0),
            item(7, Bucket::Ui, 0, 3, 0.0),
            item(5, Bucket::Opaque, 0, 3, 0.0),
            item(6, Bucket::Opaque, 0, 3, 0.0),
        ];
        sort_items(&mut items);
        assert_eq!(serials(&items), vec![6, 5, 7, 4]);
    }
}
