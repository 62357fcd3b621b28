//! Scene graph
//!
//! A [`Scene`] is an arena of [`Node`]s forming a forest. Each frame the
//! renderer propagates world matrices from a root, then builds a
//! [`RenderList`] of the meshes below it.
//!
//! ## Architecture
//!
//! ```text
//! Scene (nodes, hierarchy, world matrices)
//!      ↓
//! build_render_list (visibility, culling, bucket sort)
//!      ↓
//! Renderer (program use, geometry draw)
//! ```

use thiserror::Error;

use crate::foundation::collections::NodeId;

pub mod frustum;
mod graph;
mod node;
mod render_list;

pub use frustum::{Frustum, Plane, AABB};
pub use graph::{Scene, Visit};
pub use node::{Drawable, Node, NodeKind};
pub use render_list::{build_render_list, Bucket, ListOptions, RenderItem, RenderList};

/// Scene graph errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The node was removed or never existed in this scene
    #[error("node {0:?} is not in the scene")]
    StaleNode(NodeId),

    /// Parenting would make a node its own ancestor
    #[error("attaching {node:?} under {parent:?} would create a cycle")]
    WouldCreateCycle {
        /// Node being attached
        node: NodeId,
        /// Requested parent
        parent: NodeId,
    },

    /// The node exists but is not a camera
    #[error("node {0:?} is not a camera")]
    NotACamera(NodeId),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
