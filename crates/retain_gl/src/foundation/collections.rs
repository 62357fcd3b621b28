//! Arena handles
//!
//! Nodes and GPU resources live in generation-checked `slotmap` arenas. A key
//! that outlives its entry simply fails to resolve instead of aliasing a newer
//! resource that reused the slot.

pub use slotmap::{SlotMap, SecondaryMap};

slotmap::new_key_type! {
    /// Handle to a node in a [`crate::scene::Scene`]
    pub struct NodeId;

    /// Handle to a geometry owned by a renderer
    pub struct GeometryKey;

    /// Handle to a shader program owned by a renderer
    pub struct ProgramKey;

    /// Handle to a texture owned by a renderer
    pub struct TextureKey;

    /// Handle to an offscreen render target owned by a renderer
    pub struct RenderTargetKey;
}
