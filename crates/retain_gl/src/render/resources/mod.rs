//! GPU resources
//!
//! Programs, geometry, textures and render targets. Each wraps device
//! objects and talks to the device only through the
//! [`StateCache`](crate::render::state::StateCache).

pub mod geometry;
pub mod program;
pub mod render_target;
pub mod texture;
pub mod uniform;

pub use geometry::{Attribute, AttributeData, Bounds, DrawRange, Geometry, INDEX_ATTRIBUTE, POSITION_ATTRIBUTE};
pub use program::{AttributeOrder, Program, ProgramDescriptor, RenderState};
pub use render_target::{RenderTarget, RenderTargetDescriptor};
pub use texture::{Texture, TextureDescriptor, TextureImage};
pub use uniform::{Uniform, UniformPath, UniformScratch, UniformValue};
