//! Device abstraction trait for the rendering system
//!
//! [`GraphicsDevice`] is the immediate-mode boundary: one method per device
//! call the renderer issues. Implementations do no caching of their own; the
//! [`crate::render::state::StateCache`] sits in front of every device and is
//! the only caller of the state-setting methods.

use std::fmt::Debug;
use std::hash::Hash;

use super::types::{
    Attachment, BlendEquation, BlendFunc, BufferTarget, BufferUsage, Capability, ClearMask,
    ComponentType, DepthFunc, DrawMode, Face, FrontFace, PixelStore, RenderbufferFormat,
    ShaderStage, TextureParameter, TextureTarget, TextureUpload, UniformData, UniformType,
    VertexAttribLayout,
};

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors reported by a device
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not allocate an object
    #[error("Failed to create {kind}: {message}")]
    ObjectCreation {
        /// Object kind ("buffer", "texture", ...)
        kind: &'static str,
        /// Driver message
        message: String,
    },

    /// A shader stage failed to compile
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile {
        /// Failing stage
        stage: ShaderStage,
        /// Compiler info log
        log: String,
    },

    /// The program failed to link
    #[error("Program failed to link: {0}")]
    Link(String),
}

/// A uniform reported active by program reflection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    /// Reflected name, e.g. `lights[1].color` or `weights[0]`
    pub name: String,
    /// Uniform type
    pub utype: UniformType,
    /// Array length (1 for non-arrays)
    pub size: i32,
}

/// Immediate-mode graphics device
///
/// Handle types are opaque device names. All methods take `&mut self` except
/// the reflection queries, which do not alter device state.
pub trait GraphicsDevice {
    /// Buffer object handle
    type Buffer: Copy + Eq + Hash + Debug;
    /// Vertex array object handle
    type VertexArray: Copy + Eq + Hash + Debug;
    /// Linked program handle
    type Program: Copy + Eq + Hash + Debug;
    /// Texture object handle
    type Texture: Copy + Eq + Hash + Debug;
    /// Framebuffer object handle
    type Framebuffer: Copy + Eq + Hash + Debug;
    /// Renderbuffer object handle
    type Renderbuffer: Copy + Eq + Hash + Debug;
    /// Uniform location within a program
    type UniformLocation: Clone + Debug;

    // === Global state ===

    /// Enable or disable a capability
    fn set_capability(&mut self, capability: Capability, enabled: bool);

    /// Set the blend function (separate when `func.alpha` is set)
    fn blend_func(&mut self, func: BlendFunc);

    /// Set the blend equation (separate when `equation.alpha` is set)
    fn blend_equation(&mut self, equation: BlendEquation);

    /// Select which faces are culled
    fn cull_face(&mut self, face: Face);

    /// Select front-face winding
    fn front_face(&mut self, winding: FrontFace);

    /// Enable or disable depth writes
    fn depth_mask(&mut self, enabled: bool);

    /// Set the depth comparison
    fn depth_func(&mut self, func: DepthFunc);

    /// Set the viewport rectangle
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Bind a framebuffer, `None` for the default surface
    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>);

    /// Select the active texture unit
    fn active_texture(&mut self, unit: u32);

    /// Bind a texture to the active unit
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<Self::Texture>);

    /// Set pixel unpack state
    fn pixel_store(&mut self, param: PixelStore);

    /// Bind a buffer to a target
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<Self::Buffer>);

    /// Bind a vertex array object
    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>);

    /// Make a program current
    fn use_program(&mut self, program: Option<Self::Program>);

    /// Clear buffers of the bound framebuffer
    fn clear(&mut self, mask: ClearMask);

    // === Buffers and vertex layouts ===

    /// Allocate a buffer object
    fn create_buffer(&mut self) -> DeviceResult<Self::Buffer>;

    /// Upload data to the buffer bound at `target`
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    /// Release a buffer object
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    /// Allocate a vertex array object
    fn create_vertex_array(&mut self) -> DeviceResult<Self::VertexArray>;

    /// Release a vertex array object
    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray);

    /// Point an attribute location at the bound array buffer
    fn vertex_attrib_pointer(&mut self, location: u32, layout: VertexAttribLayout);

    /// Enable an attribute location
    fn enable_vertex_attrib_array(&mut self, location: u32);

    /// Set the per-instance divisor of an attribute location
    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32);

    // === Programs ===

    /// Compile and link a program
    fn create_program(&mut self, vertex: &str, fragment: &str) -> DeviceResult<Self::Program>;

    /// Release a program
    fn delete_program(&mut self, program: Self::Program);

    /// Uniforms the linked program reports active
    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform>;

    /// Location of an active uniform
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;

    /// Names of the attributes the linked program reports active
    fn active_attributes(&self, program: Self::Program) -> Vec<String>;

    /// Location of an active attribute
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;

    /// Write a uniform of the current program
    fn set_uniform(&mut self, location: &Self::UniformLocation, utype: UniformType, data: UniformData<'_>);

    // === Textures ===

    /// Allocate a texture object
    fn create_texture(&mut self) -> DeviceResult<Self::Texture>;

    /// Release a texture object
    fn delete_texture(&mut self, texture: Self::Texture);

    /// Set a parameter on the texture bound to the active unit
    fn tex_parameter(&mut self, target: TextureTarget, param: TextureParameter);

    /// Upload to the texture bound to the active unit
    fn tex_image_2d(&mut self, target: TextureTarget, upload: TextureUpload<'_>);

    /// Build mipmaps for the texture bound to the active unit
    fn generate_mipmap(&mut self, target: TextureTarget);

    // === Render targets ===

    /// Allocate a framebuffer object
    fn create_framebuffer(&mut self) -> DeviceResult<Self::Framebuffer>;

    /// Release a framebuffer object
    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);

    /// Attach a texture to the bound framebuffer
    fn framebuffer_texture_2d(&mut self, attachment: Attachment, texture: Self::Texture, level: i32);

    /// Allocate a renderbuffer object
    fn create_renderbuffer(&mut self) -> DeviceResult<Self::Renderbuffer>;

    /// Release a renderbuffer object
    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer);

    /// Allocate renderbuffer storage
    fn renderbuffer_storage(&mut self, renderbuffer: Self::Renderbuffer, format: RenderbufferFormat, width: u32, height: u32);

    /// Attach a renderbuffer to the bound framebuffer
    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: Self::Renderbuffer);

    // === Draws ===

    /// Draw non-indexed primitives
    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32);

    /// Draw indexed primitives; `offset` is in bytes
    fn draw_elements(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32);

    /// Draw non-indexed primitives `instances` times
    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32);

    /// Draw indexed primitives `instances` times; `offset` is in bytes
    fn draw_elements_instanced(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32, instances: i32);
}
