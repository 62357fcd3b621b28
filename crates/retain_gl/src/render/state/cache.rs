//! Mirrored device state
//!
//! [`StateCache`] owns the device. Every state-setting call goes through a
//! method here that compares against the mirror and only reaches the device
//! on change. Object creation, uploads and draws are forwarded unchanged
//! through narrowly named pass-throughs that leave the mirror intact.

use std::collections::HashMap;

use crate::render::api::{
    ActiveUniform, Attachment, BlendEquation, BlendFactor, BlendFunc, BlendOp, BufferTarget,
    BufferUsage, Capability, ClearMask, ComponentType, DepthFunc, DeviceResult, DrawMode, Face,
    FrontFace, GraphicsDevice, PixelStore, RenderbufferFormat, TextureParameter, TextureTarget,
    TextureUpload, UniformData, UniformType, VertexAttribLayout,
};

/// Last value written to one uniform location
#[derive(Debug, Clone, PartialEq)]
enum CachedUniform {
    Float(f32),
    Int(i32),
    Floats(Vec<f32>),
    Ints(Vec<i32>),
}

impl CachedUniform {
    fn matches(&self, data: &UniformData<'_>) -> bool {
        match (self, data) {
            (Self::Float(a), UniformData::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Int(a), UniformData::Int(b)) => a == b,
            (Self::Floats(a), UniformData::Floats(b)) => a.as_slice() == *b,
            (Self::Ints(a), UniformData::Ints(b)) => a.as_slice() == *b,
            _ => false,
        }
    }

    /// Overwrite with `data`, reusing the existing allocation when the shapes agree
    fn store(&mut self, data: &UniformData<'_>) {
        match (self, data) {
            (Self::Floats(values), UniformData::Floats(new)) => {
                values.clear();
                values.extend_from_slice(new);
            }
            (Self::Ints(values), UniformData::Ints(new)) => {
                values.clear();
                values.extend_from_slice(new);
            }
            (slot, data) => *slot = Self::from(data),
        }
    }
}

impl From<&UniformData<'_>> for CachedUniform {
    fn from(data: &UniformData<'_>) -> Self {
        match *data {
            UniformData::Float(v) => Self::Float(v),
            UniformData::Int(v) => Self::Int(v),
            UniformData::Floats(v) => Self::Floats(v.to_vec()),
            UniformData::Ints(v) => Self::Ints(v.to_vec()),
        }
    }
}

/// Device wrapper that elides redundant state changes
///
/// Mirrors start at the values of a freshly created GL context. Bindings whose
/// initial value is not known (buffers, vertex array, program, capabilities)
/// start as unknown, so the first request always reaches the device.
pub struct StateCache<D: GraphicsDevice> {
    device: D,

    capabilities: HashMap<Capability, bool>,
    blend_func: BlendFunc,
    blend_equation: BlendEquation,
    cull_face: Option<Face>,
    front_face: FrontFace,
    depth_mask: bool,
    depth_func: DepthFunc,

    flip_y: bool,
    premultiply_alpha: bool,
    unpack_alignment: i32,

    framebuffer: Option<D::Framebuffer>,
    viewport: Option<(i32, i32)>,

    active_unit: u32,
    texture_units: Vec<Option<D::Texture>>,

    // Outer `None` means unknown.
    array_buffer: Option<Option<D::Buffer>>,
    element_buffer: Option<Option<D::Buffer>>,
    vertex_array: Option<Option<D::VertexArray>>,
    program: Option<Option<D::Program>>,

    uniforms: HashMap<(D::Program, usize), CachedUniform>,
}

impl<D: GraphicsDevice> StateCache<D> {
    /// Take ownership of a freshly created device
    pub fn new(device: D) -> Self {
        Self {
            device,
            capabilities: HashMap::new(),
            blend_func: BlendFunc::new(BlendFactor::One, BlendFactor::Zero),
            blend_equation: BlendEquation::new(BlendOp::Add),
            cull_face: None,
            front_face: FrontFace::Ccw,
            depth_mask: true,
            depth_func: DepthFunc::Less,
            flip_y: false,
            premultiply_alpha: false,
            unpack_alignment: 4,
            framebuffer: None,
            viewport: None,
            active_unit: 0,
            texture_units: Vec::new(),
            array_buffer: None,
            element_buffer: None,
            vertex_array: None,
            program: None,
            uniforms: HashMap::new(),
        }
    }

    /// Read-only access to the device (reflection queries, recorded calls)
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Give the device back
    pub fn into_device(self) -> D {
        self.device
    }

    // === Capabilities and fixed-function state ===

    /// Enable a capability
    pub fn enable(&mut self, capability: Capability) {
        self.set_capability(capability, true);
    }

    /// Disable a capability
    pub fn disable(&mut self, capability: Capability) {
        self.set_capability(capability, false);
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        if self.capabilities.get(&capability) == Some(&enabled) {
            return;
        }
        self.device.set_capability(capability, enabled);
        self.capabilities.insert(capability, enabled);
    }

    /// Mirrored capability state, `None` until first set
    pub fn is_enabled(&self, capability: Capability) -> Option<bool> {
        self.capabilities.get(&capability).copied()
    }

    /// Set the blend function
    pub fn set_blend_func(&mut self, func: BlendFunc) {
        if self.blend_func == func {
            return;
        }
        self.device.blend_func(func);
        self.blend_func = func;
    }

    /// Set the blend equation
    pub fn set_blend_equation(&mut self, equation: BlendEquation) {
        if self.blend_equation == equation {
            return;
        }
        self.device.blend_equation(equation);
        self.blend_equation = equation;
    }

    /// Select the culled face
    pub fn set_cull_face(&mut self, face: Face) {
        if self.cull_face == Some(face) {
            return;
        }
        self.device.cull_face(face);
        self.cull_face = Some(face);
    }

    /// Select front-face winding
    pub fn set_front_face(&mut self, winding: FrontFace) {
        if self.front_face == winding {
            return;
        }
        self.device.front_face(winding);
        self.front_face = winding;
    }

    /// Enable or disable depth writes
    pub fn set_depth_mask(&mut self, enabled: bool) {
        if self.depth_mask == enabled {
            return;
        }
        self.device.depth_mask(enabled);
        self.depth_mask = enabled;
    }

    /// Set the depth comparison
    pub fn set_depth_func(&mut self, func: DepthFunc) {
        if self.depth_func == func {
            return;
        }
        self.device.depth_func(func);
        self.depth_func = func;
    }

    /// Set pixel unpack state
    pub fn pixel_store(&mut self, param: PixelStore) {
        let unchanged = match param {
            PixelStore::FlipY(flip) => self.flip_y == flip,
            PixelStore::PremultiplyAlpha(premultiply) => self.premultiply_alpha == premultiply,
            PixelStore::UnpackAlignment(alignment) => self.unpack_alignment == alignment,
        };
        if unchanged {
            return;
        }
        self.device.pixel_store(param);
        match param {
            PixelStore::FlipY(flip) => self.flip_y = flip,
            PixelStore::PremultiplyAlpha(premultiply) => self.premultiply_alpha = premultiply,
            PixelStore::UnpackAlignment(alignment) => self.unpack_alignment = alignment,
        }
    }

    // === Framebuffer and viewport ===

    /// Bind a framebuffer, `None` for the default surface
    pub fn bind_framebuffer(&mut self, framebuffer: Option<D::Framebuffer>) {
        if self.framebuffer == framebuffer {
            return;
        }
        self.device.bind_framebuffer(framebuffer);
        self.framebuffer = framebuffer;
    }

    /// Currently bound framebuffer
    pub fn framebuffer(&self) -> Option<D::Framebuffer> {
        self.framebuffer
    }

    /// Set the viewport to `width` x `height` at the origin
    ///
    /// Only the size is compared; the origin is always zero.
    pub fn set_viewport(&mut self, width: i32, height: i32) {
        if self.viewport == Some((width, height)) {
            return;
        }
        self.device.viewport(0, 0, width, height);
        self.viewport = Some((width, height));
    }

    /// Mirrored viewport size
    pub fn viewport(&self) -> Option<(i32, i32)> {
        self.viewport
    }

    /// Clear buffers of the bound framebuffer
    pub fn clear(&mut self, mask: ClearMask) {
        self.device.clear(mask);
    }

    // === Texture units ===

    /// Select the active texture unit
    pub fn active_texture(&mut self, unit: u32) {
        if self.active_unit == unit {
            return;
        }
        self.device.active_texture(unit);
        self.active_unit = unit;
    }

    /// Bind a texture to the active unit
    pub fn bind_texture(&mut self, target: TextureTarget, texture: Option<D::Texture>) {
        let unit = self.active_unit as usize;
        if self.texture_units.get(unit).copied().flatten() == texture {
            return;
        }
        self.device.bind_texture(target, texture);
        if self.texture_units.len() <= unit {
            self.texture_units.resize(unit + 1, None);
        }
        self.texture_units[unit] = texture;
    }

    /// Texture mirrored on a unit
    pub fn texture_at(&self, unit: u32) -> Option<D::Texture> {
        self.texture_units.get(unit as usize).copied().flatten()
    }

    // === Buffers, vertex arrays, programs ===

    /// Bind a buffer to a target
    pub fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<D::Buffer>) {
        let mirror = match target {
            BufferTarget::Array => &mut self.array_buffer,
            BufferTarget::ElementArray => &mut self.element_buffer,
        };
        if *mirror == Some(buffer) {
            return;
        }
        self.device.bind_buffer(target, buffer);
        *mirror = Some(buffer);
    }

    /// Bind a vertex array object
    ///
    /// The element-array binding is vertex array state, so its mirror becomes
    /// unknown whenever a different vertex array is bound.
    pub fn bind_vertex_array(&mut self, vertex_array: Option<D::VertexArray>) {
        if self.vertex_array == Some(vertex_array) {
            return;
        }
        self.device.bind_vertex_array(vertex_array);
        self.vertex_array = Some(vertex_array);
        self.element_buffer = None;
    }

    /// Make a program current; returns whether the device was called
    pub fn use_program(&mut self, program: Option<D::Program>) -> bool {
        if self.program == Some(program) {
            return false;
        }
        self.device.use_program(program);
        self.program = Some(program);
        true
    }

    /// Write a uniform of `program` unless the cached value is identical
    ///
    /// `index` identifies the uniform within the program. Returns whether the
    /// device was called.
    pub fn set_uniform(
        &mut self,
        program: D::Program,
        index: usize,
        location: &D::UniformLocation,
        utype: UniformType,
        data: UniformData<'_>,
    ) -> bool {
        match self.uniforms.get_mut(&(program, index)) {
            Some(cached) if cached.matches(&data) => return false,
            Some(cached) => cached.store(&data),
            None => {
                self.uniforms.insert((program, index), CachedUniform::from(&data));
            }
        }
        self.device.set_uniform(location, utype, data);
        true
    }

    // === Pass-throughs ===

    /// Allocate a buffer object
    pub fn create_buffer(&mut self) -> DeviceResult<D::Buffer> {
        self.device.create_buffer()
    }

    /// Bind `buffer` to `target` and upload `data`
    pub fn upload_buffer(&mut self, target: BufferTarget, buffer: D::Buffer, data: &[u8], usage: BufferUsage) {
        self.bind_buffer(target, Some(buffer));
        self.device.buffer_data(target, data, usage);
    }

    /// Release a buffer object
    pub fn delete_buffer(&mut self, buffer: D::Buffer) {
        self.device.delete_buffer(buffer);
        if self.array_buffer == Some(Some(buffer)) {
            self.array_buffer = Some(None);
        }
        if self.element_buffer == Some(Some(buffer)) {
            self.element_buffer = Some(None);
        }
    }

    /// Allocate a vertex array object
    pub fn create_vertex_array(&mut self) -> DeviceResult<D::VertexArray> {
        self.device.create_vertex_array()
    }

    /// Release a vertex array object
    pub fn delete_vertex_array(&mut self, vertex_array: D::VertexArray) {
        self.device.delete_vertex_array(vertex_array);
        if self.vertex_array == Some(Some(vertex_array)) {
            self.vertex_array = Some(None);
            self.element_buffer = None;
        }
    }

    /// Point, enable and set the divisor of an attribute location on the
    /// bound vertex array, reading from the bound array buffer
    pub fn vertex_attrib(&mut self, location: u32, layout: VertexAttribLayout, divisor: u32) {
        self.device.vertex_attrib_pointer(location, layout);
        self.device.enable_vertex_attrib_array(location);
        self.device.vertex_attrib_divisor(location, divisor);
    }

    /// Compile and link a program
    pub fn create_program(&mut self, vertex: &str, fragment: &str) -> DeviceResult<D::Program> {
        self.device.create_program(vertex, fragment)
    }

    /// Release a program and everything cached for it
    pub fn delete_program(&mut self, program: D::Program) {
        self.device.delete_program(program);
        self.uniforms.retain(|(owner, _), _| *owner != program);
        if self.program == Some(Some(program)) {
            self.program = None;
        }
    }

    /// Uniforms the program reports active
    pub fn active_uniforms(&self, program: D::Program) -> Vec<ActiveUniform> {
        self.device.active_uniforms(program)
    }

    /// Location of an active uniform
    pub fn uniform_location(&self, program: D::Program, name: &str) -> Option<D::UniformLocation> {
        self.device.uniform_location(program, name)
    }

    /// Attributes the program reports active
    pub fn active_attributes(&self, program: D::Program) -> Vec<String> {
        self.device.active_attributes(program)
    }

    /// Location of an active attribute
    pub fn attrib_location(&self, program: D::Program, name: &str) -> Option<u32> {
        self.device.attrib_location(program, name)
    }

    /// Allocate a texture object
    pub fn create_texture(&mut self) -> DeviceResult<D::Texture> {
        self.device.create_texture()
    }

    /// Release a texture object and unbind it from every mirrored unit
    pub fn delete_texture(&mut self, texture: D::Texture) {
        self.device.delete_texture(texture);
        for slot in &mut self.texture_units {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    /// Set a parameter on the texture bound to the active unit
    pub fn tex_parameter(&mut self, target: TextureTarget, param: TextureParameter) {
        self.device.tex_parameter(target, param);
    }

    /// Upload to the texture bound to the active unit
    pub fn tex_image_2d(&mut self, target: TextureTarget, upload: TextureUpload<'_>) {
        self.device.tex_image_2d(target, upload);
    }

    /// Build mipmaps for the texture bound to the active unit
    pub fn generate_mipmap(&mut self, target: TextureTarget) {
        self.device.generate_mipmap(target);
    }

    /// Allocate a framebuffer object
    pub fn create_framebuffer(&mut self) -> DeviceResult<D::Framebuffer> {
        self.device.create_framebuffer()
    }

    /// Release a framebuffer; the default surface becomes current if it was bound
    pub fn delete_framebuffer(&mut self, framebuffer: D::Framebuffer) {
        self.device.delete_framebuffer(framebuffer);
        if self.framebuffer == Some(framebuffer) {
            self.framebuffer = None;
        }
    }

    /// Attach a texture to the bound framebuffer
    pub fn framebuffer_texture_2d(&mut self, attachment: Attachment, texture: D::Texture, level: i32) {
        self.device.framebuffer_texture_2d(attachment, texture, level);
    }

    /// Allocate a renderbuffer object
    pub fn create_renderbuffer(&mut self) -> DeviceResult<D::Renderbuffer> {
        self.device.create_renderbuffer()
    }

    /// Release a renderbuffer object
    pub fn delete_renderbuffer(&mut self, renderbuffer: D::Renderbuffer) {
        self.device.delete_renderbuffer(renderbuffer);
    }

    /// Allocate renderbuffer storage
    pub fn renderbuffer_storage(&mut self, renderbuffer: D::Renderbuffer, format: RenderbufferFormat, width: u32, height: u32) {
        self.device.renderbuffer_storage(renderbuffer, format, width, height);
    }

    /// Attach a renderbuffer to the bound framebuffer
    pub fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: D::Renderbuffer) {
        self.device.framebuffer_renderbuffer(attachment, renderbuffer);
    }

    /// Draw non-indexed primitives
    pub fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        self.device.draw_arrays(mode, first, count);
    }

    /// Draw indexed primitives; `offset` is in bytes
    pub fn draw_elements(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32) {
        self.device.draw_elements(mode, count, index_type, offset);
    }

    /// Draw non-indexed primitives `instances` times
    pub fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32) {
        self.device.draw_arrays_instanced(mode, first, count, instances);
    }

    /// Draw indexed primitives `instances` times; `offset` is in bytes
    pub fn draw_elements_instanced(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32, instances: i32) {
        self.device.draw_elements_instanced(mode, count, index_type, offset, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{DeviceCall, HeadlessDevice};

    const VERTEX: &str = "attribute vec3 position; uniform vec3 tint; uniform float alpha; void main() {}";
    const FRAGMENT: &str = "void main() {}";

    fn cache() -> StateCache<HeadlessDevice> {
        StateCache::new(HeadlessDevice::new())
    }

    #[test]
    fn test_blend_func_is_idempotent() {
        let mut cache = cache();
        let func = BlendFunc::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);

        cache.set_blend_func(func);
        cache.set_blend_func(func);

        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::BlendFunc(_))), 1);
    }

    #[test]
    fn test_initial_values_match_fresh_context() {
        let mut cache = cache();
        cache.set_blend_func(BlendFunc::new(BlendFactor::One, BlendFactor::Zero));
        cache.set_blend_equation(BlendEquation::new(BlendOp::Add));
        cache.set_front_face(FrontFace::Ccw);
        cache.set_depth_mask(true);
        cache.set_depth_func(DepthFunc::Less);
        cache.pixel_store(PixelStore::UnpackAlignment(4));
        cache.pixel_store(PixelStore::FlipY(false));
        cache.bind_framebuffer(None);
        cache.active_texture(0);

        assert!(cache.device().calls().is_empty());
    }

    #[test]
    fn test_capabilities_start_unknown() {
        let mut cache = cache();
        assert_eq!(cache.is_enabled(Capability::DepthTest), None);

        cache.disable(Capability::DepthTest);
        cache.disable(Capability::DepthTest);
        cache.enable(Capability::DepthTest);

        assert_eq!(cache.device().calls().len(), 2);
        assert_eq!(cache.is_enabled(Capability::DepthTest), Some(true));
    }

    #[test]
    fn test_viewport_compares_size() {
        let mut cache = cache();
        cache.set_viewport(300, 150);
        cache.set_viewport(300, 150);
        cache.set_viewport(600, 300);

        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::Viewport { .. })), 2);
        assert_eq!(cache.viewport(), Some((600, 300)));
    }

    #[test]
    fn test_vertex_array_bind_forgets_element_buffer() {
        let mut cache = cache();
        let buffer = cache.create_buffer().unwrap();
        let vao_a = cache.create_vertex_array().unwrap();
        let vao_b = cache.create_vertex_array().unwrap();

        cache.bind_vertex_array(Some(vao_a));
        cache.bind_buffer(BufferTarget::ElementArray, Some(buffer));
        cache.bind_buffer(BufferTarget::ElementArray, Some(buffer));
        cache.bind_vertex_array(Some(vao_b));
        cache.bind_buffer(BufferTarget::ElementArray, Some(buffer));

        let binds = cache
            .device()
            .count(|c| matches!(c, DeviceCall::BindBuffer(BufferTarget::ElementArray, _)));
        assert_eq!(binds, 2);
    }

    #[test]
    fn test_texture_units_are_tracked_separately() {
        let mut cache = cache();
        let texture = cache.create_texture().unwrap();

        cache.bind_texture(TextureTarget::Texture2D, Some(texture));
        cache.active_texture(1);
        cache.bind_texture(TextureTarget::Texture2D, Some(texture));
        cache.active_texture(0);
        cache.bind_texture(TextureTarget::Texture2D, Some(texture));

        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::BindTexture(_))), 2);
        assert_eq!(cache.texture_at(1), Some(texture));

        cache.delete_texture(texture);
        assert_eq!(cache.texture_at(0), None);
        assert_eq!(cache.texture_at(1), None);
    }

    #[test]
    fn test_uniform_write_elision() {
        let mut cache = cache();
        let program = cache.create_program(VERTEX, FRAGMENT).unwrap();
        let tint = cache.uniform_location(program, "tint").unwrap();
        cache.use_program(Some(program));

        assert!(cache.set_uniform(program, 0, &tint, UniformType::FloatVec3, UniformData::Floats(&[1.0, 0.5, 0.0])));
        assert!(!cache.set_uniform(program, 0, &tint, UniformType::FloatVec3, UniformData::Floats(&[1.0, 0.5, 0.0])));
        assert!(cache.set_uniform(program, 0, &tint, UniformType::FloatVec3, UniformData::Floats(&[1.0, 0.5, 0.25])));

        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::SetUniform { .. })), 2);
    }

    #[test]
    fn test_deleting_program_drops_its_uniform_cache() {
        let mut cache = cache();
        let program = cache.create_program(VERTEX, FRAGMENT).unwrap();
        let alpha = cache.uniform_location(program, "alpha").unwrap();

        assert!(cache.use_program(Some(program)));
        assert!(!cache.use_program(Some(program)));
        cache.set_uniform(program, 1, &alpha, UniformType::Float, UniformData::Float(0.5));
        cache.delete_program(program);

        assert!(cache.set_uniform(program, 1, &alpha, UniformType::Float, UniformData::Float(0.5)));
        assert!(cache.use_program(Some(program)));
    }
}
