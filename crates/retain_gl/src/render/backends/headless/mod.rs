//! Headless recording device
//!
//! A [`GraphicsDevice`] with no GPU behind it. Objects are integer names,
//! programs are reflected from their GLSL source, and every call is appended
//! to an inspectable log. Used for tests and for running the scene pipeline
//! where no context exists.

pub mod reflect;

use std::collections::HashMap;

use crate::render::api::{
    ActiveUniform, Attachment, BlendEquation, BlendFunc, BufferTarget, BufferUsage, Capability,
    ClearMask, ComponentType, DepthFunc, DeviceError, DeviceResult, DrawMode, Face, FrontFace,
    GraphicsDevice, PixelStore, RenderbufferFormat, ShaderStage, TextureFormat, TextureParameter,
    TexelType, TextureTarget, TextureUpload, UniformData, UniformType, VertexAttribLayout,
};
use reflect::ShaderInterface;

/// Location of a uniform within a headless program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessUniform {
    /// Program name
    pub program: u32,
    /// Index into the program's active uniforms
    pub index: u32,
}

/// Owned copy of a uniform payload
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUniform {
    /// Single float
    Float(f32),
    /// Single integer
    Int(i32),
    /// Flattened floats
    Floats(Vec<f32>),
    /// Flattened integers
    Ints(Vec<i32>),
}

impl From<UniformData<'_>> for RecordedUniform {
    fn from(data: UniformData<'_>) -> Self {
        match data {
            UniformData::Float(v) => Self::Float(v),
            UniformData::Int(v) => Self::Int(v),
            UniformData::Floats(v) => Self::Floats(v.to_vec()),
            UniformData::Ints(v) => Self::Ints(v.to_vec()),
        }
    }
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum DeviceCall {
    SetCapability(Capability, bool),
    BlendFunc(BlendFunc),
    BlendEquation(BlendEquation),
    CullFace(Face),
    FrontFace(FrontFace),
    DepthMask(bool),
    DepthFunc(DepthFunc),
    Viewport { x: i32, y: i32, width: i32, height: i32 },
    BindFramebuffer(Option<u32>),
    ActiveTexture(u32),
    BindTexture(Option<u32>),
    PixelStore(PixelStore),
    BindBuffer(BufferTarget, Option<u32>),
    BindVertexArray(Option<u32>),
    UseProgram(Option<u32>),
    Clear(ClearMask),
    CreateBuffer(u32),
    BufferData { target: BufferTarget, bytes: usize },
    DeleteBuffer(u32),
    CreateVertexArray(u32),
    DeleteVertexArray(u32),
    VertexAttribPointer { location: u32, layout: VertexAttribLayout },
    EnableVertexAttribArray(u32),
    VertexAttribDivisor { location: u32, divisor: u32 },
    CreateProgram(u32),
    DeleteProgram(u32),
    SetUniform { location: HeadlessUniform, utype: UniformType, value: RecordedUniform },
    CreateTexture(u32),
    DeleteTexture(u32),
    TexParameter(TextureParameter),
    TexImage2D {
        level: i32,
        internal_format: TextureFormat,
        format: TextureFormat,
        texel_type: TexelType,
        width: u32,
        height: u32,
        has_pixels: bool,
    },
    GenerateMipmap,
    CreateFramebuffer(u32),
    DeleteFramebuffer(u32),
    FramebufferTexture2D { attachment: Attachment, texture: u32 },
    CreateRenderbuffer(u32),
    DeleteRenderbuffer(u32),
    RenderbufferStorage { renderbuffer: u32, format: RenderbufferFormat, width: u32, height: u32 },
    FramebufferRenderbuffer { attachment: Attachment, renderbuffer: u32 },
    DrawArrays { mode: DrawMode, first: i32, count: i32 },
    DrawElements { mode: DrawMode, count: i32, index_type: ComponentType, offset: i32 },
    DrawArraysInstanced { mode: DrawMode, first: i32, count: i32, instances: i32 },
    DrawElementsInstanced { mode: DrawMode, count: i32, index_type: ComponentType, offset: i32, instances: i32 },
}

impl DeviceCall {
    /// Whether this call issues primitives
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawArrays { .. }
                | Self::DrawElements { .. }
                | Self::DrawArraysInstanced { .. }
                | Self::DrawElementsInstanced { .. }
        )
    }
}

/// Recording device without a GPU
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_name: u32,
    calls: Vec<DeviceCall>,
    programs: HashMap<u32, ShaderInterface>,
    texture_limit: Option<usize>,
    textures_created: usize,
}

impl HeadlessDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail texture creation once `limit` textures have been created
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.texture_limit = Some(limit);
        self
    }

    /// Every call issued so far, oldest first
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Calls issued after the first `since` entries
    pub fn calls_since(&self, since: usize) -> &[DeviceCall] {
        &self.calls[since.min(self.calls.len())..]
    }

    /// Number of recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Recorded draw calls
    pub fn draw_calls(&self) -> Vec<&DeviceCall> {
        self.calls.iter().filter(|call| call.is_draw()).collect()
    }

    /// Reflected interface of a program
    pub fn interface(&self, program: u32) -> Option<&ShaderInterface> {
        self.programs.get(&program)
    }

    fn allocate(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }

    fn record(&mut self, call: DeviceCall) {
        log::trace!("device: {:?}", call);
        self.calls.push(call);
    }

    fn compile(stage: ShaderStage, source: &str) -> DeviceResult<()> {
        if source.trim().is_empty() {
            return Err(DeviceError::ShaderCompile {
                stage,
                log: "ERROR: 0:1: '' : syntax error, empty source".to_string(),
            });
        }
        let declares_main = source
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .any(|word| word == "main");
        if !declares_main {
            return Err(DeviceError::ShaderCompile {
                stage,
                log: "ERROR: 0:1: 'main' : function not defined".to_string(),
            });
        }
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    type Buffer = u32;
    type VertexArray = u32;
    type Program = u32;
    type Texture = u32;
    type Framebuffer = u32;
    type Renderbuffer = u32;
    type UniformLocation = HeadlessUniform;

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.record(DeviceCall::SetCapability(capability, enabled));
    }

    fn blend_func(&mut self, func: BlendFunc) {
        self.record(DeviceCall::BlendFunc(func));
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        self.record(DeviceCall::BlendEquation(equation));
    }

    fn cull_face(&mut self, face: Face) {
        self.record(DeviceCall::CullFace(face));
    }

    fn front_face(&mut self, winding: FrontFace) {
        self.record(DeviceCall::FrontFace(winding));
    }

    fn depth_mask(&mut self, enabled: bool) {
        self.record(DeviceCall::DepthMask(enabled));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.record(DeviceCall::DepthFunc(func));
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(DeviceCall::Viewport { x, y, width, height });
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<u32>) {
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(DeviceCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, _target: TextureTarget, texture: Option<u32>) {
        self.record(DeviceCall::BindTexture(texture));
    }

    fn pixel_store(&mut self, param: PixelStore) {
        self.record(DeviceCall::PixelStore(param));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<u32>) {
        self.record(DeviceCall::BindBuffer(target, buffer));
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<u32>) {
        self.record(DeviceCall::BindVertexArray(vertex_array));
    }

    fn use_program(&mut self, program: Option<u32>) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.record(DeviceCall::Clear(mask));
    }

    fn create_buffer(&mut self) -> DeviceResult<u32> {
        let name = self.allocate();
        self.record(DeviceCall::CreateBuffer(name));
        Ok(name)
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], _usage: BufferUsage) {
        self.record(DeviceCall::BufferData { target, bytes: data.len() });
    }

    fn delete_buffer(&mut self, buffer: u32) {
        self.record(DeviceCall::DeleteBuffer(buffer));
    }

    fn create_vertex_array(&mut self) -> DeviceResult<u32> {
        let name = self.allocate();
        self.record(DeviceCall::CreateVertexArray(name));
        Ok(name)
    }

    fn delete_vertex_array(&mut self, vertex_array: u32) {
        self.record(DeviceCall::DeleteVertexArray(vertex_array));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: VertexAttribLayout) {
        self.record(DeviceCall::VertexAttribPointer { location, layout });
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.record(DeviceCall::EnableVertexAttribArray(location));
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.record(DeviceCall::VertexAttribDivisor { location, divisor });
    }

    fn create_program(&mut self, vertex: &str, fragment: &str) -> DeviceResult<u32> {
        Self::compile(ShaderStage::Vertex, vertex)?;
        Self::compile(ShaderStage::Fragment, fragment)?;
        let name = self.allocate();
        self.programs.insert(name, reflect::reflect(vertex, fragment));
        self.record(DeviceCall::CreateProgram(name));
        Ok(name)
    }

    fn delete_program(&mut self, program: u32) {
        self.programs.remove(&program);
        self.record(DeviceCall::DeleteProgram(program));
    }

    fn active_uniforms(&self, program: u32) -> Vec<ActiveUniform> {
        self.programs
            .get(&program)
            .map(|interface| interface.uniforms.clone())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<HeadlessUniform> {
        let index = self.programs.get(&program)?.uniform_index(name)?;
        Some(HeadlessUniform { program, index: index as u32 })
    }

    fn active_attributes(&self, program: u32) -> Vec<String> {
        self.programs
            .get(&program)
            .map(|interface| interface.attributes.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    fn attrib_location(&self, program: u32, name: &str) -> Option<u32> {
        self.programs.get(&program)?.attribute_location(name)
    }

    fn set_uniform(&mut self, location: &HeadlessUniform, utype: UniformType, data: UniformData<'_>) {
        self.record(DeviceCall::SetUniform { location: *location, utype, value: data.into() });
    }

    fn create_texture(&mut self) -> DeviceResult<u32> {
        if self.texture_limit.is_some_and(|limit| self.textures_created >= limit) {
            return Err(DeviceError::ObjectCreation { kind: "texture", message: "out of memory".to_string() });
        }
        self.textures_created += 1;
        let name = self.allocate();
        self.record(DeviceCall::CreateTexture(name));
        Ok(name)
    }

    fn delete_texture(&mut self, texture: u32) {
        self.record(DeviceCall::DeleteTexture(texture));
    }

    fn tex_parameter(&mut self, _target: TextureTarget, param: TextureParameter) {
        self.record(DeviceCall::TexParameter(param));
    }

    fn tex_image_2d(&mut self, _target: TextureTarget, upload: TextureUpload<'_>) {
        self.record(DeviceCall::TexImage2D {
            level: upload.level,
            internal_format: upload.internal_format,
            format: upload.format,
            texel_type: upload.texel_type,
            width: upload.width,
            height: upload.height,
            has_pixels: upload.pixels.is_some(),
        });
    }

    fn generate_mipmap(&mut self, _target: TextureTarget) {
        self.record(DeviceCall::GenerateMipmap);
    }

    fn create_framebuffer(&mut self) -> DeviceResult<u32> {
        let name = self.allocate();
        self.record(DeviceCall::CreateFramebuffer(name));
        Ok(name)
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        self.record(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&mut self, attachment: Attachment, texture: u32, _level: i32) {
        self.record(DeviceCall::FramebufferTexture2D { attachment, texture });
    }

    fn create_renderbuffer(&mut self) -> DeviceResult<u32> {
        let name = self.allocate();
        self.record(DeviceCall::CreateRenderbuffer(name));
        Ok(name)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: u32) {
        self.record(DeviceCall::DeleteRenderbuffer(renderbuffer));
    }

    fn renderbuffer_storage(&mut self, renderbuffer: u32, format: RenderbufferFormat, width: u32, height: u32) {
        self.record(DeviceCall::RenderbufferStorage { renderbuffer, format, width, height });
    }

    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: u32) {
        self.record(DeviceCall::FramebufferRenderbuffer { attachment, renderbuffer });
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        self.record(DeviceCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32) {
        self.record(DeviceCall::DrawElements { mode, count, index_type, offset });
    }

    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32) {
        self.record(DeviceCall::DrawArraysInstanced { mode, first, count, instances });
    }

    fn draw_elements_instanced(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32, instances: i32) {
        self.record(DeviceCall::DrawElementsInstanced { mode, count, index_type, offset, instances });
    }
}
