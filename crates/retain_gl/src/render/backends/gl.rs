//! OpenGL / WebGL2 device through `glow`
//!
//! Every `glow` entry point is `unsafe`: the caller promises the context is
//! current on this thread and that handles belong to it. [`GlowDevice`] owns
//! its context, so both hold for as long as the device lives on the thread
//! that created the context.
#![allow(unsafe_code)]

use glow::HasContext;

use crate::render::api::{
    ActiveUniform, Attachment, BlendEquation, BlendFunc, BufferTarget, BufferUsage, Capability,
    ClearMask, ComponentType, DepthFunc, DeviceError, DeviceResult, DrawMode, Face, FrontFace,
    GraphicsDevice, PixelStore, RenderbufferFormat, ShaderStage, TextureParameter, TextureTarget,
    TextureUpload, UniformData, UniformType, VertexAttribLayout,
};

// WebGL-only unpack parameters; desktop GL rejects them.
const UNPACK_FLIP_Y_WEBGL: u32 = 0x9240;
const UNPACK_PREMULTIPLY_ALPHA_WEBGL: u32 = 0x9241;

type Gl = glow::Context;

/// Device backed by a `glow` context
pub struct GlowDevice {
    gl: Gl,
}

impl GlowDevice {
    /// Wrap a context that is current on this thread
    pub fn new(gl: Gl) -> Self {
        Self { gl }
    }

    /// The wrapped context
    pub fn context(&self) -> &Gl {
        &self.gl
    }

    fn compile(&self, stage: ShaderStage, source: &str) -> DeviceResult<<Gl as HasContext>::Shader> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let shader = self
                .gl
                .create_shader(kind)
                .map_err(|message| DeviceError::ObjectCreation { kind: "shader", message })?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(DeviceError::ShaderCompile { stage, log });
            }
            Ok(shader)
        }
    }

    fn uniform_floats(&self, location: Option<&<Gl as HasContext>::UniformLocation>, utype: UniformType, values: &[f32]) {
        unsafe {
            match utype {
                UniformType::Float => self.gl.uniform_1_f32_slice(location, values),
                UniformType::FloatVec2 => self.gl.uniform_2_f32_slice(location, values),
                UniformType::FloatVec3 => self.gl.uniform_3_f32_slice(location, values),
                UniformType::FloatVec4 => self.gl.uniform_4_f32_slice(location, values),
                UniformType::FloatMat2 => self.gl.uniform_matrix_2_f32_slice(location, false, values),
                UniformType::FloatMat3 => self.gl.uniform_matrix_3_f32_slice(location, false, values),
                UniformType::FloatMat4 => self.gl.uniform_matrix_4_f32_slice(location, false, values),
                _ => {
                    let ints: Vec<i32> = values.iter().map(|v| *v as i32).collect();
                    self.uniform_ints(location, utype, &ints);
                }
            }
        }
    }

    fn uniform_ints(&self, location: Option<&<Gl as HasContext>::UniformLocation>, utype: UniformType, values: &[i32]) {
        unsafe {
            match utype {
                UniformType::Int | UniformType::Bool | UniformType::Sampler2D | UniformType::SamplerCube => {
                    self.gl.uniform_1_i32_slice(location, values);
                }
                UniformType::IntVec2 | UniformType::BoolVec2 => self.gl.uniform_2_i32_slice(location, values),
                UniformType::IntVec3 | UniformType::BoolVec3 => self.gl.uniform_3_i32_slice(location, values),
                UniformType::IntVec4 | UniformType::BoolVec4 => self.gl.uniform_4_i32_slice(location, values),
                _ => {
                    let floats: Vec<f32> = values.iter().map(|v| *v as f32).collect();
                    self.uniform_floats(location, utype, &floats);
                }
            }
        }
    }
}

impl GraphicsDevice for GlowDevice {
    type Buffer = <Gl as HasContext>::Buffer;
    type VertexArray = <Gl as HasContext>::VertexArray;
    type Program = <Gl as HasContext>::Program;
    type Texture = <Gl as HasContext>::Texture;
    type Framebuffer = <Gl as HasContext>::Framebuffer;
    type Renderbuffer = <Gl as HasContext>::Renderbuffer;
    type UniformLocation = <Gl as HasContext>::UniformLocation;

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(capability.gl());
            } else {
                self.gl.disable(capability.gl());
            }
        }
    }

    fn blend_func(&mut self, func: BlendFunc) {
        unsafe {
            match func.alpha {
                Some((src_alpha, dst_alpha)) => self.gl.blend_func_separate(
                    func.src.gl(),
                    func.dst.gl(),
                    src_alpha.gl(),
                    dst_alpha.gl(),
                ),
                None => self.gl.blend_func(func.src.gl(), func.dst.gl()),
            }
        }
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        unsafe {
            match equation.alpha {
                Some(alpha) => self.gl.blend_equation_separate(equation.rgb.gl(), alpha.gl()),
                None => self.gl.blend_equation(equation.rgb.gl()),
            }
        }
    }

    fn cull_face(&mut self, face: Face) {
        unsafe { self.gl.cull_face(face.gl()) }
    }

    fn front_face(&mut self, winding: FrontFace) {
        unsafe { self.gl.front_face(winding.gl()) }
    }

    fn depth_mask(&mut self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) }
    }

    fn depth_func(&mut self, func: DepthFunc) {
        unsafe { self.gl.depth_func(func.gl()) }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<Self::Framebuffer>) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, framebuffer) }
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<Self::Texture>) {
        unsafe { self.gl.bind_texture(target.gl(), texture) }
    }

    fn pixel_store(&mut self, param: PixelStore) {
        unsafe {
            match param {
                PixelStore::UnpackAlignment(alignment) => {
                    self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, alignment);
                }
                PixelStore::FlipY(flip) if cfg!(target_arch = "wasm32") => {
                    self.gl.pixel_store_bool(UNPACK_FLIP_Y_WEBGL, flip);
                }
                PixelStore::PremultiplyAlpha(premultiply) if cfg!(target_arch = "wasm32") => {
                    self.gl.pixel_store_bool(UNPACK_PREMULTIPLY_ALPHA_WEBGL, premultiply);
                }
                other => log::debug!("{:?} is only honoured by WebGL contexts", other),
            }
        }
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<Self::Buffer>) {
        unsafe { self.gl.bind_buffer(target.gl(), buffer) }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>) {
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn use_program(&mut self, program: Option<Self::Program>) {
        unsafe { self.gl.use_program(program) }
    }

    fn clear(&mut self, mask: ClearMask) {
        unsafe { self.gl.clear(mask.bits()) }
    }

    fn create_buffer(&mut self) -> DeviceResult<Self::Buffer> {
        unsafe { self.gl.create_buffer() }.map_err(|message| DeviceError::ObjectCreation { kind: "buffer", message })
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe { self.gl.buffer_data_u8_slice(target.gl(), data, usage.gl()) }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn create_vertex_array(&mut self) -> DeviceResult<Self::VertexArray> {
        unsafe { self.gl.create_vertex_array() }
            .map_err(|message| DeviceError::ObjectCreation { kind: "vertex array", message })
    }

    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray) {
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: VertexAttribLayout) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                location,
                layout.size,
                layout.component.gl(),
                layout.normalized,
                0,
                0,
            );
        }
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(location) }
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        unsafe { self.gl.vertex_attrib_divisor(location, divisor) }
    }

    fn create_program(&mut self, vertex: &str, fragment: &str) -> DeviceResult<Self::Program> {
        let vertex_shader = self.compile(ShaderStage::Vertex, vertex)?;
        let fragment_shader = match self.compile(ShaderStage::Fragment, fragment) {
            Ok(shader) => shader,
            Err(err) => {
                unsafe { self.gl.delete_shader(vertex_shader) };
                return Err(err);
            }
        };

        unsafe {
            let program = self
                .gl
                .create_program()
                .map_err(|message| DeviceError::ObjectCreation { kind: "program", message })?;
            self.gl.attach_shader(program, vertex_shader);
            self.gl.attach_shader(program, fragment_shader);
            self.gl.link_program(program);
            let linked = self.gl.get_program_link_status(program);

            self.gl.detach_shader(program, vertex_shader);
            self.gl.detach_shader(program, fragment_shader);
            self.gl.delete_shader(vertex_shader);
            self.gl.delete_shader(fragment_shader);

            if !linked {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(DeviceError::Link(log));
            }
            Ok(program)
        }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) }
    }

    fn active_uniforms(&self, program: Self::Program) -> Vec<ActiveUniform> {
        unsafe {
            let count = self.gl.get_active_uniforms(program);
            (0..count)
                .filter_map(|index| self.gl.get_active_uniform(program, index))
                .filter_map(|uniform| match UniformType::from_gl(uniform.utype) {
                    Some(utype) => Some(ActiveUniform { name: uniform.name, utype, size: uniform.size }),
                    None => {
                        log::debug!("Ignoring uniform {} of unsupported type {:#x}", uniform.name, uniform.utype);
                        None
                    }
                })
                .collect()
        }
    }

    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn active_attributes(&self, program: Self::Program) -> Vec<String> {
        unsafe {
            let count = self.gl.get_active_attributes(program);
            (0..count)
                .filter_map(|index| self.gl.get_active_attribute(program, index))
                .map(|attribute| attribute.name)
                .collect()
        }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(program, name) }
    }

    fn set_uniform(&mut self, location: &Self::UniformLocation, utype: UniformType, data: UniformData<'_>) {
        let location = Some(location);
        unsafe {
            match data {
                UniformData::Float(value) if utype.is_integer() => self.gl.uniform_1_i32(location, value as i32),
                UniformData::Float(value) => self.gl.uniform_1_f32(location, value),
                UniformData::Int(value) if utype.is_integer() => self.gl.uniform_1_i32(location, value),
                UniformData::Int(value) => self.gl.uniform_1_f32(location, value as f32),
                UniformData::Floats(values) => self.uniform_floats(location, utype, values),
                UniformData::Ints(values) => self.uniform_ints(location, utype, values),
            }
        }
    }

    fn create_texture(&mut self) -> DeviceResult<Self::Texture> {
        unsafe { self.gl.create_texture() }.map_err(|message| DeviceError::ObjectCreation { kind: "texture", message })
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) }
    }

    fn tex_parameter(&mut self, target: TextureTarget, param: TextureParameter) {
        let (name, value) = match param {
            TextureParameter::MinFilter(filter) => (glow::TEXTURE_MIN_FILTER, filter.gl()),
            TextureParameter::MagFilter(filter) => (glow::TEXTURE_MAG_FILTER, filter.gl()),
            TextureParameter::WrapS(wrap) => (glow::TEXTURE_WRAP_S, wrap.gl()),
            TextureParameter::WrapT(wrap) => (glow::TEXTURE_WRAP_T, wrap.gl()),
        };
        unsafe { self.gl.tex_parameter_i32(target.gl(), name, value as i32) }
    }

    fn tex_image_2d(&mut self, target: TextureTarget, upload: TextureUpload<'_>) {
        unsafe {
            self.gl.tex_image_2d(
                target.gl(),
                upload.level,
                upload.internal_format.gl() as i32,
                upload.width as i32,
                upload.height as i32,
                0,
                upload.format.gl(),
                upload.texel_type.gl(),
                upload.pixels,
            );
        }
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        unsafe { self.gl.generate_mipmap(target.gl()) }
    }

    fn create_framebuffer(&mut self) -> DeviceResult<Self::Framebuffer> {
        unsafe { self.gl.create_framebuffer() }
            .map_err(|message| DeviceError::ObjectCreation { kind: "framebuffer", message })
    }

    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) }
    }

    fn framebuffer_texture_2d(&mut self, attachment: Attachment, texture: Self::Texture, level: i32) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment.gl(),
                glow::TEXTURE_2D,
                Some(texture),
                level,
            );
        }
    }

    fn create_renderbuffer(&mut self) -> DeviceResult<Self::Renderbuffer> {
        unsafe { self.gl.create_renderbuffer() }
            .map_err(|message| DeviceError::ObjectCreation { kind: "renderbuffer", message })
    }

    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer) {
        unsafe { self.gl.delete_renderbuffer(renderbuffer) }
    }

    fn renderbuffer_storage(&mut self, renderbuffer: Self::Renderbuffer, format: RenderbufferFormat, width: u32, height: u32) {
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            self.gl.renderbuffer_storage(glow::RENDERBUFFER, format.gl(), width as i32, height as i32);
        }
    }

    fn framebuffer_renderbuffer(&mut self, attachment: Attachment, renderbuffer: Self::Renderbuffer) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                attachment.gl(),
                glow::RENDERBUFFER,
                Some(renderbuffer),
            );
        }
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(mode.gl(), first, count) }
    }

    fn draw_elements(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32) {
        unsafe { self.gl.draw_elements(mode.gl(), count, index_type.gl(), offset) }
    }

    fn draw_arrays_instanced(&mut self, mode: DrawMode, first: i32, count: i32, instances: i32) {
        unsafe { self.gl.draw_arrays_instanced(mode.gl(), first, count, instances) }
    }

    fn draw_elements_instanced(&mut self, mode: DrawMode, count: i32, index_type: ComponentType, offset: i32, instances: i32) {
        unsafe { self.gl.draw_elements_instanced(mode.gl(), count, index_type.gl(), offset, instances) }
    }
}
