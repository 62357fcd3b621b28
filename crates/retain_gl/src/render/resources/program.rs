//! Shader programs
//!
//! A [`Program`] wraps one linked device program together with what
//! reflection told us about it (active uniforms and attribute locations), the
//! client-supplied uniform values, and the fixed-function [`RenderState`]
//! applied every time the program is used.
//!
//! Compile and link failures do not fail construction. The program is kept
//! but marked unusable, a warning carries the driver log, and draws using it
//! are skipped.

use std::collections::HashMap;

use crate::foundation::collections::{SlotMap, TextureKey};
use crate::foundation::logging::WarnBudget;
use crate::render::api::{
    BlendEquation, BlendFactor, BlendFunc, Capability, DepthFunc, DeviceError, DeviceResult, Face,
    FrontFace, GraphicsDevice, ShaderStage, UniformData, UniformType,
};
use crate::render::state::StateCache;

use super::texture::Texture;
use super::uniform::{Uniform, UniformPath, UniformScratch, UniformValue};

/// Attribute names ordered by their linked location
///
/// Two programs with the same order can share a geometry's vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AttributeOrder(Vec<String>);

impl AttributeOrder {
    /// Names in location order
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

/// Fixed-function state applied when a program is used
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    /// Drawn in the transparent or ui bucket
    pub transparent: bool,
    /// Culled face, `None` disables culling
    pub cull_face: Option<Face>,
    /// Front-face winding
    pub front_face: FrontFace,
    /// Depth testing
    pub depth_test: bool,
    /// Depth writes
    pub depth_write: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
    /// Blend function, `None` disables blending
    pub blend_func: Option<BlendFunc>,
    /// Blend equation, left untouched when `None`
    pub blend_equation: Option<BlendEquation>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            transparent: false,
            cull_face: Some(Face::Back),
            front_face: FrontFace::Ccw,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            blend_func: None,
            blend_equation: None,
        }
    }
}

/// Everything needed to create a [`Program`]
#[derive(Debug, Clone, Default)]
pub struct ProgramDescriptor {
    /// Vertex shader source
    pub vertex: String,
    /// Fragment shader source
    pub fragment: String,
    /// Initial uniform values by top-level name
    pub uniforms: HashMap<String, Uniform>,
    /// Render state
    pub state: RenderState,
}

impl ProgramDescriptor {
    /// Descriptor with default render state and no uniforms
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            ..Default::default()
        }
    }

    /// Supply a uniform value
    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<Uniform>) -> Self {
        self.uniforms.insert(name.into(), value.into());
        self
    }

    /// Mark the program transparent
    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.state.transparent = transparent;
        self
    }

    /// Set the culled face, `None` to disable culling
    pub fn with_cull_face(mut self, face: Option<Face>) -> Self {
        self.state.cull_face = face;
        self
    }

    /// Set the front-face winding
    pub fn with_front_face(mut self, winding: FrontFace) -> Self {
        self.state.front_face = winding;
        self
    }

    /// Enable or disable depth testing
    pub fn with_depth_test(mut self, enabled: bool) -> Self {
        self.state.depth_test = enabled;
        self
    }

    /// Enable or disable depth writes
    pub fn with_depth_write(mut self, enabled: bool) -> Self {
        self.state.depth_write = enabled;
        self
    }

    /// Set the depth comparison
    pub fn with_depth_func(mut self, func: DepthFunc) -> Self {
        self.state.depth_func = func;
        self
    }

    /// Set the blend function; also marks the program transparent
    pub fn with_blend_func(mut self, func: BlendFunc) -> Self {
        self.state.blend_func = Some(func);
        self.state.transparent = true;
        self
    }

    /// Set the blend equation
    pub fn with_blend_equation(mut self, equation: BlendEquation) -> Self {
        self.state.blend_equation = Some(equation);
        self
    }
}

/// One active uniform, resolved at link time
struct ReflectedUniform<D: GraphicsDevice> {
    path: UniformPath,
    utype: UniformType,
    location: D::UniformLocation,
}

/// A linked shader program and its render state
pub struct Program<D: GraphicsDevice> {
    id: u64,
    handle: Option<D::Program>,
    uniforms: Vec<ReflectedUniform<D>>,
    attributes: Vec<(String, u32)>,
    attribute_order: AttributeOrder,
    values: HashMap<String, Uniform>,
    state: RenderState,
}

impl<D: GraphicsDevice> Program<D> {
    /// Compile, link and reflect a program
    ///
    /// `id` orders programs in the opaque and ui buckets. Only failure to
    /// allocate device objects is an error.
    pub(crate) fn new(
        cache: &mut StateCache<D>,
        id: u64,
        descriptor: ProgramDescriptor,
        premultiplied_alpha: bool,
        warnings: &mut WarnBudget,
    ) -> DeviceResult<Self> {
        let ProgramDescriptor { vertex, fragment, uniforms: values, mut state } = descriptor;

        if vertex.trim().is_empty() {
            warnings.warn(format_args!("Vertex shader not supplied for program {}", id));
        }
        if fragment.trim().is_empty() {
            warnings.warn(format_args!("Fragment shader not supplied for program {}", id));
        }

        if state.transparent && state.blend_func.is_none() {
            state.blend_func = Some(if premultiplied_alpha {
                BlendFunc::new(BlendFactor::One, BlendFactor::OneMinusSrcAlpha)
            } else {
                BlendFunc::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)
            });
        }

        let mut program = Self {
            id,
            handle: None,
            uniforms: Vec::new(),
            attributes: Vec::new(),
            attribute_order: AttributeOrder::default(),
            values,
            state,
        };

        let handle = match cache.create_program(&vertex, &fragment) {
            Ok(handle) => handle,
            Err(DeviceError::ShaderCompile { stage, log }) => {
                let source = match stage {
                    ShaderStage::Vertex => &vertex,
                    ShaderStage::Fragment => &fragment,
                };
                warnings.warn(format_args!("{}\n{} Shader\n{}", log.trim_end(), stage, numbered(source)));
                return Ok(program);
            }
            Err(DeviceError::Link(log)) => {
                warnings.warn(format_args!("Program {} failed to link: {}", id, log));
                return Ok(program);
            }
            Err(err) => return Err(err),
        };

        for active in cache.active_uniforms(handle) {
            match cache.uniform_location(handle, &active.name) {
                Some(location) => program.uniforms.push(ReflectedUniform {
                    path: UniformPath::parse(&active.name),
                    utype: active.utype,
                    location,
                }),
                None => log::debug!("Active uniform {} has no location", active.name),
            }
        }

        let mut attributes: Vec<(String, u32)> = cache
            .active_attributes(handle)
            .into_iter()
            .filter_map(|name| cache.attrib_location(handle, &name).map(|location| (name, location)))
            .collect();
        attributes.sort_by_key(|(_, location)| *location);
        program.attribute_order = AttributeOrder(attributes.iter().map(|(name, _)| name.clone()).collect());
        program.attributes = attributes;
        program.handle = Some(handle);

        log::debug!(
            "Linked program {} with {} uniforms and {} attributes",
            id,
            program.uniforms.len(),
            program.attributes.len()
        );
        Ok(program)
    }

    /// Creation-order id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether compilation and linking succeeded
    pub fn is_usable(&self) -> bool {
        self.handle.is_some()
    }

    /// Device handle, `None` when unusable
    pub fn handle(&self) -> Option<D::Program> {
        self.handle
    }

    /// Attribute names with their locations, ordered by location
    pub fn attribute_locations(&self) -> &[(String, u32)] {
        &self.attributes
    }

    /// Vertex layout key
    pub fn attribute_order(&self) -> &AttributeOrder {
        &self.attribute_order
    }

    /// Parsed paths of the active uniforms
    pub fn active_uniforms(&self) -> impl Iterator<Item = &UniformPath> {
        self.uniforms.iter().map(|uniform| &uniform.path)
    }

    /// Client value of a top-level uniform
    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.values.get(name)
    }

    /// Mutable client value of a top-level uniform
    pub fn uniform_mut(&mut self, name: &str) -> Option<&mut Uniform> {
        self.values.get_mut(name)
    }

    /// Set a top-level uniform value
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<Uniform>) {
        self.values.insert(name.into(), value.into());
    }

    /// Render state
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Mutable render state
    pub fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    /// Whether the program draws in the transparent or ui bucket
    pub fn is_transparent(&self) -> bool {
        self.state.transparent
    }

    /// Set the blend function and mark the program transparent
    pub fn set_blend_func(&mut self, func: BlendFunc) {
        self.state.blend_func = Some(func);
        self.state.transparent = true;
    }

    /// Set the blend equation
    pub fn set_blend_equation(&mut self, equation: BlendEquation) {
        self.state.blend_equation = Some(equation);
    }

    /// Bind the program, write its uniforms and apply its render state
    ///
    /// Textures take consecutive units starting at 0 and are uploaded lazily
    /// on their unit. `flip_faces` inverts the front face for this use only.
    /// Returns `false` when the program is unusable.
    pub(crate) fn use_program(
        &self,
        cache: &mut StateCache<D>,
        textures: &mut SlotMap<TextureKey, Texture<D>>,
        scratch: &mut UniformScratch,
        warnings: &mut WarnBudget,
        flip_faces: bool,
    ) -> bool {
        let Some(handle) = self.handle else {
            warnings.warn(format_args!("Program {} is unusable, skipping draw", self.id));
            return false;
        };
        cache.use_program(Some(handle));

        let mut next_unit = 0_u32;
        for (index, uniform) in self.uniforms.iter().enumerate() {
            let value = self
                .values
                .get(uniform.path.base())
                .and_then(|supplied| supplied.resolve(&uniform.path));
            let Some(value) = value else {
                warnings.warn(format_args!("Active uniform {} has not been supplied", uniform.path));
                continue;
            };

            match value {
                UniformValue::Texture(key) => {
                    let unit = next_unit;
                    next_unit += 1;
                    update_texture(cache, textures, *key, unit, &uniform.path, warnings);
                    cache.set_uniform(handle, index, &uniform.location, uniform.utype, UniformData::Int(unit as i32));
                }
                UniformValue::Textures(keys) => {
                    scratch.ints.clear();
                    for key in keys {
                        let unit = next_unit;
                        next_unit += 1;
                        update_texture(cache, textures, *key, unit, &uniform.path, warnings);
                        scratch.ints.push(unit as i32);
                    }
                    cache.set_uniform(handle, index, &uniform.location, uniform.utype, UniformData::Ints(&scratch.ints));
                }
                other => {
                    if let Some(data) = other.data(scratch) {
                        cache.set_uniform(handle, index, &uniform.location, uniform.utype, data);
                    }
                }
            }
        }

        self.apply_state(cache, flip_faces);
        true
    }

    fn apply_state(&self, cache: &mut StateCache<D>, flip_faces: bool) {
        let state = &self.state;
        let toggles = [
            (Capability::DepthTest, state.depth_test),
            (Capability::CullFace, state.cull_face.is_some()),
            (Capability::Blend, state.blend_func.is_some()),
        ];
        for (capability, enabled) in toggles {
            if enabled {
                cache.enable(capability);
            } else {
                cache.disable(capability);
            }
        }

        if let Some(face) = state.cull_face {
            cache.set_cull_face(face);
        }
        cache.set_front_face(if flip_faces { state.front_face.flipped() } else { state.front_face });
        cache.set_depth_mask(state.depth_write);
        cache.set_depth_func(state.depth_func);
        if let Some(func) = state.blend_func {
            cache.set_blend_func(func);
        }
        if let Some(equation) = state.blend_equation {
            cache.set_blend_equation(equation);
        }
    }

    /// Release the device program
    pub(crate) fn remove(self, cache: &mut StateCache<D>) {
        if let Some(handle) = self.handle {
            cache.delete_program(handle);
        }
    }
}

fn update_texture<D: GraphicsDevice>(
    cache: &mut StateCache<D>,
    textures: &mut SlotMap<TextureKey, Texture<D>>,
    key: TextureKey,
    unit: u32,
    path: &UniformPath,
    warnings: &mut WarnBudget,
) {
    match textures.get_mut(key) {
        Some(texture) => texture.update(cache, unit),
        None => {
            warnings.warn(format_args!("Uniform {} references a removed texture", path));
        }
    }
}

/// Prefix each source line with its 1-based line number
fn numbered(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::api::BlendOp;
    use crate::render::backends::{DeviceCall, HeadlessDevice, RecordedUniform};

    const VERTEX: &str = "
        attribute vec2 uv;
        attribute vec3 position;
        uniform mat4 modelMatrix;
        uniform vec3 tint;
        void main() {}
    ";
    const FRAGMENT: &str = "
        struct Light { vec3 color; float intensity; };
        uniform Light lights[2];
        uniform sampler2D map;
        void main() {}
    ";

    fn setup() -> (StateCache<HeadlessDevice>, WarnBudget) {
        (StateCache::new(HeadlessDevice::new()), WarnBudget::new(100))
    }

    fn light(intensity: f32) -> HashMap<String, UniformValue> {
        let mut fields = HashMap::new();
        fields.insert("color".to_string(), UniformValue::Vec3(Vec3::new(1.0, 1.0, 1.0)));
        fields.insert("intensity".to_string(), UniformValue::Float(intensity));
        fields
    }

    #[test]
    fn test_reflection_orders_attributes_by_location() {
        let (mut cache, mut warnings) = setup();
        let program = Program::new(&mut cache, 0, ProgramDescriptor::new(VERTEX, FRAGMENT), false, &mut warnings).unwrap();

        assert!(program.is_usable());
        assert_eq!(program.attribute_order().names(), &["uv".to_string(), "position".to_string()]);

        let paths: Vec<String> = program.active_uniforms().map(ToString::to_string).collect();
        assert!(paths.contains(&"lights[1].intensity".to_string()));
        assert!(paths.contains(&"map".to_string()));
    }

    #[test]
    fn test_transparent_program_gets_default_blend() {
        let (mut cache, mut warnings) = setup();
        let descriptor = ProgramDescriptor::new(VERTEX, FRAGMENT).with_transparent(true);

        let straight = Program::new(&mut cache, 0, descriptor.clone(), false, &mut warnings).unwrap();
        let premultiplied = Program::new(&mut cache, 1, descriptor, true, &mut warnings).unwrap();

        assert_eq!(
            straight.state().blend_func,
            Some(BlendFunc::new(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha))
        );
        assert_eq!(
            premultiplied.state().blend_func,
            Some(BlendFunc::new(BlendFactor::One, BlendFactor::OneMinusSrcAlpha))
        );
    }

    #[test]
    fn test_compile_failure_leaves_program_unusable() {
        let (mut cache, mut warnings) = setup();
        let mut textures = SlotMap::with_key();
        let mut scratch = UniformScratch::default();
        let program = Program::new(&mut cache, 0, ProgramDescriptor::new("", FRAGMENT), false, &mut warnings).unwrap();

        assert!(!program.is_usable());
        assert!(!program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, false));
        assert!(warnings.emitted() >= 2);
    }

    #[test]
    fn test_use_resolves_struct_array_members_and_elides_repeats() {
        let (mut cache, mut warnings) = setup();
        let mut textures = SlotMap::with_key();
        let mut scratch = UniformScratch::default();
        let descriptor = ProgramDescriptor::new(VERTEX, FRAGMENT)
            .with_uniform("modelMatrix", crate::foundation::math::Mat4::identity())
            .with_uniform("tint", Vec3::new(1.0, 0.0, 0.0))
            .with_uniform("lights", Uniform::StructArray(vec![light(0.5), light(2.0)]))
            .with_uniform("map", UniformValue::Ints(vec![0]));
        let mut program = Program::new(&mut cache, 0, descriptor, false, &mut warnings).unwrap();

        assert!(program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, false));
        let first = cache.device().count(|c| matches!(c, DeviceCall::SetUniform { .. }));
        assert_eq!(first, 7);

        let mark = cache.device().calls().len();
        program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, false);
        assert!(cache.device().calls_since(mark).is_empty());

        program.set_uniform("tint", Vec3::new(1.0, 0.0, 0.5));
        program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, false);
        let writes: Vec<&DeviceCall> = cache
            .device()
            .calls_since(mark)
            .iter()
            .filter(|c| matches!(c, DeviceCall::SetUniform { .. }))
            .collect();
        assert_eq!(writes.len(), 1);
        assert!(matches!(
            writes[0],
            DeviceCall::SetUniform { value: RecordedUniform::Floats(v), .. } if v == &vec![1.0, 0.0, 0.5]
        ));
    }

    #[test]
    fn test_missing_uniform_warns_and_continues() {
        let (mut cache, mut warnings) = setup();
        let mut textures = SlotMap::with_key();
        let mut scratch = UniformScratch::default();
        let program = Program::new(&mut cache, 0, ProgramDescriptor::new(VERTEX, FRAGMENT), false, &mut warnings).unwrap();

        assert!(program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, false));
        assert!(warnings.emitted() > 0);
        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::SetUniform { .. })), 0);
    }

    #[test]
    fn test_apply_state_flips_front_face() {
        let (mut cache, mut warnings) = setup();
        let mut textures = SlotMap::with_key();
        let mut scratch = UniformScratch::default();
        let descriptor = ProgramDescriptor::new(VERTEX, FRAGMENT)
            .with_blend_func(BlendFunc::new(BlendFactor::One, BlendFactor::One))
            .with_blend_equation(BlendEquation::new(BlendOp::Max));
        let program = Program::new(&mut cache, 0, descriptor, false, &mut warnings).unwrap();
        assert!(program.is_transparent());

        program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, true);
        let device = cache.device();
        assert_eq!(device.count(|c| *c == DeviceCall::FrontFace(FrontFace::Cw)), 1);
        assert_eq!(device.count(|c| *c == DeviceCall::SetCapability(Capability::Blend, true)), 1);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::BlendEquation(_))), 1);

        let mark = device.calls().len();
        program.use_program(&mut cache, &mut textures, &mut scratch, &mut warnings, false);
        let since = cache.device().calls_since(mark);
        assert_eq!(since, &[DeviceCall::FrontFace(FrontFace::Ccw)]);
    }
}
