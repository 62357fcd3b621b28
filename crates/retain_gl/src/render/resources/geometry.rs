//! Vertex and index data
//!
//! A [`Geometry`] owns one device buffer per attribute plus an optional index
//! buffer. Vertex layouts (vertex array objects) are created lazily, one per
//! distinct program [`AttributeOrder`] that draws the geometry, and reused on
//! every later draw with a compatible program.

use std::collections::HashMap;

use crate::foundation::logging::WarnBudget;
use crate::foundation::math::Vec3;
use crate::render::api::{
    BufferTarget, BufferUsage, ComponentType, DeviceResult, DrawMode, GraphicsDevice,
    VertexAttribLayout,
};
use crate::render::state::StateCache;
use crate::scene::frustum::AABB;

use super::program::{AttributeOrder, Program};

/// Attribute name treated as the index buffer
pub const INDEX_ATTRIBUTE: &str = "index";

/// Attribute name used for bounds
pub const POSITION_ATTRIBUTE: &str = "position";

/// Typed attribute storage
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    /// 32-bit floats
    F32(Vec<f32>),
    /// Unsigned bytes
    U8(Vec<u8>),
    /// Unsigned shorts
    U16(Vec<u16>),
    /// Unsigned ints
    U32(Vec<u32>),
}

impl AttributeData {
    /// Number of components
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    /// Whether there are no components
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Component type as the device sees it
    pub fn component(&self) -> ComponentType {
        match self {
            Self::F32(_) => ComponentType::Float,
            Self::U8(_) => ComponentType::UnsignedByte,
            Self::U16(_) => ComponentType::UnsignedShort,
            Self::U32(_) => ComponentType::UnsignedInt,
        }
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::F32(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v,
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Float components, if that is the storage type
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Vec<f32>> for AttributeData {
    fn from(v: Vec<f32>) -> Self {
        Self::F32(v)
    }
}

impl From<Vec<u8>> for AttributeData {
    fn from(v: Vec<u8>) -> Self {
        Self::U8(v)
    }
}

impl From<Vec<u16>> for AttributeData {
    fn from(v: Vec<u16>) -> Self {
        Self::U16(v)
    }
}

impl From<Vec<u32>> for AttributeData {
    fn from(v: Vec<u32>) -> Self {
        Self::U32(v)
    }
}

/// One vertex attribute or the index list
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Components per vertex (1-4)
    pub size: i32,
    /// Backing data
    pub data: AttributeData,
    /// Normalize integer components
    pub normalized: bool,
    /// Per-instance divisor, 0 for per-vertex data
    pub divisor: u32,
    /// Buffer usage hint
    pub usage: BufferUsage,
}

impl Attribute {
    /// Per-vertex attribute with `size` components per vertex
    pub fn new(size: i32, data: impl Into<AttributeData>) -> Self {
        Self {
            size: size.max(1),
            data: data.into(),
            normalized: false,
            divisor: 0,
            usage: BufferUsage::StaticDraw,
        }
    }

    /// Index list (one component per element)
    pub fn index(data: impl Into<AttributeData>) -> Self {
        Self::new(1, data)
    }

    /// Normalize integer components
    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Advance once every `divisor` instances instead of once per vertex
    pub fn instanced(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }

    /// Set the buffer usage hint
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Number of vertices (or indices) held
    pub fn count(&self) -> usize {
        self.data.len() / self.size as usize
    }

    fn layout(&self) -> VertexAttribLayout {
        VertexAttribLayout {
            size: self.size,
            component: self.data.component(),
            normalized: self.normalized,
        }
    }
}

/// Range of vertices or indices drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    /// First element, counted in vertices or indices (never bytes)
    ///
    /// Indexed draws pass `start * index size` to the device as the byte offset.
    pub start: usize,
    /// Element count
    pub count: usize,
}

/// Bounding volume of a geometry's positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
    /// Box center
    pub center: Vec3,
    /// Box size
    pub scale: Vec3,
    /// Distance from `center` to the farthest position
    pub radius: f32,
}

impl Bounds {
    /// Compute bounds from packed positions with `stride` components each
    ///
    /// Two-component positions are treated as lying at z = 0. Returns `None`
    /// when there are no positions.
    pub fn from_positions(data: &[f32], stride: usize) -> Option<Self> {
        if stride < 2 {
            return None;
        }
        let point = |chunk: &[f32]| Vec3::new(chunk[0], chunk[1], chunk.get(2).copied().unwrap_or(0.0));
        let aabb = AABB::from_points(data.chunks_exact(stride).map(point))?;
        let center = aabb.center();
        let radius = data
            .chunks_exact(stride)
            .map(|chunk| (point(chunk) - center).norm_squared())
            .fold(0.0_f32, f32::max)
            .sqrt();

        Some(Self {
            min: aabb.min,
            max: aabb.max,
            center,
            scale: aabb.max - aabb.min,
            radius,
        })
    }
}

struct BufferedAttribute<D: GraphicsDevice> {
    attribute: Attribute,
    buffer: D::Buffer,
    target: BufferTarget,
    needs_update: bool,
}

impl<D: GraphicsDevice> BufferedAttribute<D> {
    fn upload(&mut self, cache: &mut StateCache<D>) {
        cache.upload_buffer(self.target, self.buffer, self.attribute.data.as_bytes(), self.attribute.usage);
        self.needs_update = false;
    }
}

/// Device buffers for a set of attributes
pub struct Geometry<D: GraphicsDevice> {
    attributes: HashMap<String, BufferedAttribute<D>>,
    index: Option<BufferedAttribute<D>>,
    layouts: HashMap<AttributeOrder, D::VertexArray>,
    draw_range: DrawRange,
    instanced_count: usize,
    instanced: bool,
    bounds: Option<Bounds>,
}

impl<D: GraphicsDevice> Geometry<D> {
    /// Upload every attribute; an attribute named [`INDEX_ATTRIBUTE`] becomes the index
    pub(crate) fn new<K: Into<String>>(
        cache: &mut StateCache<D>,
        attributes: impl IntoIterator<Item = (K, Attribute)>,
        warnings: &mut WarnBudget,
    ) -> DeviceResult<Self> {
        let mut geometry = Self {
            attributes: HashMap::new(),
            index: None,
            layouts: HashMap::new(),
            draw_range: DrawRange::default(),
            instanced_count: 0,
            instanced: false,
            bounds: None,
        };
        for (name, attribute) in attributes {
            geometry.add_attribute(cache, name, attribute, warnings)?;
        }
        Ok(geometry)
    }

    /// Create and upload a buffer for `attribute`, replacing any of the same name
    ///
    /// Per-instance attributes make the geometry instanced; when they disagree
    /// on instance count the smallest wins. Without an index, the draw count
    /// grows to the longest per-vertex attribute.
    ///
    /// Replacing an attribute drops the cached vertex arrays. Adding a new
    /// name does not: a vertex array built for a program while the attribute
    /// was missing stays without it until the attribute is replaced.
    pub(crate) fn add_attribute(
        &mut self,
        cache: &mut StateCache<D>,
        name: impl Into<String>,
        attribute: Attribute,
        warnings: &mut WarnBudget,
    ) -> DeviceResult<()> {
        let name = name.into();
        let is_index = name == INDEX_ATTRIBUTE;
        let target = if is_index { BufferTarget::ElementArray } else { BufferTarget::Array };

        let buffer = cache.create_buffer()?;
        if is_index {
            // The element binding belongs to whichever vertex array is bound.
            cache.bind_vertex_array(None);
        }
        let mut buffered = BufferedAttribute { attribute, buffer, target, needs_update: false };
        buffered.upload(cache);

        let count = buffered.attribute.count();
        let divisor = buffered.attribute.divisor as usize;
        if divisor > 0 {
            self.instanced = true;
            let instances = count * divisor;
            if self.instanced_count != 0 && self.instanced_count != instances {
                warnings.warn(format_args!(
                    "Geometry has instanced attributes of different lengths ({} and {} instances)",
                    self.instanced_count, instances
                ));
                self.instanced_count = self.instanced_count.min(instances);
            } else {
                self.instanced_count = instances;
            }
        } else if is_index {
            self.draw_range.count = count;
        } else if self.index.is_none() {
            self.draw_range.count = self.draw_range.count.max(count);
        }

        if name == POSITION_ATTRIBUTE {
            self.bounds = None;
        }
        let replaced = if is_index {
            self.index.replace(buffered)
        } else {
            self.attributes.insert(name, buffered)
        };
        if let Some(old) = replaced {
            cache.delete_buffer(old.buffer);
            self.drop_layouts(cache);
        }
        Ok(())
    }

    /// Set or replace the index list
    pub(crate) fn set_index(&mut self, cache: &mut StateCache<D>, index: Attribute, warnings: &mut WarnBudget) -> DeviceResult<()> {
        self.add_attribute(cache, INDEX_ATTRIBUTE, index, warnings)
    }

    /// Replace an attribute's data; it is re-uploaded before the next draw
    ///
    /// Returns `false` if there is no such attribute.
    pub fn update_attribute(&mut self, name: &str, data: impl Into<AttributeData>) -> bool {
        let slot = if name == INDEX_ATTRIBUTE { self.index.as_mut() } else { self.attributes.get_mut(name) };
        let Some(buffered) = slot else {
            return false;
        };
        buffered.attribute.data = data.into();
        buffered.needs_update = true;
        if name == POSITION_ATTRIBUTE {
            self.bounds = None;
        }
        true
    }

    /// Attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        if name == INDEX_ATTRIBUTE {
            return self.index();
        }
        self.attributes.get(name).map(|buffered| &buffered.attribute)
    }

    /// Index list, if indexed
    pub fn index(&self) -> Option<&Attribute> {
        self.index.as_ref().map(|buffered| &buffered.attribute)
    }

    /// Draw range
    pub fn draw_range(&self) -> DrawRange {
        self.draw_range
    }

    /// Set the draw range
    pub fn set_draw_range(&mut self, start: usize, count: usize) {
        self.draw_range = DrawRange { start, count };
    }

    /// Instance count for instanced draws
    pub fn instanced_count(&self) -> usize {
        self.instanced_count
    }

    /// Override the instance count
    pub fn set_instanced_count(&mut self, count: usize) {
        self.instanced_count = count;
    }

    /// Whether any attribute is per-instance
    pub fn is_instanced(&self) -> bool {
        self.instanced
    }

    /// Number of vertex layouts created so far
    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    /// Bounds of the position attribute, computed on first request
    ///
    /// `None` without float positions.
    pub fn bounds(&mut self) -> Option<&Bounds> {
        if self.bounds.is_none() {
            self.bounds = self.attributes.get(POSITION_ATTRIBUTE).and_then(|position| {
                let data = position.attribute.data.as_f32()?;
                Bounds::from_positions(data, position.attribute.size as usize)
            });
        }
        self.bounds.as_ref()
    }

    /// Bind the vertex layout for `program`, flush dirty buffers and draw
    pub(crate) fn draw(
        &mut self,
        cache: &mut StateCache<D>,
        program: &Program<D>,
        mode: DrawMode,
        warnings: &mut WarnBudget,
    ) -> DeviceResult<()> {
        let order = program.attribute_order();
        let vertex_array = match self.layouts.get(order) {
            Some(vertex_array) => *vertex_array,
            None => {
                let vertex_array = cache.create_vertex_array()?;
                cache.bind_vertex_array(Some(vertex_array));
                self.bind_attributes(cache, program, warnings);
                self.layouts.insert(order.clone(), vertex_array);
                vertex_array
            }
        };
        cache.bind_vertex_array(Some(vertex_array));

        for (name, _) in program.attribute_locations() {
            if let Some(buffered) = self.attributes.get_mut(name) {
                if buffered.needs_update {
                    buffered.upload(cache);
                }
            }
        }
        if let Some(index) = self.index.as_mut() {
            if index.needs_update {
                index.upload(cache);
            }
        }

        let count = gl_int(self.draw_range.count);
        let instances = gl_int(self.instanced_count);
        match (&self.index, self.instanced) {
            (Some(index), instanced) => {
                let component = index.attribute.data.component();
                let offset = gl_int(self.draw_range.start * component.byte_size());
                if instanced {
                    cache.draw_elements_instanced(mode, count, component, offset, instances);
                } else {
                    cache.draw_elements(mode, count, component, offset);
                }
            }
            (None, true) => cache.draw_arrays_instanced(mode, gl_int(self.draw_range.start), count, instances),
            (None, false) => cache.draw_arrays(mode, gl_int(self.draw_range.start), count),
        }
        Ok(())
    }

    fn bind_attributes(&self, cache: &mut StateCache<D>, program: &Program<D>, warnings: &mut WarnBudget) {
        for (name, location) in program.attribute_locations() {
            let Some(buffered) = self.attributes.get(name) else {
                warnings.warn(format_args!("Active attribute {} is not supplied", name));
                continue;
            };
            cache.bind_buffer(BufferTarget::Array, Some(buffered.buffer));
            cache.vertex_attrib(*location, buffered.attribute.layout(), buffered.attribute.divisor);
        }
        if let Some(index) = &self.index {
            cache.bind_buffer(BufferTarget::ElementArray, Some(index.buffer));
        }
    }

    fn drop_layouts(&mut self, cache: &mut StateCache<D>) {
        for (_, vertex_array) in self.layouts.drain() {
            cache.delete_vertex_array(vertex_array);
        }
    }

    /// Release every buffer and vertex layout
    pub(crate) fn remove(mut self, cache: &mut StateCache<D>) {
        self.drop_layouts(cache);
        for buffered in self.attributes.values().chain(self.index.iter()) {
            cache.delete_buffer(buffered.buffer);
        }
    }
}

fn gl_int(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{DeviceCall, HeadlessDevice};
    use crate::render::resources::program::ProgramDescriptor;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-6;

    const VERTEX: &str = "
        attribute vec3 position;
        attribute vec3 offset;
        void main() {}
    ";
    const FRAGMENT: &str = "void main() {}";

    fn triangle() -> Vec<(&'static str, Attribute)> {
        vec![(POSITION_ATTRIBUTE, Attribute::new(3, vec![0.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]))]
    }

    fn program(cache: &mut StateCache<HeadlessDevice>, warnings: &mut WarnBudget) -> Program<HeadlessDevice> {
        Program::new(cache, 0, ProgramDescriptor::new(VERTEX, FRAGMENT), false, warnings).unwrap()
    }

    #[test]
    fn test_draw_count_follows_index() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let mut geometry = Geometry::new(&mut cache, triangle(), &mut warnings).unwrap();
        assert_eq!(geometry.draw_range().count, 3);

        geometry.set_index(&mut cache, Attribute::index(vec![0_u16, 1, 2, 2, 1, 0]), &mut warnings).unwrap();
        assert_eq!(geometry.draw_range().count, 6);
        assert_eq!(geometry.index().map(|i| i.data.component()), Some(ComponentType::UnsignedShort));
    }

    #[test]
    fn test_layout_created_once_and_reused() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let program = program(&mut cache, &mut warnings);
        let offsets = Attribute::new(3, vec![0.0_f32; 6]).instanced(1);
        let mut attributes = triangle();
        attributes.push(("offset", offsets));
        let mut geometry = Geometry::new(&mut cache, attributes, &mut warnings).unwrap();

        geometry.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();
        let mark = cache.device().calls().len();
        geometry.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();

        assert_eq!(geometry.layout_count(), 1);
        assert_eq!(
            cache.device().calls_since(mark),
            &[DeviceCall::DrawArraysInstanced { mode: DrawMode::Triangles, first: 0, count: 3, instances: 2 }]
        );
        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::VertexAttribDivisor { divisor: 1, .. })), 1);
    }

    #[test]
    fn test_instanced_length_mismatch_clamps_and_warns() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let attributes = vec![
            ("a", Attribute::new(2, vec![0.0_f32; 8]).instanced(1)),
            ("b", Attribute::new(2, vec![0.0_f32; 4]).instanced(1)),
        ];
        let geometry = Geometry::new(&mut cache, attributes, &mut warnings).unwrap();

        assert!(geometry.is_instanced());
        assert_eq!(geometry.instanced_count(), 2);
        assert_eq!(warnings.emitted(), 1);
    }

    #[test]
    fn test_missing_attribute_warns_and_dirty_data_reuploads() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let program = program(&mut cache, &mut warnings);
        let mut geometry = Geometry::new(&mut cache, triangle(), &mut warnings).unwrap();

        geometry.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();
        assert_eq!(warnings.emitted(), 1);

        assert!(geometry.update_attribute(POSITION_ATTRIBUTE, vec![0.0_f32; 9]));
        assert!(!geometry.update_attribute("normal", vec![0.0_f32; 9]));
        let mark = cache.device().calls().len();
        geometry.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();
        assert_eq!(
            cache.device().calls_since(mark).iter().filter(|c| matches!(c, DeviceCall::BufferData { .. })).count(),
            1
        );
    }

    #[test]
    fn test_draw_range_start_counts_indices() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let program = program(&mut cache, &mut warnings);
        let mut attributes = triangle();
        attributes.push((INDEX_ATTRIBUTE, Attribute::index(vec![0_u32, 1, 2, 0, 2, 1])));
        let mut geometry = Geometry::new(&mut cache, attributes, &mut warnings).unwrap();

        geometry.set_draw_range(3, 3);
        geometry.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();

        let draws = cache.device().draw_calls();
        assert_eq!(
            draws,
            vec![&DeviceCall::DrawElements { mode: DrawMode::Triangles, count: 3, index_type: ComponentType::UnsignedInt, offset: 12 }]
        );

        let mut attributes = triangle();
        attributes.push((INDEX_ATTRIBUTE, Attribute::index(vec![0_u16, 1, 2, 0, 2, 1])));
        let mut short = Geometry::new(&mut cache, attributes, &mut warnings).unwrap();
        short.set_draw_range(3, 3);
        let mark = cache.device().calls().len();
        short.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();

        assert!(cache.device().calls_since(mark).contains(&DeviceCall::DrawElements {
            mode: DrawMode::Triangles,
            count: 3,
            index_type: ComponentType::UnsignedShort,
            offset: 6,
        }));
    }

    #[test]
    fn test_new_attribute_keeps_layouts_and_replacement_drops_them() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let program = program(&mut cache, &mut warnings);
        let mut geometry = Geometry::new(&mut cache, triangle(), &mut warnings).unwrap();
        geometry.draw(&mut cache, &program, DrawMode::Triangles, &mut warnings).unwrap();
        assert_eq!(geometry.layout_count(), 1);

        geometry.add_attribute(&mut cache, "offset", Attribute::new(3, vec![0.0_f32; 9]), &mut warnings).unwrap();
        assert_eq!(geometry.layout_count(), 1);

        geometry.add_attribute(&mut cache, "offset", Attribute::new(3, vec![1.0_f32; 9]), &mut warnings).unwrap();
        assert_eq!(geometry.layout_count(), 0);
        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::DeleteBuffer(_))), 1);
    }

    #[test]
    fn test_bounds_from_positions() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut warnings = WarnBudget::default();
        let attributes = vec![(POSITION_ATTRIBUTE, Attribute::new(3, vec![-1.0_f32, -2.0, 0.0, 1.0, 2.0, 0.0]))];
        let mut geometry = Geometry::new(&mut cache, attributes, &mut warnings).unwrap();

        let bounds = *geometry.bounds().unwrap();
        assert_relative_eq!(bounds.center, Vec3::zeros(), epsilon = EPSILON);
        assert_relative_eq!(bounds.scale, Vec3::new(2.0, 4.0, 0.0), epsilon = EPSILON);
        assert_relative_eq!(bounds.radius, 5.0_f32.sqrt(), epsilon = EPSILON);

        let mut no_positions = Geometry::new(&mut cache, vec![("uv", Attribute::new(2, vec![0.0_f32; 4]))], &mut warnings).unwrap();
        assert!(no_positions.bounds().is_none());
    }
}
