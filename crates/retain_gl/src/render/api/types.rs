//! Typed device enums
//!
//! Each enum names one GL parameter family. `gl()` returns the raw enum value
//! used by GL-backed devices; the headless device records the typed values.

use bitflags::bitflags;

/// Toggleable device capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Face culling
    CullFace,
    /// Color blending
    Blend,
}

impl Capability {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::DepthTest => 0x0B71,
            Self::CullFace => 0x0B44,
            Self::Blend => 0x0BE2,
        }
    }
}

/// Blend factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

impl BlendFactor {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::SrcColor => 0x0300,
            Self::OneMinusSrcColor => 0x0301,
            Self::SrcAlpha => 0x0302,
            Self::OneMinusSrcAlpha => 0x0303,
            Self::DstAlpha => 0x0304,
            Self::OneMinusDstAlpha => 0x0305,
            Self::DstColor => 0x0306,
            Self::OneMinusDstColor => 0x0307,
            Self::SrcAlphaSaturate => 0x0308,
            Self::ConstantColor => 0x8001,
            Self::OneMinusConstantColor => 0x8002,
        }
    }
}

/// Blend function, optionally with separate alpha factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    /// Source color factor
    pub src: BlendFactor,
    /// Destination color factor
    pub dst: BlendFactor,
    /// Separate alpha factors (source, destination)
    pub alpha: Option<(BlendFactor, BlendFactor)>,
}

impl BlendFunc {
    /// Blend function applying to color and alpha alike
    pub fn new(src: BlendFactor, dst: BlendFactor) -> Self {
        Self { src, dst, alpha: None }
    }

    /// Blend function with separate alpha factors
    pub fn separate(src: BlendFactor, dst: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) -> Self {
        Self { src, dst, alpha: Some((src_alpha, dst_alpha)) }
    }
}

/// Blend operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendOp {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Add => 0x8006,
            Self::Subtract => 0x800A,
            Self::ReverseSubtract => 0x800B,
            Self::Min => 0x8007,
            Self::Max => 0x8008,
        }
    }
}

/// Blend equation, optionally with a separate alpha operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendEquation {
    /// Color operator
    pub rgb: BlendOp,
    /// Separate alpha operator
    pub alpha: Option<BlendOp>,
}

impl BlendEquation {
    /// Equation applying to color and alpha alike
    pub fn new(rgb: BlendOp) -> Self {
        Self { rgb, alpha: None }
    }
}

/// Polygon faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Face {
    Front,
    Back,
    FrontAndBack,
}

impl Face {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Front => 0x0404,
            Self::Back => 0x0405,
            Self::FrontAndBack => 0x0408,
        }
    }
}

/// Front-face winding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    /// Clockwise
    Cw,
    /// Counter-clockwise
    Ccw,
}

impl FrontFace {
    /// The opposite winding
    pub fn flipped(self) -> Self {
        match self {
            Self::Cw => Self::Ccw,
            Self::Ccw => Self::Cw,
        }
    }

    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Cw => 0x0900,
            Self::Ccw => 0x0901,
        }
    }
}

/// Depth comparison functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl DepthFunc {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Never => 0x0200,
            Self::Less => 0x0201,
            Self::Equal => 0x0202,
            Self::LessEqual => 0x0203,
            Self::Greater => 0x0204,
            Self::NotEqual => 0x0205,
            Self::GreaterEqual => 0x0206,
            Self::Always => 0x0207,
        }
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl DrawMode {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Points => 0x0000,
            Self::Lines => 0x0001,
            Self::LineLoop => 0x0002,
            Self::LineStrip => 0x0003,
            Self::Triangles => 0x0004,
            Self::TriangleStrip => 0x0005,
            Self::TriangleFan => 0x0006,
        }
    }
}

/// Vertex and index component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ComponentType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
}

impl ComponentType {
    /// Size of one component in bytes
    pub fn byte_size(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
        }
    }

    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Byte => 0x1400,
            Self::UnsignedByte => 0x1401,
            Self::Short => 0x1402,
            Self::UnsignedShort => 0x1403,
            Self::Int => 0x1404,
            Self::UnsignedInt => 0x1405,
            Self::Float => 0x1406,
        }
    }
}

/// Buffer binding targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data; part of the bound vertex array's state
    ElementArray,
}

impl BufferTarget {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Array => 0x8892,
            Self::ElementArray => 0x8893,
        }
    }
}

/// Buffer usage hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BufferUsage {
    StaticDraw,
    DynamicDraw,
}

impl BufferUsage {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::StaticDraw => 0x88E4,
            Self::DynamicDraw => 0x88E8,
        }
    }
}

/// How a vertex attribute reads its bound buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribLayout {
    /// Components per vertex (1-4)
    pub size: i32,
    /// Component type
    pub component: ComponentType,
    /// Normalize integer components to [0, 1] / [-1, 1]
    pub normalized: bool,
}

/// Shader stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "Vertex"),
            Self::Fragment => write!(f, "Fragment"),
        }
    }
}

/// Uniform types reported by program reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum UniformType {
    Float,
    FloatVec2,
    FloatVec3,
    FloatVec4,
    Int,
    IntVec2,
    IntVec3,
    IntVec4,
    Bool,
    BoolVec2,
    BoolVec3,
    BoolVec4,
    FloatMat2,
    FloatMat3,
    FloatMat4,
    Sampler2D,
    SamplerCube,
}

impl UniformType {
    /// Map a raw GL type enum
    pub fn from_gl(value: u32) -> Option<Self> {
        Some(match value {
            0x1406 => Self::Float,
            0x8B50 => Self::FloatVec2,
            0x8B51 => Self::FloatVec3,
            0x8B52 => Self::FloatVec4,
            0x1404 => Self::Int,
            0x8B53 => Self::IntVec2,
            0x8B54 => Self::IntVec3,
            0x8B55 => Self::IntVec4,
            0x8B56 => Self::Bool,
            0x8B57 => Self::BoolVec2,
            0x8B58 => Self::BoolVec3,
            0x8B59 => Self::BoolVec4,
            0x8B5A => Self::FloatMat2,
            0x8B5B => Self::FloatMat3,
            0x8B5C => Self::FloatMat4,
            0x8B5E => Self::Sampler2D,
            0x8B60 => Self::SamplerCube,
            _ => return None,
        })
    }

    /// Map a GLSL type keyword
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "float" => Self::Float,
            "vec2" => Self::FloatVec2,
            "vec3" => Self::FloatVec3,
            "vec4" => Self::FloatVec4,
            "int" | "uint" => Self::Int,
            "ivec2" | "uvec2" => Self::IntVec2,
            "ivec3" | "uvec3" => Self::IntVec3,
            "ivec4" | "uvec4" => Self::IntVec4,
            "bool" => Self::Bool,
            "bvec2" => Self::BoolVec2,
            "bvec3" => Self::BoolVec3,
            "bvec4" => Self::BoolVec4,
            "mat2" => Self::FloatMat2,
            "mat3" => Self::FloatMat3,
            "mat4" => Self::FloatMat4,
            "sampler2D" | "sampler2DShadow" | "isampler2D" | "usampler2D" => Self::Sampler2D,
            "samplerCube" => Self::SamplerCube,
            _ => return None,
        })
    }

    /// Whether the device expects integer data for this type
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::IntVec2
                | Self::IntVec3
                | Self::IntVec4
                | Self::Bool
                | Self::BoolVec2
                | Self::BoolVec3
                | Self::BoolVec4
                | Self::Sampler2D
                | Self::SamplerCube
        )
    }
}

/// Uniform payload handed to the device
///
/// Vector, matrix and array values arrive flattened (column-major for
/// matrices).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    /// Single float
    Float(f32),
    /// Single integer
    Int(i32),
    /// Flattened float components
    Floats(&'a [f32]),
    /// Flattened integer components
    Ints(&'a [i32]),
}

/// Texture binding targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    /// 2D texture
    #[default]
    Texture2D,
}

impl TextureTarget {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Texture2D => 0x0DE1,
        }
    }
}

/// Texture wrap modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Wrap {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl Wrap {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Repeat => 0x2901,
            Self::ClampToEdge => 0x812F,
            Self::MirroredRepeat => 0x8370,
        }
    }
}

/// Texture filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Filter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl Filter {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Nearest => 0x2600,
            Self::Linear => 0x2601,
            Self::NearestMipmapNearest => 0x2700,
            Self::LinearMipmapNearest => 0x2701,
            Self::NearestMipmapLinear => 0x2702,
            Self::LinearMipmapLinear => 0x2703,
        }
    }
}

/// Per-texture sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureParameter {
    /// Minification filter
    MinFilter(Filter),
    /// Magnification filter
    MagFilter(Filter),
    /// Horizontal wrap
    WrapS(Wrap),
    /// Vertical wrap
    WrapT(Wrap),
}

/// Pixel formats, used both as upload format and internal format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TextureFormat {
    Alpha,
    Luminance,
    Red,
    Rg,
    Rgb,
    Rgba,
    Rgba8,
    Rgba16F,
    Rgba32F,
    DepthComponent,
    DepthComponent16,
    DepthComponent24,
    DepthStencil,
}

impl TextureFormat {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Alpha => 0x1906,
            Self::Luminance => 0x1909,
            Self::Red => 0x1903,
            Self::Rg => 0x8227,
            Self::Rgb => 0x1907,
            Self::Rgba => 0x1908,
            Self::Rgba8 => 0x8058,
            Self::Rgba16F => 0x881A,
            Self::Rgba32F => 0x8814,
            Self::DepthComponent => 0x1902,
            Self::DepthComponent16 => 0x81A5,
            Self::DepthComponent24 => 0x81A6,
            Self::DepthStencil => 0x84F9,
        }
    }
}

/// Texel component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TexelType {
    UnsignedByte,
    UnsignedShort,
    UnsignedInt,
    UnsignedInt24_8,
    HalfFloat,
    Float,
}

impl TexelType {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::UnsignedByte => 0x1401,
            Self::UnsignedShort => 0x1403,
            Self::UnsignedInt => 0x1405,
            Self::UnsignedInt24_8 => 0x84FA,
            Self::HalfFloat => 0x140B,
            Self::Float => 0x1406,
        }
    }
}

/// One `texImage2D` upload
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    /// Mip level
    pub level: i32,
    /// Storage format
    pub internal_format: TextureFormat,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Format of `pixels`
    pub format: TextureFormat,
    /// Component type of `pixels`
    pub texel_type: TexelType,
    /// Pixel data; `None` allocates storage only
    pub pixels: Option<&'a [u8]>,
}

/// Pixel unpack state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelStore {
    /// Flip rows on upload
    FlipY(bool),
    /// Premultiply color by alpha on upload
    PremultiplyAlpha(bool),
    /// Row alignment in bytes
    UnpackAlignment(i32),
}

/// Framebuffer attachment points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Color attachment `n`
    Color(u32),
    /// Depth
    Depth,
    /// Stencil
    Stencil,
    /// Combined depth and stencil
    DepthStencil,
}

impl Attachment {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::Color(n) => 0x8CE0 + n,
            Self::Depth => 0x8D00,
            Self::Stencil => 0x8D20,
            Self::DepthStencil => 0x821A,
        }
    }
}

/// Renderbuffer storage formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RenderbufferFormat {
    DepthComponent16,
    StencilIndex8,
    DepthStencil,
}

impl RenderbufferFormat {
    /// Raw GL enum
    pub fn gl(self) -> u32 {
        match self {
            Self::DepthComponent16 => 0x81A5,
            Self::StencilIndex8 => 0x8D48,
            Self::DepthStencil => 0x84F9,
        }
    }
}

bitflags! {
    /// Buffers cleared by a clear call
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u32 {
        /// Color buffer
        const COLOR = 0x0000_4000;
        /// Depth buffer
        const DEPTH = 0x0000_0100;
        /// Stencil buffer
        const STENCIL = 0x0000_0400;
    }
}
