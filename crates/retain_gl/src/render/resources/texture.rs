//! Textures with lazy upload
//!
//! A [`Texture`] uploads nothing when created. The first time a program
//! samples it (or a render target attaches it) [`Texture::update`] binds it to
//! a unit and uploads. Later updates only re-upload when the texture was
//! flagged or its image was replaced by a different allocation.

use std::sync::Arc;

use image::{DynamicImage, RgbaImage};

use crate::render::api::{
    DeviceResult, Filter, GraphicsDevice, PixelStore, TexelType, TextureFormat, TextureParameter,
    TextureTarget, TextureUpload, Wrap,
};
use crate::render::state::StateCache;

/// Shown while a texture has neither image nor size
const EMPTY_PIXEL: [u8; 4] = [0; 4];

/// Shared pixel data for a texture
///
/// Cloning shares the allocation. A texture only re-uploads when handed an
/// image that does not share the allocation of the last upload.
#[derive(Debug, Clone)]
pub struct TextureImage {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl TextureImage {
    /// Wrap raw pixels laid out for the texture's format and texel type
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self { width, height, pixels: pixels.into() }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Whether both share the same allocation
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl From<RgbaImage> for TextureImage {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

impl From<DynamicImage> for TextureImage {
    fn from(image: DynamicImage) -> Self {
        image.into_rgba8().into()
    }
}

/// Texture creation options
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    /// Initial image
    pub image: Option<TextureImage>,
    /// Storage width when there is no image (render targets, data textures)
    pub width: u32,
    /// Storage height when there is no image
    pub height: u32,
    /// Binding target
    pub target: TextureTarget,
    /// Component type of uploaded pixels
    pub texel_type: TexelType,
    /// Format of uploaded pixels
    pub format: TextureFormat,
    /// Storage format, defaults to `format`
    pub internal_format: Option<TextureFormat>,
    /// Horizontal wrap
    pub wrap_s: Wrap,
    /// Vertical wrap
    pub wrap_t: Wrap,
    /// Build mipmaps after each image upload
    pub generate_mipmaps: bool,
    /// Minification filter, defaults by mipmap policy
    pub min_filter: Option<Filter>,
    /// Magnification filter
    pub mag_filter: Filter,
    /// Premultiply alpha on upload
    pub premultiply_alpha: bool,
    /// Unpack row alignment
    pub unpack_alignment: i32,
    /// Flip rows on upload
    pub flip_y: bool,
    /// Mip level uploaded to
    pub level: i32,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            image: None,
            width: 0,
            height: 0,
            target: TextureTarget::Texture2D,
            texel_type: TexelType::UnsignedByte,
            format: TextureFormat::Rgba,
            internal_format: None,
            wrap_s: Wrap::ClampToEdge,
            wrap_t: Wrap::ClampToEdge,
            generate_mipmaps: true,
            min_filter: None,
            mag_filter: Filter::Linear,
            premultiply_alpha: false,
            unpack_alignment: 4,
            flip_y: true,
            level: 0,
        }
    }
}

impl TextureDescriptor {
    /// Descriptor with default options and no source
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor sourcing an image
    pub fn from_image(image: impl Into<TextureImage>) -> Self {
        Self { image: Some(image.into()), ..Self::default() }
    }

    /// Allocate storage of this size when there is no image
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the pixel format (and the storage format unless set separately)
    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the storage format
    pub fn with_internal_format(mut self, format: TextureFormat) -> Self {
        self.internal_format = Some(format);
        self
    }

    /// Set the texel component type
    pub fn with_texel_type(mut self, texel_type: TexelType) -> Self {
        self.texel_type = texel_type;
        self
    }

    /// Set both wrap modes
    pub fn with_wrap(mut self, wrap_s: Wrap, wrap_t: Wrap) -> Self {
        self.wrap_s = wrap_s;
        self.wrap_t = wrap_t;
        self
    }

    /// Set both filters
    pub fn with_filters(mut self, min: Filter, mag: Filter) -> Self {
        self.min_filter = Some(min);
        self.mag_filter = mag;
        self
    }

    /// Enable or disable mipmap generation
    pub fn with_mipmaps(mut self, enabled: bool) -> Self {
        self.generate_mipmaps = enabled;
        self
    }

    /// Enable or disable row flipping on upload
    pub fn with_flip_y(mut self, enabled: bool) -> Self {
        self.flip_y = enabled;
        self
    }

    /// Enable or disable alpha premultiplication on upload
    pub fn with_premultiply_alpha(mut self, enabled: bool) -> Self {
        self.premultiply_alpha = enabled;
        self
    }

    /// Set the unpack row alignment
    pub fn with_unpack_alignment(mut self, alignment: i32) -> Self {
        self.unpack_alignment = alignment;
        self
    }

    /// Set the mip level uploaded to
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

/// Sampling parameters last set on the device texture object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SamplerState {
    min_filter: Filter,
    mag_filter: Filter,
    wrap_s: Wrap,
    wrap_t: Wrap,
}

impl SamplerState {
    /// Values a new GL texture object starts with
    fn device_default() -> Self {
        Self {
            min_filter: Filter::NearestMipmapLinear,
            mag_filter: Filter::Linear,
            wrap_s: Wrap::Repeat,
            wrap_t: Wrap::Repeat,
        }
    }
}

/// A device texture and its upload policy
pub struct Texture<D: GraphicsDevice> {
    handle: D::Texture,
    target: TextureTarget,
    texel_type: TexelType,
    format: TextureFormat,
    internal_format: TextureFormat,
    sampler: SamplerState,
    applied: SamplerState,
    generate_mipmaps: bool,
    premultiply_alpha: bool,
    unpack_alignment: i32,
    flip_y: bool,
    level: i32,
    width: u32,
    height: u32,
    image: Option<TextureImage>,
    uploaded: Option<TextureImage>,
    needs_update: bool,
}

impl<D: GraphicsDevice> Texture<D> {
    /// Allocate the device texture; nothing is uploaded yet
    pub(crate) fn new(cache: &mut StateCache<D>, descriptor: TextureDescriptor) -> DeviceResult<Self> {
        let handle = cache.create_texture()?;
        let min_filter = descriptor.min_filter.unwrap_or(if descriptor.generate_mipmaps {
            Filter::NearestMipmapLinear
        } else {
            Filter::Linear
        });
        let (width, height) = descriptor
            .image
            .as_ref()
            .map_or((descriptor.width, descriptor.height), |image| (image.width, image.height));

        Ok(Self {
            handle,
            target: descriptor.target,
            texel_type: descriptor.texel_type,
            format: descriptor.format,
            internal_format: descriptor.internal_format.unwrap_or(descriptor.format),
            sampler: SamplerState {
                min_filter,
                mag_filter: descriptor.mag_filter,
                wrap_s: descriptor.wrap_s,
                wrap_t: descriptor.wrap_t,
            },
            applied: SamplerState::device_default(),
            generate_mipmaps: descriptor.generate_mipmaps,
            premultiply_alpha: descriptor.premultiply_alpha,
            unpack_alignment: descriptor.unpack_alignment,
            flip_y: descriptor.flip_y,
            level: descriptor.level,
            width,
            height,
            image: descriptor.image,
            uploaded: None,
            needs_update: true,
        })
    }

    /// Device handle
    pub fn handle(&self) -> D::Texture {
        self.handle
    }

    /// Width of the last image or allocated storage
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the last image or allocated storage
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Current image
    pub fn image(&self) -> Option<&TextureImage> {
        self.image.as_ref()
    }

    /// Replace the image; uploads on next use unless it shares the uploaded allocation
    pub fn set_image(&mut self, image: impl Into<TextureImage>) {
        self.image = Some(image.into());
    }

    /// Change sampling filters, applied on next upload
    pub fn set_filters(&mut self, min: Filter, mag: Filter) {
        self.sampler.min_filter = min;
        self.sampler.mag_filter = mag;
        self.needs_update = true;
    }

    /// Change wrap modes, applied on next upload
    pub fn set_wrap(&mut self, wrap_s: Wrap, wrap_t: Wrap) {
        self.sampler.wrap_s = wrap_s;
        self.sampler.wrap_t = wrap_t;
        self.needs_update = true;
    }

    /// Force a re-upload on next use (e.g. pixels changed in place)
    pub fn mark_needs_update(&mut self) {
        self.needs_update = true;
    }

    /// Whether the next [`Texture::update`] will upload
    pub fn needs_upload(&self) -> bool {
        let image_changed = match (&self.image, &self.uploaded) {
            (Some(current), Some(uploaded)) => !current.same_as(uploaded),
            (None, None) => false,
            _ => true,
        };
        self.needs_update || image_changed
    }

    /// Make sure the texture is bound on `unit` and uploaded
    pub fn update(&mut self, cache: &mut StateCache<D>, unit: u32) {
        let needs_upload = self.needs_upload();

        if needs_upload || cache.texture_at(unit) != Some(self.handle) {
            cache.active_texture(unit);
            cache.bind_texture(self.target, Some(self.handle));
        }

        if !needs_upload {
            return;
        }
        self.needs_update = false;

        cache.pixel_store(PixelStore::FlipY(self.flip_y));
        cache.pixel_store(PixelStore::PremultiplyAlpha(self.premultiply_alpha));
        cache.pixel_store(PixelStore::UnpackAlignment(self.unpack_alignment));
        self.apply_sampler(cache);

        if let Some(image) = &self.image {
            self.width = image.width;
            self.height = image.height;
            cache.tex_image_2d(
                self.target,
                TextureUpload {
                    level: self.level,
                    internal_format: self.internal_format,
                    width: self.width,
                    height: self.height,
                    format: self.format,
                    texel_type: self.texel_type,
                    pixels: Some(image.pixels()),
                },
            );
            if self.generate_mipmaps {
                cache.generate_mipmap(self.target);
            }
        } else if self.width > 0 {
            cache.tex_image_2d(
                self.target,
                TextureUpload {
                    level: self.level,
                    internal_format: self.internal_format,
                    width: self.width,
                    height: self.height,
                    format: self.format,
                    texel_type: self.texel_type,
                    pixels: None,
                },
            );
        } else {
            cache.tex_image_2d(
                self.target,
                TextureUpload {
                    level: 0,
                    internal_format: TextureFormat::Rgba,
                    width: 1,
                    height: 1,
                    format: TextureFormat::Rgba,
                    texel_type: TexelType::UnsignedByte,
                    pixels: Some(&EMPTY_PIXEL),
                },
            );
        }

        self.uploaded = self.image.clone();
    }

    fn apply_sampler(&mut self, cache: &mut StateCache<D>) {
        let wanted = self.sampler;
        if wanted.min_filter != self.applied.min_filter {
            cache.tex_parameter(self.target, TextureParameter::MinFilter(wanted.min_filter));
        }
        if wanted.mag_filter != self.applied.mag_filter {
            cache.tex_parameter(self.target, TextureParameter::MagFilter(wanted.mag_filter));
        }
        if wanted.wrap_s != self.applied.wrap_s {
            cache.tex_parameter(self.target, TextureParameter::WrapS(wanted.wrap_s));
        }
        if wanted.wrap_t != self.applied.wrap_t {
            cache.tex_parameter(self.target, TextureParameter::WrapT(wanted.wrap_t));
        }
        self.applied = wanted;
    }

    /// Release the device texture
    pub(crate) fn remove(self, cache: &mut StateCache<D>) {
        cache.delete_texture(self.handle);
    }
}
