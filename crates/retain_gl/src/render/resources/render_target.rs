//! Offscreen render targets

use crate::foundation::collections::{SlotMap, TextureKey};
use crate::render::api::{
    Attachment, DeviceResult, Filter, GraphicsDevice, RenderbufferFormat, TexelType, TextureFormat,
    Wrap,
};
use crate::render::state::StateCache;

use super::texture::{Texture, TextureDescriptor};

/// Render target creation options
#[derive(Debug, Clone)]
pub struct RenderTargetDescriptor {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Number of color attachments
    pub color: u32,
    /// Depth attachment
    pub depth: bool,
    /// Stencil attachment
    pub stencil: bool,
    /// Attach depth as a sampleable texture instead of a renderbuffer
    pub depth_texture: bool,
    /// Color texture horizontal wrap
    pub wrap_s: Wrap,
    /// Color texture vertical wrap
    pub wrap_t: Wrap,
    /// Color texture minification filter
    pub min_filter: Filter,
    /// Color texture magnification filter, defaults to `min_filter`
    pub mag_filter: Option<Filter>,
    /// Color texel type
    pub texel_type: TexelType,
    /// Color pixel format
    pub format: TextureFormat,
    /// Color storage format, defaults to `format`
    pub internal_format: Option<TextureFormat>,
}

impl RenderTargetDescriptor {
    /// One RGBA color attachment plus a depth renderbuffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: 1,
            depth: true,
            stencil: false,
            depth_texture: false,
            wrap_s: Wrap::ClampToEdge,
            wrap_t: Wrap::ClampToEdge,
            min_filter: Filter::Linear,
            mag_filter: None,
            texel_type: TexelType::UnsignedByte,
            format: TextureFormat::Rgba,
            internal_format: None,
        }
    }

    /// Set the number of color attachments
    pub fn with_color_attachments(mut self, count: u32) -> Self {
        self.color = count;
        self
    }

    /// Choose depth and stencil attachments
    pub fn with_buffers(mut self, depth: bool, stencil: bool) -> Self {
        self.depth = depth;
        self.stencil = stencil;
        self
    }

    /// Attach depth as a texture
    pub fn with_depth_texture(mut self, enabled: bool) -> Self {
        self.depth_texture = enabled;
        self
    }

    /// Set color texture filters
    pub fn with_filters(mut self, min: Filter, mag: Filter) -> Self {
        self.min_filter = min;
        self.mag_filter = Some(mag);
        self
    }

    /// Set color pixel format and texel type
    pub fn with_format(mut self, format: TextureFormat, texel_type: TexelType) -> Self {
        self.format = format;
        self.texel_type = texel_type;
        self
    }

    /// Set color storage format
    pub fn with_internal_format(mut self, format: TextureFormat) -> Self {
        self.internal_format = Some(format);
        self
    }

    fn color_texture(&self) -> TextureDescriptor {
        let mut descriptor = TextureDescriptor::new()
            .with_size(self.width, self.height)
            .with_wrap(self.wrap_s, self.wrap_t)
            .with_filters(self.min_filter, self.mag_filter.unwrap_or(self.min_filter))
            .with_format(self.format)
            .with_texel_type(self.texel_type)
            .with_flip_y(false)
            .with_mipmaps(false);
        descriptor.internal_format = self.internal_format;
        descriptor
    }

    fn depth_texture(&self) -> TextureDescriptor {
        TextureDescriptor::new()
            .with_size(self.width, self.height)
            .with_wrap(self.wrap_s, self.wrap_t)
            .with_filters(Filter::Nearest, Filter::Nearest)
            .with_format(TextureFormat::DepthComponent)
            .with_internal_format(TextureFormat::DepthComponent24)
            .with_texel_type(TexelType::UnsignedInt)
            .with_flip_y(false)
            .with_mipmaps(false)
    }
}

/// A framebuffer with its attachments
///
/// Color and depth textures live in the renderer's texture arena so programs
/// can sample them by key.
pub struct RenderTarget<D: GraphicsDevice> {
    framebuffer: D::Framebuffer,
    textures: Vec<TextureKey>,
    depth_texture: Option<TextureKey>,
    renderbuffer: Option<D::Renderbuffer>,
    depth: bool,
    width: u32,
    height: u32,
}

impl<D: GraphicsDevice> RenderTarget<D> {
    /// Create the framebuffer and its attachments
    ///
    /// The previously bound framebuffer is bound again afterwards. When an
    /// attachment cannot be created, everything created so far is released
    /// before the error is returned.
    pub(crate) fn new(
        cache: &mut StateCache<D>,
        textures: &mut SlotMap<TextureKey, Texture<D>>,
        descriptor: &RenderTargetDescriptor,
    ) -> DeviceResult<Self> {
        let framebuffer = cache.create_framebuffer()?;
        let previous = cache.framebuffer();
        cache.bind_framebuffer(Some(framebuffer));

        let mut target = Self {
            framebuffer,
            textures: Vec::with_capacity(descriptor.color as usize),
            depth_texture: None,
            renderbuffer: None,
            depth: descriptor.depth || descriptor.depth_texture,
            width: descriptor.width,
            height: descriptor.height,
        };

        let attached = target.attach(cache, textures, descriptor);
        cache.bind_framebuffer(previous);
        match attached {
            Ok(()) => Ok(target),
            Err(err) => {
                log::error!("Render target {}x{} incomplete: {}", descriptor.width, descriptor.height, err);
                target.remove(cache, textures);
                Err(err)
            }
        }
    }

    fn attach(
        &mut self,
        cache: &mut StateCache<D>,
        textures: &mut SlotMap<TextureKey, Texture<D>>,
        descriptor: &RenderTargetDescriptor,
    ) -> DeviceResult<()> {
        for i in 0..descriptor.color {
            let mut texture = Texture::new(cache, descriptor.color_texture())?;
            texture.update(cache, 0);
            cache.framebuffer_texture_2d(Attachment::Color(i), texture.handle(), 0);
            self.textures.push(textures.insert(texture));
        }

        if descriptor.depth_texture {
            let mut texture = Texture::new(cache, descriptor.depth_texture())?;
            texture.update(cache, 0);
            cache.framebuffer_texture_2d(Attachment::Depth, texture.handle(), 0);
            self.depth_texture = Some(textures.insert(texture));
            return Ok(());
        }

        let storage = match (descriptor.depth, descriptor.stencil) {
            (true, false) => Some((RenderbufferFormat::DepthComponent16, Attachment::Depth)),
            (false, true) => Some((RenderbufferFormat::StencilIndex8, Attachment::Stencil)),
            (true, true) => Some((RenderbufferFormat::DepthStencil, Attachment::DepthStencil)),
            (false, false) => None,
        };
        if let Some((format, attachment)) = storage {
            let renderbuffer = cache.create_renderbuffer()?;
            cache.renderbuffer_storage(renderbuffer, format, descriptor.width, descriptor.height);
            cache.framebuffer_renderbuffer(attachment, renderbuffer);
            self.renderbuffer = Some(renderbuffer);
        }
        Ok(())
    }

    /// Device framebuffer
    pub fn framebuffer(&self) -> D::Framebuffer {
        self.framebuffer
    }

    /// First color texture
    pub fn texture(&self) -> Option<TextureKey> {
        self.textures.first().copied()
    }

    /// All color textures in attachment order
    pub fn textures(&self) -> &[TextureKey] {
        &self.textures
    }

    /// Depth texture, when requested
    pub fn depth_texture(&self) -> Option<TextureKey> {
        self.depth_texture
    }

    /// Whether depth is attached, as a texture or a renderbuffer
    pub fn has_depth(&self) -> bool {
        self.depth
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Release the framebuffer, its renderbuffer and its textures
    pub(crate) fn remove(self, cache: &mut StateCache<D>, textures: &mut SlotMap<TextureKey, Texture<D>>) {
        for key in self.textures.iter().chain(self.depth_texture.iter()) {
            if let Some(texture) = textures.remove(*key) {
                texture.remove(cache);
            }
        }
        if let Some(renderbuffer) = self.renderbuffer {
            cache.delete_renderbuffer(renderbuffer);
        }
        cache.delete_framebuffer(self.framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::DeviceError;
    use crate::render::backends::{DeviceCall, HeadlessDevice};

    #[test]
    fn test_default_target_has_color_and_depth_renderbuffer() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut textures = SlotMap::with_key();
        let target = RenderTarget::new(&mut cache, &mut textures, &RenderTargetDescriptor::new(64, 32)).unwrap();

        assert_eq!(target.textures().len(), 1);
        assert!(target.depth_texture().is_none());
        assert!(target.has_depth());

        let device = cache.device();
        assert_eq!(
            device.count(|c| matches!(c, DeviceCall::FramebufferTexture2D { attachment: Attachment::Color(0), .. })),
            1
        );
        assert_eq!(
            device.count(|c| matches!(
                c,
                DeviceCall::RenderbufferStorage { format: RenderbufferFormat::DepthComponent16, width: 64, height: 32, .. }
            )),
            1
        );
        assert!(device.calls().iter().any(|c| matches!(
            c,
            DeviceCall::TexImage2D { width: 64, height: 32, has_pixels: false, .. }
        )));
        assert_eq!(cache.framebuffer(), None);
    }

    #[test]
    fn test_depth_texture_replaces_renderbuffers() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut textures = SlotMap::with_key();
        let descriptor = RenderTargetDescriptor::new(16, 16)
            .with_color_attachments(2)
            .with_buffers(true, true)
            .with_depth_texture(true);
        let target = RenderTarget::new(&mut cache, &mut textures, &descriptor).unwrap();

        assert_eq!(target.textures().len(), 2);
        assert!(target.depth_texture().is_some());
        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::CreateRenderbuffer(_))), 0);

        target.remove(&mut cache, &mut textures);
        assert!(textures.is_empty());
        assert_eq!(cache.device().count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 3);
    }

    #[test]
    fn test_failed_attachment_releases_partial_target() {
        let mut cache = StateCache::new(HeadlessDevice::new().with_texture_limit(1));
        let mut textures = SlotMap::with_key();
        let descriptor = RenderTargetDescriptor::new(16, 16).with_color_attachments(2);

        let result = RenderTarget::new(&mut cache, &mut textures, &descriptor);

        assert!(matches!(result, Err(DeviceError::ObjectCreation { kind: "texture", .. })));
        assert_eq!(cache.framebuffer(), None);
        assert!(textures.is_empty());
        let device = cache.device();
        assert_eq!(device.count(|c| matches!(c, DeviceCall::CreateTexture(_))), 1);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::DeleteTexture(_))), 1);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::CreateFramebuffer(_))), 1);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::DeleteFramebuffer(_))), 1);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::CreateRenderbuffer(_))), 0);
    }

    #[test]
    fn test_failed_target_restores_previous_framebuffer() {
        let mut cache = StateCache::new(HeadlessDevice::new().with_texture_limit(1));
        let mut textures = SlotMap::with_key();
        let first = RenderTarget::new(&mut cache, &mut textures, &RenderTargetDescriptor::new(8, 8)).unwrap();
        cache.bind_framebuffer(Some(first.framebuffer()));

        assert!(RenderTarget::new(&mut cache, &mut textures, &RenderTargetDescriptor::new(8, 8)).is_err());
        assert_eq!(cache.framebuffer(), Some(first.framebuffer()));
        assert_eq!(textures.len(), 1);
    }

    #[test]
    fn test_stencil_only_and_depth_stencil_formats() {
        let mut cache = StateCache::new(HeadlessDevice::new());
        let mut textures = SlotMap::with_key();
        RenderTarget::new(&mut cache, &mut textures, &RenderTargetDescriptor::new(8, 8).with_buffers(false, true)).unwrap();
        RenderTarget::new(&mut cache, &mut textures, &RenderTargetDescriptor::new(8, 8).with_buffers(true, true)).unwrap();

        let device = cache.device();
        assert_eq!(
            device.count(|c| matches!(
                c,
                DeviceCall::FramebufferRenderbuffer { attachment: Attachment::Stencil, .. }
            )),
            1
        );
        assert_eq!(
            device.count(|c| matches!(
                c,
                DeviceCall::FramebufferRenderbuffer { attachment: Attachment::DepthStencil, .. }
            )),
            1
        );
    }
}
