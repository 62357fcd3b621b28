//! Frame driver
//!
//! The [`Renderer`] owns the device (through its [`StateCache`]) and every
//! GPU resource. `render` binds the target, clears, propagates matrices,
//! builds the render list and draws it.

use crate::core::config::RendererConfig;
use crate::foundation::collections::{
    GeometryKey, NodeId, ProgramKey, RenderTargetKey, SecondaryMap, SlotMap, TextureKey,
};
use crate::foundation::logging::WarnBudget;
use crate::foundation::math::{utils, Mat3, Mat4};
use crate::render::api::{Capability, ClearMask, GraphicsDevice};
use crate::render::primitives::Camera;
use crate::render::resources::{
    Attribute, Geometry, Program, ProgramDescriptor, RenderTarget, RenderTargetDescriptor, Texture,
    TextureDescriptor, Uniform, UniformScratch, UniformValue,
};
use crate::render::state::StateCache;
use crate::scene::{build_render_list, ListOptions, Node, Scene, SceneError};

use super::{RenderError, RenderResult};

/// Per-call switches for [`Renderer::render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Offscreen target, `None` for the default surface
    pub target: Option<RenderTargetKey>,
    /// Propagate world matrices before drawing
    pub update: bool,
    /// Bucket and sort the render list
    pub sort: bool,
    /// Cull meshes outside the camera frustum
    pub frustum_cull: bool,
    /// Force (`Some(true)`) or suppress (`Some(false)`) clearing; `None`
    /// follows `RendererConfig::auto_clear`
    ///
    /// Before a depth clear, depth testing and depth writes are switched on
    /// for the default surface and for targets with a depth attachment, so
    /// that attachment really is cleared; depthless targets skip that step.
    pub clear: Option<bool>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            target: None,
            update: true,
            sort: true,
            frustum_cull: true,
            clear: None,
        }
    }
}

impl RenderOptions {
    /// Render into an offscreen target
    pub fn with_target(mut self, target: RenderTargetKey) -> Self {
        self.target = Some(target);
        self
    }

    /// Enable or disable matrix propagation
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Enable or disable sorting
    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Enable or disable frustum culling
    pub fn with_frustum_cull(mut self, frustum_cull: bool) -> Self {
        self.frustum_cull = frustum_cull;
        self
    }

    /// Override automatic clearing
    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = Some(clear);
        self
    }
}

/// Counters for one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls issued
    pub drawn: usize,
    /// Meshes rejected by the frustum test
    pub culled: usize,
    /// Meshes skipped for removed resources or unusable programs
    pub skipped: usize,
}

/// Per-draw callback attached to a mesh node
///
/// Receives the mesh's program (to set per-mesh uniforms), the mesh node and
/// the frame's camera.
pub type DrawHook<D> = Box<dyn FnMut(&mut Program<D>, &Node, Option<&Camera>)>;

struct DrawHooks<D: GraphicsDevice> {
    before: Vec<DrawHook<D>>,
    after: Vec<DrawHook<D>>,
}

impl<D: GraphicsDevice> DrawHooks<D> {
    fn new() -> Self {
        Self { before: Vec::new(), after: Vec::new() }
    }
}

/// Retained-mode renderer over one graphics device
pub struct Renderer<D: GraphicsDevice> {
    cache: StateCache<D>,
    config: RendererConfig,
    warnings: WarnBudget,
    scratch: UniformScratch,
    geometries: SlotMap<GeometryKey, Geometry<D>>,
    programs: SlotMap<ProgramKey, Program<D>>,
    textures: SlotMap<TextureKey, Texture<D>>,
    render_targets: SlotMap<RenderTargetKey, RenderTarget<D>>,
    hooks: SecondaryMap<NodeId, DrawHooks<D>>,
    next_program_id: u64,
}

impl<D: GraphicsDevice> Renderer<D> {
    /// Take ownership of a device
    ///
    /// Fails if the configuration does not validate.
    pub fn new(device: D, config: RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        let (width, height) = config.drawable_size();
        log::info!("Renderer initialized for a {}x{} surface", width, height);

        Ok(Self {
            cache: StateCache::new(device),
            warnings: WarnBudget::new(config.max_warnings),
            config,
            scratch: UniformScratch::default(),
            geometries: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            render_targets: SlotMap::with_key(),
            hooks: SecondaryMap::new(),
            next_program_id: 0,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Resize the default surface; applied on the next render
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
    }

    /// Run `hook` before each draw of `node`, ahead of the built-in matrix
    /// uniforms and program use
    ///
    /// Hooks run in the order they were added.
    pub fn add_before_render(&mut self, node: NodeId, hook: impl FnMut(&mut Program<D>, &Node, Option<&Camera>) + 'static) {
        if let Some(entry) = self.hooks.entry(node) {
            entry.or_insert_with(DrawHooks::new).before.push(Box::new(hook));
        }
    }

    /// Run `hook` after each draw call issued for `node`
    pub fn add_after_render(&mut self, node: NodeId, hook: impl FnMut(&mut Program<D>, &Node, Option<&Camera>) + 'static) {
        if let Some(entry) = self.hooks.entry(node) {
            entry.or_insert_with(DrawHooks::new).after.push(Box::new(hook));
        }
    }

    /// Drop every draw hook of `node`; returns whether it had any
    pub fn clear_render_hooks(&mut self, node: NodeId) -> bool {
        self.hooks.remove(node).is_some()
    }

    /// Device state cache
    pub fn state(&self) -> &StateCache<D> {
        &self.cache
    }

    /// Underlying device
    pub fn device(&self) -> &D {
        self.cache.device()
    }

    /// Give the device back
    pub fn into_device(self) -> D {
        self.cache.into_device()
    }

    /// Warning budget shared by every resource
    pub fn warnings(&self) -> &WarnBudget {
        &self.warnings
    }

    // === Geometry ===

    /// Upload vertex attributes; an attribute named `index` becomes the index list
    pub fn create_geometry<K: Into<String>>(
        &mut self,
        attributes: impl IntoIterator<Item = (K, Attribute)>,
    ) -> RenderResult<GeometryKey> {
        let geometry = Geometry::new(&mut self.cache, attributes, &mut self.warnings)?;
        Ok(self.geometries.insert(geometry))
    }

    /// Geometry by key
    pub fn geometry(&self, key: GeometryKey) -> Option<&Geometry<D>> {
        self.geometries.get(key)
    }

    /// Mutable geometry by key
    pub fn geometry_mut(&mut self, key: GeometryKey) -> Option<&mut Geometry<D>> {
        self.geometries.get_mut(key)
    }

    /// Add or replace an attribute of a geometry
    pub fn add_attribute(
        &mut self,
        key: GeometryKey,
        name: impl Into<String>,
        attribute: Attribute,
    ) -> RenderResult<()> {
        let geometry = self.geometries.get_mut(key).ok_or(RenderError::StaleHandle("geometry"))?;
        geometry.add_attribute(&mut self.cache, name, attribute, &mut self.warnings)?;
        Ok(())
    }

    /// Set or replace the index list of a geometry
    pub fn set_index(&mut self, key: GeometryKey, index: Attribute) -> RenderResult<()> {
        let geometry = self.geometries.get_mut(key).ok_or(RenderError::StaleHandle("geometry"))?;
        geometry.set_index(&mut self.cache, index, &mut self.warnings)?;
        Ok(())
    }

    /// Release a geometry's buffers and vertex layouts
    pub fn remove_geometry(&mut self, key: GeometryKey) -> RenderResult<()> {
        let geometry = self.geometries.remove(key).ok_or(RenderError::StaleHandle("geometry"))?;
        geometry.remove(&mut self.cache);
        Ok(())
    }

    // === Programs ===

    /// Compile and link a program
    ///
    /// Compile or link failures are logged and yield an unusable program
    /// that is skipped at draw time.
    pub fn create_program(&mut self, descriptor: ProgramDescriptor) -> RenderResult<ProgramKey> {
        let id = self.next_program_id;
        self.next_program_id += 1;
        let program = Program::new(
            &mut self.cache,
            id,
            descriptor,
            self.config.premultiplied_alpha,
            &mut self.warnings,
        )?;
        Ok(self.programs.insert(program))
    }

    /// Program by key
    pub fn program(&self, key: ProgramKey) -> Option<&Program<D>> {
        self.programs.get(key)
    }

    /// Mutable program by key
    pub fn program_mut(&mut self, key: ProgramKey) -> Option<&mut Program<D>> {
        self.programs.get_mut(key)
    }

    /// Release a program
    pub fn remove_program(&mut self, key: ProgramKey) -> RenderResult<()> {
        let program = self.programs.remove(key).ok_or(RenderError::StaleHandle("program"))?;
        program.remove(&mut self.cache);
        Ok(())
    }

    // === Textures ===

    /// Create a texture; pixels upload the first time a program samples it
    pub fn create_texture(&mut self, descriptor: TextureDescriptor) -> RenderResult<TextureKey> {
        let texture = Texture::new(&mut self.cache, descriptor)?;
        Ok(self.textures.insert(texture))
    }

    /// Texture by key
    pub fn texture(&self, key: TextureKey) -> Option<&Texture<D>> {
        self.textures.get(key)
    }

    /// Mutable texture by key
    pub fn texture_mut(&mut self, key: TextureKey) -> Option<&mut Texture<D>> {
        self.textures.get_mut(key)
    }

    /// Release a texture
    pub fn remove_texture(&mut self, key: TextureKey) -> RenderResult<()> {
        let texture = self.textures.remove(key).ok_or(RenderError::StaleHandle("texture"))?;
        texture.remove(&mut self.cache);
        Ok(())
    }

    // === Render targets ===

    /// Create a framebuffer with its attachments
    pub fn create_render_target(&mut self, descriptor: &RenderTargetDescriptor) -> RenderResult<RenderTargetKey> {
        let target = RenderTarget::new(&mut self.cache, &mut self.textures, descriptor)?;
        Ok(self.render_targets.insert(target))
    }

    /// Render target by key
    pub fn render_target(&self, key: RenderTargetKey) -> Option<&RenderTarget<D>> {
        self.render_targets.get(key)
    }

    /// Release a render target and its textures
    pub fn remove_render_target(&mut self, key: RenderTargetKey) -> RenderResult<()> {
        let target = self.render_targets.remove(key).ok_or(RenderError::StaleHandle("render target"))?;
        target.remove(&mut self.cache, &mut self.textures);
        Ok(())
    }

    // === Frame ===

    /// Draw the meshes below `root` as seen from `camera`
    ///
    /// Without a camera the built-in matrix uniforms are not written and
    /// nothing is culled or depth sorted.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        root: NodeId,
        camera: Option<NodeId>,
        options: &RenderOptions,
    ) -> RenderResult<FrameStats> {
        let target = match options.target {
            Some(key) => Some(self.render_targets.get(key).ok_or(RenderError::StaleHandle("render target"))?),
            None => None,
        };

        match target {
            Some(target) => {
                self.cache.bind_framebuffer(Some(target.framebuffer()));
                self.cache.set_viewport(gl_size(target.width()), gl_size(target.height()));
            }
            None => {
                self.cache.bind_framebuffer(None);
                let (width, height) = self.config.drawable_size();
                self.cache.set_viewport(width, height);
            }
        }

        if options.clear.unwrap_or(self.config.auto_clear) {
            let target_has_depth = target.map_or(true, RenderTarget::has_depth);
            if self.config.depth && target_has_depth {
                self.cache.enable(Capability::DepthTest);
                self.cache.set_depth_mask(true);
            }
            let mut mask = ClearMask::COLOR;
            if self.config.depth {
                mask |= ClearMask::DEPTH;
            }
            if self.config.stencil {
                mask |= ClearMask::STENCIL;
            }
            self.cache.clear(mask);
        }

        if options.update {
            scene.update_world_matrices(root, false)?;
        }
        if let Some(camera) = camera {
            let node = scene.get(camera).ok_or(SceneError::StaleNode(camera))?;
            if node.parent().is_none() {
                scene.update_node_world(camera)?;
            }
            let world = *scene.world_matrix(camera)?;
            let state = scene
                .get_mut(camera)
                .and_then(Node::camera_mut)
                .ok_or(SceneError::NotACamera(camera))?;
            state.update_view(&world);
            if options.frustum_cull {
                state.update_frustum();
            }
        }

        let scene: &Scene = scene;
        let camera = camera.and_then(|id| scene.get(id)).and_then(Node::camera);
        let list = build_render_list(
            scene,
            root,
            camera,
            ListOptions { frustum_cull: options.frustum_cull, sort: options.sort },
            &mut self.geometries,
            &self.programs,
            &mut self.warnings,
        )?;

        let mut stats = FrameStats { drawn: 0, culled: list.culled, skipped: list.skipped };
        for item in &list.items {
            let Some(node) = scene.get(item.node) else {
                continue;
            };
            let Some(drawable) = node.drawable() else {
                continue;
            };
            let (Some(program), Some(geometry)) = (
                self.programs.get_mut(drawable.program),
                self.geometries.get_mut(drawable.geometry),
            ) else {
                stats.skipped += 1;
                continue;
            };

            let mut hooks = self.hooks.get_mut(item.node);
            if let Some(hooks) = hooks.as_mut() {
                for hook in &mut hooks.before {
                    hook(&mut *program, node, camera);
                }
            }

            let world = node.world_matrix();
            if let Some(camera) = camera {
                write_matrix_uniforms(program, camera, world);
            }
            let flip_faces = program.state().cull_face.is_some() && world.determinant() < 0.0;
            let usable = program.use_program(
                &mut self.cache,
                &mut self.textures,
                &mut self.scratch,
                &mut self.warnings,
                flip_faces,
            );
            if !usable {
                stats.skipped += 1;
                continue;
            }
            geometry.draw(&mut self.cache, program, drawable.mode, &mut self.warnings)?;
            stats.drawn += 1;

            if let Some(hooks) = hooks {
                for hook in &mut hooks.after {
                    hook(&mut *program, node, camera);
                }
            }
        }

        log::trace!(
            "Frame drew {} meshes ({} culled, {} skipped)",
            stats.drawn,
            stats.culled,
            stats.skipped
        );
        Ok(stats)
    }
}

fn write_matrix_uniforms<D: GraphicsDevice>(program: &mut Program<D>, camera: &Camera, world: &Mat4) {
    let model_view = camera.view_matrix() * world;
    let normal = utils::normal_matrix(&model_view).unwrap_or_else(Mat3::identity);

    set_builtin(program, "projectionMatrix", *camera.projection_matrix());
    set_builtin(program, "cameraPosition", camera.world_position());
    set_builtin(program, "viewMatrix", *camera.view_matrix());
    set_builtin(program, "modelMatrix", *world);
    set_builtin(program, "modelViewMatrix", model_view);
    set_builtin(program, "normalMatrix", normal);
}

fn set_builtin<D: GraphicsDevice>(program: &mut Program<D>, name: &str, value: impl Into<UniformValue>) {
    match program.uniform_mut(name) {
        Some(slot) => *slot = Uniform::Value(value.into()),
        None => program.set_uniform(name, value.into()),
    }
}

fn gl_size(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
