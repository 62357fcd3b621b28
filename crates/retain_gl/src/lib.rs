//! # retain_gl
//!
//! A retained-mode 3D scene graph drawn through a stateful, immediate-mode
//! graphics device with redundant state changes filtered out.
//!
//! ## Features
//!
//! - **Scene graph**: arena nodes with dirty-tracked world matrices
//! - **Culling and ordering**: bounding-sphere frustum culling and an
//!   opaque / transparent / overlay draw order
//! - **State cache**: bindings, capabilities, blend and depth modes, texture
//!   units and uniform values reach the device only when they change
//! - **Backends**: a recording headless device for tests and tools, and an
//!   OpenGL / WebGL2 device behind the `glow` feature
//!
//! ## Quick Start
//!
//! ```rust
//! use retain_gl::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut renderer = Renderer::new(HeadlessDevice::new(), RendererConfig::new(640, 480))?;
//!
//!     let geometry = renderer.create_geometry([
//!         ("position", Attribute::new(3, vec![0.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
//!     ])?;
//!     let program = renderer.create_program(ProgramDescriptor::new(
//!         "attribute vec3 position; uniform mat4 modelViewMatrix; uniform mat4 projectionMatrix; void main() {}",
//!         "void main() {}",
//!     ))?;
//!
//!     let mut scene = Scene::new();
//!     let root = scene.add_group();
//!     let mesh = scene.add_mesh(Drawable::new(geometry, program));
//!     scene.add_child(root, mesh)?;
//!     scene.get_mut(mesh).unwrap().set_position(Vec3::new(0.0, 0.0, -5.0));
//!
//!     let camera = scene.add_camera(Camera::perspective(45.0, 640.0 / 480.0, 0.1, 100.0));
//!     let stats = renderer.render(&mut scene, root, Some(camera), &RenderOptions::default())?;
//!     assert_eq!(stats.drawn, 1);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, Config, LoggingConfig, RendererConfig},
        foundation::{
            collections::{GeometryKey, NodeId, ProgramKey, RenderTargetKey, TextureKey},
            math::{Mat3, Mat4, Quat, Transform, Vec2, Vec3, Vec4},
        },
        render::{
            api::{BlendFactor, BlendFunc, DepthFunc, DrawMode, Face, FrontFace, GraphicsDevice},
            backends::HeadlessDevice,
            resources::{
                Attribute, ProgramDescriptor, RenderTargetDescriptor, TextureDescriptor,
                TextureImage, Uniform, UniformValue,
            },
            Camera, FrameStats, RenderError, RenderOptions, RenderResult, Renderer,
        },
        scene::{Drawable, NodeKind, Scene, SceneError, Visit},
    };
}
