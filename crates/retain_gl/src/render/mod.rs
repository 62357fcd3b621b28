//! # Rendering System
//!
//! Draws a [`Scene`](crate::scene::Scene) through a stateful, immediate-mode
//! [`GraphicsDevice`](api::GraphicsDevice).
//!
//! ## Architecture
//!
//! - **Renderer**: frame driver and owner of every GPU resource
//! - **State cache**: mirror of device state; every state change goes through it
//! - **Resources**: geometry, programs, textures and render targets
//! - **Backends**: a recording headless device and an optional `glow` device
//!
//! ## Redundant Calls
//!
//! Bindings, capabilities, blend and depth modes, texture units and uniform
//! values are compared with the mirrored device state before they reach the
//! device. Anything that talks to the device directly must keep that mirror
//! in sync, so resources only ever receive the [`StateCache`](state::StateCache).

use thiserror::Error;

use crate::config::ConfigError;
use crate::scene::SceneError;

pub mod api;
pub mod backends;
pub mod primitives;
pub mod renderer;
pub mod resources;
pub mod state;

pub use api::{DeviceError, GraphicsDevice};
pub use primitives::{Camera, Projection};
pub use renderer::{DrawHook, FrameStats, RenderOptions, Renderer};

/// Rendering system errors
///
/// Recoverable problems (shader compile failures, missing uniforms or
/// attributes) are logged and never surface here.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A device object could not be created
    ///
    /// Wraps the backend failure, typically an exhausted or lost context.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A scene node passed to the renderer is missing or of the wrong kind
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Renderer configuration failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A resource key no longer refers to a live resource
    #[error("Stale {0} handle")]
    StaleHandle(&'static str),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
