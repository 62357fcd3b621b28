//! # Unified Configuration
//!
//! Serializable settings for the renderer and for logging, grouped under an
//! [`ApplicationConfig`] that can be stored as TOML or RON.
//!
//! ## Configuration Categories
//!
//! - **Renderer Config**: surface size, pixel ratio, default buffers, clearing
//! - **Logging Config**: default level and filter directives

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

/// # Renderer Configuration
///
/// Describes the default drawing surface and how the frame driver treats it.
/// `width`/`height` are in logical pixels; the default viewport is their
/// product with `dpr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Logical surface width
    pub width: u32,
    /// Logical surface height
    pub height: u32,
    /// Device pixel ratio
    pub dpr: f32,
    /// Whether the surface has an alpha channel
    pub alpha: bool,
    /// Whether the surface has a depth buffer
    pub depth: bool,
    /// Whether the surface has a stencil buffer
    pub stencil: bool,
    /// Whether blending assumes premultiplied colors
    pub premultiplied_alpha: bool,
    /// Clear the target before every render unless told otherwise
    pub auto_clear: bool,
    /// Maximum number of recoverable warnings logged per renderer
    pub max_warnings: u32,
}

impl RendererConfig {
    /// Create a renderer configuration for a surface size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Set device pixel ratio
    pub fn with_dpr(mut self, dpr: f32) -> Self {
        self.dpr = dpr;
        self
    }

    /// Configure depth and stencil buffers of the default surface
    pub fn with_buffers(mut self, depth: bool, stencil: bool) -> Self {
        self.depth = depth;
        self.stencil = stencil;
        self
    }

    /// Enable or disable premultiplied alpha blending defaults
    pub fn with_premultiplied_alpha(mut self, enabled: bool) -> Self {
        self.premultiplied_alpha = enabled;
        self
    }

    /// Enable or disable automatic clearing
    pub fn with_auto_clear(mut self, enabled: bool) -> Self {
        self.auto_clear = enabled;
        self
    }

    /// Set the warning cap
    pub fn with_max_warnings(mut self, max: u32) -> Self {
        self.max_warnings = max;
        self
    }

    /// Viewport size of the default surface in device pixels
    pub fn drawable_size(&self) -> (i32, i32) {
        let scale = |v: u32| (v as f32 * self.dpr).round() as i32;
        (scale(self.width), scale(self.height))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid("surface size must be non-zero".to_string()));
        }
        if !(self.dpr.is_finite() && self.dpr > 0.0) {
            return Err(ConfigError::Invalid(format!("device pixel ratio must be positive, got {}", self.dpr)));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 300,
            height: 150,
            dpr: 1.0,
            alpha: false,
            depth: true,
            stencil: false,
            premultiplied_alpha: false,
            auto_clear: true,
            max_warnings: 100,
        }
    }
}

impl Config for RendererConfig {}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational
    Info,
    /// Debug output
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to a `log` level filter
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// # Logging Configuration
///
/// `filter` follows the `env_logger` directive syntax
/// (e.g. `"retain_gl=debug,warn"`) and wins over both `RUST_LOG` and `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when neither `filter` nor `RUST_LOG` is set
    pub level: LogLevel,
    /// Explicit filter directives
    pub filter: Option<String>,
    /// Capture output for the test harness
    pub is_test: bool,
}

impl LoggingConfig {
    /// Set the default level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set explicit filter directives
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Route output through the test harness
    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        self.is_test = enabled;
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            filter: None,
            is_test: false,
        }
    }
}

impl Config for LoggingConfig {}

/// # Complete Application Configuration
///
/// Top-level configuration that applications load at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Renderer configuration
    pub renderer: RendererConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate()
    }
}

impl Config for ApplicationConfig {}
