//! # Core Module
//!
//! Shared configuration types used by the renderer and the logging setup.

pub mod config;

pub use config::{
    ApplicationConfig,
    RendererConfig,
    LoggingConfig,
    LogLevel,
    Config,
    ConfigError,
};
