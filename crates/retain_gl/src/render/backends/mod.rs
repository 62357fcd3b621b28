//! Graphics device implementations
//!
//! - [`headless`]: recording device with no GPU, always available
//! - [`gl`]: OpenGL / WebGL2 through `glow`, behind the `glow` feature

pub mod headless;

#[cfg(feature = "glow")]
pub mod gl;

pub use headless::{DeviceCall, HeadlessDevice, HeadlessUniform, RecordedUniform};

#[cfg(feature = "glow")]
pub use gl::GlowDevice;
