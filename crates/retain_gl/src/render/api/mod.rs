//! Device-facing API
//!
//! The [`GraphicsDevice`] trait and the typed parameter enums passed through it.

pub mod device;
pub mod types;

pub use device::{ActiveUniform, DeviceError, DeviceResult, GraphicsDevice};
pub use types::*;
