//! Device state mirroring

pub mod cache;

pub use cache::StateCache;
