//! Backend abstraction layer
//!
//! Provides the immediate graphics API seam and its two implementations:
//! a wgpu backend for real GPUs and a headless backend that records calls.

pub mod headless;
pub mod reflect;
pub mod topology;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use headless::{Command, HeadlessBackend};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::{WgpuBackend, WgpuBackendConfig};
