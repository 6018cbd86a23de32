//! Rendering: renderer-agnostic backend interface plus the host raycaster.
//!
//! # Invariants
//! - A backend is initialized once, receives its scene once, then renders
//!   any number of frames.
//! - Camera launch parameters are only rebuilt when the caller says the
//!   camera changed.
//! - Frame pixels are only reachable through a `FrameView` borrowed from the
//!   backend, so they cannot be read while a frame is being rendered.

pub mod backend;
pub mod bvh;
pub mod geometry;
pub mod raycast;
pub mod scene;
pub mod shading;

pub use backend::{CameraUniform, FrameView, RenderBackend, RenderError, RenderStats};
pub use bvh::{Bvh, BvhNode};
pub use raycast::CpuRaycaster;
pub use scene::{Hit, Scene, TriangleGeometry};
pub use shading::ShadingMode;
