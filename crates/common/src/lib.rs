//! Shared types for the rtobj viewer.
//!
//! # Invariants
//! - A `Mesh` is immutable once loaded; positions are xyz triples and indices
//!   are one triple per triangle.
//! - `CameraParams` is the only camera description renderers consume.

pub mod camera;
pub mod mesh;

pub use camera::{CameraParams, ImagePlane};
pub use mesh::{Bounds, Mesh};
