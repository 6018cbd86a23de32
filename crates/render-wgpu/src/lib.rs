//! wgpu side of the viewer: a compute-shader ray tracer implementing
//! `RenderBackend`, and the blit that puts a finished frame on screen.
//!
//! # Invariants
//! - The ray tracer traverses the same BVH node layout the host builds; no
//!   GPU-side rebuild.
//! - Camera parameters reach the GPU only when the caller reports a change.
//! - The blit never scales or filters: one image texel per surface pixel.

mod blit;
mod raytracer;
mod shaders;

pub use blit::DisplayBlit;
pub use raytracer::{GpuRaytracer, GpuTriangle};
