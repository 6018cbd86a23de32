//! Camera input: an arcball camera driven by pointer motion and scroll events.
//!
//! # Invariants
//! - The camera is a rigid transform, so `eye_dir()` and `up_dir()` are
//!   always orthonormal regardless of the input sequence.
//! - Events are windowing-library agnostic; the viewer translates its own
//!   events into `PointerEvent`s.

pub mod arcball;
pub mod controller;

pub use arcball::ArcballCamera;
pub use controller::{CameraController, PointerButtons, PointerEvent};
