use crate::scene::Scene;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use rtobj_common::{CameraParams, ImagePlane};
use std::time::Duration;

/// Errors reported by render backends and the scene builder.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid geometry: {0}")]
    Geometry(String),
    #[error("invalid frame size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("render backend is not initialized")]
    NotInitialized,
    #[error("render backend is already initialized")]
    AlreadyInitialized,
    #[error("no scene has been set")]
    NoScene,
    #[error("scene is already set; scene updates are not supported")]
    SceneAlreadySet,
    #[error("GPU device error: {0}")]
    Device(String),
    #[error("frame readback failed: {0}")]
    Readback(String),
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Samples accumulated per pixel since the camera last changed.
    pub frame_index: u32,
    /// Frames rendered since initialization.
    pub frames_rendered: u64,
    /// Number of times camera launch parameters were (re)built.
    pub camera_uploads: u64,
    /// FNV-1a checksum of the current camera launch parameters.
    pub camera_checksum: u64,
}

/// Camera launch parameters shared by every backend.
///
/// Layout matches the `Camera` uniform of the GPU kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub position: [f32; 4],
    pub dir_00: [f32; 4],
    pub du: [f32; 4],
    pub dv: [f32; 4],
}

impl CameraUniform {
    pub fn new(camera: &CameraParams, width: u32, height: u32) -> Self {
        let plane = camera.image_plane(width as f32 / height.max(1) as f32);
        Self {
            position: plane.origin.extend(1.0).to_array(),
            dir_00: plane.dir_00.extend(0.0).to_array(),
            du: plane.du.extend(0.0).to_array(),
            dv: plane.dv.extend(0.0).to_array(),
        }
    }

    pub fn image_plane(&self) -> ImagePlane {
        ImagePlane {
            origin: Vec4::from_array(self.position).truncate(),
            dir_00: Vec4::from_array(self.dir_00).truncate(),
            du: Vec4::from_array(self.du).truncate(),
            dv: Vec4::from_array(self.dv).truncate(),
        }
    }

    pub fn checksum(&self) -> u64 {
        fnv1a(bytemuck::bytes_of(self))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Read-only view of a backend's frame buffer.
///
/// Borrowed from the backend: it is gone before the next `render` call can
/// take the backend mutably.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    width: u32,
    height: u32,
    pixels: &'a [u32],
}

impl<'a> FrameView<'a> {
    pub fn new(width: u32, height: u32, pixels: &'a [u32]) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGBA8 pixels, rows top to bottom, red in the low byte.
    pub fn pixels(&self) -> &'a [u32] {
        self.pixels
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.pixels)
    }

    /// RGBA bytes of pixel (x, y), if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[(y * self.width + x) as usize].to_le_bytes())
    }
}

/// Ray-tracing backend interface. All backends implement this trait so the
/// viewer loop does not care which one it drives.
pub trait RenderBackend {
    /// Short backend name for logs and the overlay.
    fn name(&self) -> &'static str;

    /// Allocate the frame buffer and fixed-size resources. Called once.
    fn initialize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Build the acceleration structure for `scene`. Called once.
    fn set_scene(&mut self, scene: Scene) -> Result<(), RenderError>;

    /// Render one frame and block until it is ready.
    ///
    /// Camera launch parameters are rebuilt only when `camera_changed` is
    /// set (or none exist yet), which also restarts sample accumulation.
    /// Returns the wall-clock render time.
    fn render(
        &mut self,
        camera: &CameraParams,
        camera_changed: bool,
    ) -> Result<Duration, RenderError>;

    /// Map the latest frame for reading.
    fn frame(&self) -> Result<FrameView<'_>, RenderError>;

    fn stats(&self) -> RenderStats;
}
