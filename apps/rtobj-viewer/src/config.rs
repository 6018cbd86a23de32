use rtobj_render::ShadingMode;
use std::path::PathBuf;

/// Initial window size in physical pixels; also the render resolution.
pub const WINDOW_SIZE: [u32; 2] = [1280, 720];
/// Vertical field of view in degrees.
pub const FOVY: f32 = 65.0;
/// Arcball motion speed.
pub const MOTION_SPEED: f32 = 100.0;

/// Which ray-tracing backend renders the frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Host raycaster, rows in parallel.
    #[default]
    Cpu,
    /// Compute-shader ray tracer.
    Gpu,
}

/// Shading selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ShadingArg {
    /// Surface normals as colours.
    #[default]
    Normal,
    /// Grey level facing the viewer.
    EyeLight,
}

impl From<ShadingArg> for ShadingMode {
    fn from(arg: ShadingArg) -> Self {
        match arg {
            ShadingArg::Normal => ShadingMode::Normal,
            ShadingArg::EyeLight => ShadingMode::EyeLight,
        }
    }
}

/// Everything the viewer needs from the command line.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub model: PathBuf,
    pub backend: BackendKind,
    pub shading: ShadingMode,
}
