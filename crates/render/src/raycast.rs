use crate::backend::{CameraUniform, FrameView, RenderBackend, RenderError, RenderStats};
use crate::scene::Scene;
use crate::shading::{self, ShadingMode};
use glam::Vec4;
use rayon::prelude::*;
use rtobj_common::CameraParams;
use std::time::{Duration, Instant};

struct Target {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    accum: Vec<Vec4>,
}

/// Host ray caster: one primary ray per pixel per frame, rows in parallel.
///
/// While the camera is still, every frame adds one jittered sample per pixel
/// and the frame buffer holds the running average.
pub struct CpuRaycaster {
    shading: ShadingMode,
    target: Option<Target>,
    scene: Option<Scene>,
    params: Option<CameraUniform>,
    accumulated: u32,
    frames_rendered: u64,
    camera_uploads: u64,
}

impl CpuRaycaster {
    pub fn new(shading: ShadingMode) -> Self {
        Self {
            shading,
            target: None,
            scene: None,
            params: None,
            accumulated: 0,
            frames_rendered: 0,
            camera_uploads: 0,
        }
    }
}

impl RenderBackend for CpuRaycaster {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn initialize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.target.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        let len = width as usize * height as usize;
        self.target = Some(Target {
            width,
            height,
            pixels: vec![0; len],
            accum: vec![Vec4::ZERO; len],
        });
        tracing::debug!(
            width,
            height,
            threads = rayon::current_num_threads(),
            "cpu raycaster initialized"
        );
        Ok(())
    }

    fn set_scene(&mut self, scene: Scene) -> Result<(), RenderError> {
        if self.target.is_none() {
            return Err(RenderError::NotInitialized);
        }
        if self.scene.is_some() {
            return Err(RenderError::SceneAlreadySet);
        }
        tracing::debug!(triangles = scene.triangle_count(), "cpu scene set");
        self.scene = Some(scene);
        Ok(())
    }

    fn render(
        &mut self,
        camera: &CameraParams,
        camera_changed: bool,
    ) -> Result<Duration, RenderError> {
        let start = Instant::now();
        let target = self.target.as_mut().ok_or(RenderError::NotInitialized)?;
        let scene = self.scene.as_ref().ok_or(RenderError::NoScene)?;

        let params = match self.params {
            Some(params) if !camera_changed => params,
            _ => {
                let params = CameraUniform::new(camera, target.width, target.height);
                self.params = Some(params);
                self.camera_uploads += 1;
                self.accumulated = 0;
                params
            }
        };

        let plane = params.image_plane();
        let origin = plane.origin;
        let sample = self.accumulated;
        let samples = (sample + 1) as f32;
        let (width, height) = (target.width, target.height);
        let inv_size = (1.0 / width as f32, 1.0 / height as f32);
        let shading = self.shading;

        target
            .pixels
            .par_chunks_mut(width as usize)
            .zip(target.accum.par_chunks_mut(width as usize))
            .enumerate()
            .for_each(|(y, (pixels, accum))| {
                let y = y as u32;
                for x in 0..width {
                    let jitter = shading::sample_jitter(x, y, sample);
                    let dir = plane.ray_dir(
                        (x as f32 + jitter.x) * inv_size.0,
                        (y as f32 + jitter.y) * inv_size.1,
                    );
                    let hit = scene.trace(origin, dir);
                    let color = shading::shade(shading, hit.as_ref(), dir);

                    let sum = if sample == 0 {
                        color
                    } else {
                        accum[x as usize] + color
                    };
                    accum[x as usize] = sum;
                    pixels[x as usize] = shading::pack_rgba(sum / samples);
                }
            });

        self.accumulated = self.accumulated.saturating_add(1);
        self.frames_rendered += 1;

        let elapsed = start.elapsed();
        tracing::trace!(
            sample,
            height,
            elapsed_ms = elapsed.as_secs_f64() * 1e3,
            "cpu frame"
        );
        Ok(elapsed)
    }

    fn frame(&self) -> Result<FrameView<'_>, RenderError> {
        let target = self.target.as_ref().ok_or(RenderError::NotInitialized)?;
        Ok(FrameView::new(target.width, target.height, &target.pixels))
    }

    fn stats(&self) -> RenderStats {
        RenderStats {
            frame_index: self.accumulated,
            frames_rendered: self.frames_rendered,
            camera_uploads: self.camera_uploads,
            camera_checksum: self.params.map(|p| p.checksum()).unwrap_or(0),
        }
    }
}
