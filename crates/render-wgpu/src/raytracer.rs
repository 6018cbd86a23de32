use crate::shaders;
use bytemuck::{Pod, Zeroable};
use rtobj_common::CameraParams;
use rtobj_render::geometry::Triangle;
use rtobj_render::{
    CameraUniform, FrameView, RenderBackend, RenderError, RenderStats, Scene, ShadingMode,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wgpu::util::DeviceExt;

/// Workgroup edge, must match `@workgroup_size` in the kernel.
const WG_SIZE: u32 = 8;

/// Triangle as stored in the GPU triangle buffer (48 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: [f32; 4],
    pub v1: [f32; 4],
    pub v2: [f32; 4],
}

impl From<&Triangle> for GpuTriangle {
    fn from(tri: &Triangle) -> Self {
        Self {
            v0: tri.v0.extend(1.0).to_array(),
            v1: tri.v1.extend(1.0).to_array(),
            v2: tri.v2.extend(1.0).to_array(),
        }
    }
}

/// Per-dispatch constants, rewritten every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniform {
    sample: u32,
    width: u32,
    height: u32,
    shading: u32,
}

struct Target {
    width: u32,
    height: u32,
    accum_buffer: wgpu::Buffer,
    pixel_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    /// Host copy of the last finished frame.
    pixels: Vec<u32>,
}

struct SceneBuffers {
    _nodes: wgpu::Buffer,
    _triangles: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Compute-shader ray tracer.
///
/// The frame is traced into a storage buffer, copied into a mappable staging
/// buffer and read back before `render` returns, so `frame()` never touches
/// the GPU.
pub struct GpuRaytracer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    shading: ShadingMode,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    frame_buffer: wgpu::Buffer,
    target: Option<Target>,
    scene: Option<SceneBuffers>,
    params: Option<CameraUniform>,
    accumulated: u32,
    frames_rendered: u64,
    camera_uploads: u64,
}

impl GpuRaytracer {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, shading: ShadingMode) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("raytrace_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::RAYTRACE_SHADER.into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let uniform = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raytrace_bind_group_layout"),
            entries: &[
                storage(0, true),
                storage(1, true),
                uniform(2),
                uniform(3),
                storage(4, false),
                storage(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("raytrace_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("raytrace_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera_buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_buffer"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            shading,
            pipeline,
            bind_group_layout,
            camera_buffer,
            frame_buffer,
            target: None,
            scene: None,
            params: None,
            accumulated: 0,
            frames_rendered: 0,
            camera_uploads: 0,
        }
    }

    /// Ray tracer on a device of its own, without a window.
    pub fn headless(shading: ShadingMode) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::Device("no suitable GPU adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("rtobj_headless_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::Device(e.to_string()))?;

        Ok(Self::new(Arc::new(device), Arc::new(queue), shading))
    }

    fn bind_group(&self, nodes: &wgpu::Buffer, triangles: &wgpu::Buffer, target: &Target) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raytrace_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: target.accum_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: target.pixel_buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Wait for the staging buffer and copy it into the host frame.
    fn read_back(device: &wgpu::Device, target: &mut Target) -> Result<(), RenderError> {
        let slice = target.staging_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice_mut::<u32, u8>(&mut target.pixels).copy_from_slice(&data);
        }
        target.staging_buffer.unmap();
        Ok(())
    }
}

impl RenderBackend for GpuRaytracer {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn initialize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.target.is_some() {
            return Err(RenderError::AlreadyInitialized);
        }
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        let pixel_count = width as u64 * height as u64;
        let pixel_bytes = pixel_count * 4;
        let accum_bytes = pixel_count * 16;
        let limit = self.device.limits().max_storage_buffer_binding_size as u64;
        if accum_bytes > limit {
            return Err(RenderError::Device(format!(
                "{width}x{height} accumulation buffer exceeds the {limit} byte storage limit"
            )));
        }

        let accum_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("accum_buffer"),
            size: accum_bytes,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let pixel_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixel_buffer"),
            size: pixel_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size: pixel_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.target = Some(Target {
            width,
            height,
            accum_buffer,
            pixel_buffer,
            staging_buffer,
            pixels: vec![0; pixel_count as usize],
        });
        tracing::debug!(width, height, "gpu raytracer initialized");
        Ok(())
    }

    fn set_scene(&mut self, scene: Scene) -> Result<(), RenderError> {
        let Some(target) = self.target.as_ref() else {
            return Err(RenderError::NotInitialized);
        };
        if self.scene.is_some() {
            return Err(RenderError::SceneAlreadySet);
        }

        let triangles: Vec<GpuTriangle> = scene.triangles().iter().map(GpuTriangle::from).collect();
        let nodes = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bvh_nodes"),
            contents: bytemuck::cast_slice(scene.nodes()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let triangles_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bvh_triangles"),
            contents: bytemuck::cast_slice(&triangles),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let bind_group = self.bind_group(&nodes, &triangles_buffer, target);

        tracing::debug!(
            triangles = triangles.len(),
            nodes = scene.nodes().len(),
            "gpu scene uploaded"
        );
        self.scene = Some(SceneBuffers {
            _nodes: nodes,
            _triangles: triangles_buffer,
            bind_group,
        });
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

        if camera_changed || self.params.is_none() {
            let params = CameraUniform::new(camera, target.width, target.height);
            self.queue
                .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&params));
            self.params = Some(params);
            self.camera_uploads += 1;
            self.accumulated = 0;
        }

        let frame = FrameUniform {
            sample: self.accumulated,
            width: target.width,
            height: target.height,
            shading: self.shading.as_u32(),
        };
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raytrace_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("raytrace_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &scene.bind_group, &[]);
            pass.dispatch_workgroups(
                target.width.div_ceil(WG_SIZE),
                target.height.div_ceil(WG_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(
            &target.pixel_buffer,
            0,
            &target.staging_buffer,
            0,
            target.pixel_buffer.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        Self::read_back(&self.device, target)?;

        self.accumulated = self.accumulated.saturating_add(1);
        self.frames_rendered += 1;
        Ok(start.elapsed())
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

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use rtobj_render::CpuRaycaster;

    fn quad_scene() -> Scene {
        Scene::from_buffers(
            &[
                -1.0, -1.0, 0.0, //
                1.0, -1.0, 0.0, //
                1.0, 1.0, 0.0, //
                -1.0, 1.0, 0.0,
            ],
            &[0, 1, 2, 0, 2, 3],
        )
        .unwrap()
    }

    /// GPU tests are skipped on machines without an adapter.
    fn gpu(shading: ShadingMode) -> Option<GpuRaytracer> {
        match GpuRaytracer::headless(shading) {
            Ok(rt) => Some(rt),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn triangle_layout() {
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 48);
        assert_eq!(std::mem::size_of::<FrameUniform>(), 16);
        let tri = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        let gpu = GpuTriangle::from(&tri);
        assert_eq!(gpu.v1, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn lifecycle_errors() {
        let Some(mut rt) = gpu(ShadingMode::Normal) else {
            return;
        };
        assert!(matches!(
            rt.set_scene(quad_scene()),
            Err(RenderError::NotInitialized)
        ));
        rt.initialize(8, 8).unwrap();
        assert!(matches!(
            rt.initialize(8, 8),
            Err(RenderError::AlreadyInitialized)
        ));
        assert!(matches!(
            rt.render(&CameraParams::default(), true),
            Err(RenderError::NoScene)
        ));
    }

    #[test]
    fn matches_host_raycaster_at_centre() {
        let Some(mut rt) = gpu(ShadingMode::Normal) else {
            return;
        };
        rt.initialize(16, 16).unwrap();
        rt.set_scene(quad_scene()).unwrap();
        rt.render(&CameraParams::default(), true).unwrap();

        let mut host = CpuRaycaster::new(ShadingMode::Normal);
        host.initialize(16, 16).unwrap();
        host.set_scene(quad_scene()).unwrap();
        host.render(&CameraParams::default(), true).unwrap();

        let gpu_frame = rt.frame().unwrap();
        let host_frame = host.frame().unwrap();
        let (gpu_px, host_px) = (gpu_frame.pixel(8, 8).unwrap(), host_frame.pixel(8, 8).unwrap());
        // The sRGB curve may round one step apart between GPU and host pow.
        assert!(
            gpu_px.iter().zip(host_px).all(|(&g, h)| g.abs_diff(h) <= 1),
            "gpu {gpu_px:?} host {host_px:?}"
        );
        assert_eq!(host_px, [188, 188, 255, 255]);
        assert_eq!(gpu_frame.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn unchanged_camera_is_not_uploaded_again() {
        let Some(mut rt) = gpu(ShadingMode::EyeLight) else {
            return;
        };
        rt.initialize(16, 16).unwrap();
        rt.set_scene(quad_scene()).unwrap();
        let camera = CameraParams::default();
        rt.render(&camera, true).unwrap();
        let first = rt.stats();

        let moved = CameraParams {
            pos: Vec3::new(0.5, 0.0, 5.0),
            ..camera
        };
        rt.render(&moved, false).unwrap();
        let second = rt.stats();
        assert_eq!(second.camera_uploads, first.camera_uploads);
        assert_eq!(second.camera_checksum, first.camera_checksum);
        assert_eq!(second.frame_index, 2);
    }
}
