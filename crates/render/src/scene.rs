use crate::backend::RenderError;
use crate::bvh::{Bvh, BvhNode};
use crate::geometry::{Ray, Triangle};
use glam::{Vec3, Vec3A};
use rtobj_common::{Bounds, Mesh};

/// Validated triangle soup.
#[derive(Debug, Clone, Default)]
pub struct TriangleGeometry {
    triangles: Vec<Triangle>,
}

impl TriangleGeometry {
    /// Check the raw buffers and resolve indices into triangles.
    pub fn from_buffers(vertices: &[f32], indices: &[u32]) -> Result<Self, RenderError> {
        if vertices.len() % 3 != 0 {
            return Err(RenderError::Geometry(format!(
                "vertex buffer length {} is not a multiple of 3",
                vertices.len()
            )));
        }
        if indices.len() % 3 != 0 {
            return Err(RenderError::Geometry(format!(
                "index buffer length {} is not a multiple of 3",
                indices.len()
            )));
        }
        if indices.is_empty() {
            return Err(RenderError::Geometry("geometry has no triangles".into()));
        }
        if let Some(i) = vertices.iter().position(|v| !v.is_finite()) {
            return Err(RenderError::Geometry(format!(
                "vertex {} has a non-finite coordinate",
                i / 3
            )));
        }

        let vertex_count = vertices.len() / 3;
        let vertex = |i: u32| -> Result<Vec3, RenderError> {
            let i = i as usize;
            if i >= vertex_count {
                return Err(RenderError::Geometry(format!(
                    "index {i} out of range for {vertex_count} vertices"
                )));
            }
            Ok(Vec3::from_slice(&vertices[i * 3..i * 3 + 3]))
        };

        let triangles = indices
            .chunks_exact(3)
            .map(|t| -> Result<Triangle, RenderError> {
                Ok(Triangle::new(vertex(t[0])?, vertex(t[1])?, vertex(t[2])?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { triangles })
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }
}

/// Closest intersection found by [`Scene::intersect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f32,
    /// Unit geometric normal of the hit triangle, not face-forwarded.
    pub normal: Vec3,
    /// Triangle index in leaf order.
    pub prim: usize,
}

/// A single triangle mesh together with its acceleration structure.
///
/// Triangles are stored in BVH leaf order so a leaf's range indexes them
/// directly, on the host and on the GPU.
#[derive(Debug, Clone)]
pub struct Scene {
    geometry: TriangleGeometry,
    bvh: Bvh,
}

impl Scene {
    pub fn from_buffers(vertices: &[f32], indices: &[u32]) -> Result<Self, RenderError> {
        let geometry = TriangleGeometry::from_buffers(vertices, indices)?;
        Ok(Self::new(geometry))
    }

    pub fn from_mesh(mesh: &Mesh) -> Result<Self, RenderError> {
        Self::from_buffers(&mesh.positions, &mesh.indices)
    }

    pub fn new(geometry: TriangleGeometry) -> Self {
        let bvh = Bvh::build(geometry.triangles());
        let triangles = bvh
            .order
            .iter()
            .map(|&i| geometry.triangles[i as usize])
            .collect();
        tracing::debug!(
            triangles = geometry.len(),
            nodes = bvh.nodes.len(),
            "scene built"
        );
        Self {
            geometry: TriangleGeometry { triangles },
            bvh,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.geometry.len()
    }

    /// Triangles in leaf order.
    pub fn triangles(&self) -> &[Triangle] {
        self.geometry.triangles()
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.bvh.nodes
    }

    pub fn bounds(&self) -> Bounds {
        self.bvh.bounds()
    }

    pub fn intersect(&self, ray: &Ray) -> Option<Hit> {
        let (t, prim) = self.bvh.traverse(ray, self.geometry.triangles())?;
        Some(Hit {
            t,
            normal: self.geometry.triangles[prim].normal().into(),
            prim,
        })
    }

    /// Closest hit along `origin + t * dir` for `t >= 0`.
    pub fn trace(&self, origin: Vec3, dir: Vec3) -> Option<Hit> {
        self.intersect(&Ray::new_inf(Vec3A::from(origin), Vec3A::from(dir)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_VERTICES: [f32; 12] = [
        -1.0, -1.0, 0.0, //
        1.0, -1.0, 0.0, //
        1.0, 1.0, 0.0, //
        -1.0, 1.0, 0.0,
    ];
    const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

    fn geometry_error(result: Result<Scene, RenderError>) -> String {
        match result {
            Err(RenderError::Geometry(msg)) => msg,
            other => panic!("expected geometry error, got {other:?}"),
        }
    }

    #[test]
    fn builds_from_buffers() {
        let scene = Scene::from_buffers(&QUAD_VERTICES, &QUAD_INDICES).unwrap();
        assert_eq!(scene.triangle_count(), 2);
        assert_eq!(scene.bounds().min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(scene.bounds().max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn builds_from_mesh() {
        let mesh = Mesh::new(QUAD_VERTICES.to_vec(), QUAD_INDICES.to_vec());
        let scene = Scene::from_mesh(&mesh).unwrap();
        assert_eq!(scene.triangle_count(), mesh.triangle_count());
    }

    #[test]
    fn trace_hits_quad() {
        let scene = Scene::from_buffers(&QUAD_VERTICES, &QUAD_INDICES).unwrap();
        let hit = scene
            .trace(Vec3::new(0.3, -0.2, 4.0), Vec3::NEG_Z)
            .unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Z).length() < 1e-5);
        assert!(scene.trace(Vec3::new(3.0, 0.0, 4.0), Vec3::NEG_Z).is_none());
        // Behind the origin is not a hit.
        assert!(scene.trace(Vec3::new(0.0, 0.0, 4.0), Vec3::Z).is_none());
    }

    #[test]
    fn rejects_ragged_vertex_buffer() {
        let msg = geometry_error(Scene::from_buffers(&QUAD_VERTICES[..11], &QUAD_INDICES));
        assert!(msg.contains("vertex buffer"));
    }

    #[test]
    fn rejects_ragged_index_buffer() {
        let msg = geometry_error(Scene::from_buffers(&QUAD_VERTICES, &QUAD_INDICES[..5]));
        assert!(msg.contains("index buffer"));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let msg = geometry_error(Scene::from_buffers(&QUAD_VERTICES, &[0, 1, 4]));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn rejects_non_finite_vertex() {
        let mut vertices = QUAD_VERTICES;
        vertices[7] = f32::NAN;
        let msg = geometry_error(Scene::from_buffers(&vertices, &QUAD_INDICES));
        assert!(msg.contains("vertex 2"));
    }

    #[test]
    fn rejects_empty_geometry() {
        geometry_error(Scene::from_buffers(&[], &[]));
        geometry_error(Scene::from_buffers(&QUAD_VERTICES, &[]));
    }
}
