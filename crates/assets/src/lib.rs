//! Model loading: parses OBJ files with `tobj` and flattens every group in
//! the file into a single `Mesh`.
//!
//! # Invariants
//! - Index count of the returned mesh is always `3 * triangle_count`.
//! - Every index refers to a vertex of the returned mesh.
//! - Vertex positions are the file's `v` records in file order, referenced or
//!   not, so groups sharing a record share one vertex.
//! - Loader warnings never fail a load; missing geometry does.

use rtobj_common::Mesh;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Errors from model loading. All of them are fatal for the viewer.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to load OBJ model '{}': {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("failed to read vertex records of '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OBJ model '{}' contains no triangles", path.display())]
    NoTriangles { path: PathBuf },
}

/// Per-group summary of what was merged into the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeSummary {
    pub name: String,
    pub triangles: usize,
}

/// A loaded model: merged geometry plus the non-fatal diagnostics.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub mesh: Mesh,
    pub shapes: Vec<ShapeSummary>,
    pub warnings: Vec<String>,
}

/// Load an OBJ file, triangulating polygons and dumping all groups into one mesh.
///
/// Material libraries are not used by the viewer; failing to read them is
/// reported as a warning.
pub fn load_obj(path: impl AsRef<Path>) -> Result<LoadedModel, AssetError> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        single_index: false,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    };

    let (models, materials) =
        tobj::load_obj(path, &options).map_err(|source| AssetError::Load {
            path: path.to_path_buf(),
            source,
        })?;

    let mut warnings = Vec::new();
    if let Err(e) = materials {
        warnings.push(format!("materials unavailable: {e}"));
    }

    let records = read_vertex_records(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut vertices = VertexTable::from_records(records);

    let mut indices = Vec::new();
    let mut shapes = Vec::with_capacity(models.len());
    for model in &models {
        let triangles = model.mesh.indices.len() / 3;
        tracing::info!("loading shape {}, has {} triangles", model.name, triangles);
        if triangles == 0 {
            warnings.push(format!("shape '{}' has no triangles", model.name));
        }

        let local: Vec<u32> = model
            .mesh
            .positions
            .chunks_exact(3)
            .map(|p| vertices.index_of([p[0], p[1], p[2]]))
            .collect();
        indices.extend(
            model.mesh.indices[..triangles * 3]
                .iter()
                .map(|&i| local[i as usize]),
        );

        shapes.push(ShapeSummary {
            name: model.name.clone(),
            triangles,
        });
    }
    let mesh = Mesh::new(vertices.positions, indices);

    for warning in &warnings {
        tracing::warn!("warning loading model: {warning}");
    }

    if mesh.is_empty() {
        return Err(AssetError::NoTriangles {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "model loaded from {}",
        path.display()
    );

    Ok(LoadedModel {
        mesh,
        shapes,
        warnings,
    })
}

/// Global vertex array of the file with a lookup from position bits to the
/// first record holding that position.
struct VertexTable {
    positions: Vec<f32>,
    lookup: HashMap<[u32; 3], u32>,
}

impl VertexTable {
    fn from_records(records: Vec<[f32; 3]>) -> Self {
        let mut table = Self {
            positions: Vec::with_capacity(records.len() * 3),
            lookup: HashMap::with_capacity(records.len()),
        };
        for p in records {
            table.push(p);
        }
        table
    }

    fn push(&mut self, p: [f32; 3]) -> u32 {
        let index = (self.positions.len() / 3) as u32;
        self.positions.extend_from_slice(&p);
        *self.lookup.entry(p.map(f32::to_bits)).or_insert(index)
    }

    /// Index of the record at `p`; positions missing from the table are
    /// appended.
    fn index_of(&mut self, p: [f32; 3]) -> u32 {
        match self.lookup.get(&p.map(f32::to_bits)) {
            Some(&i) => i,
            None => self.push(p),
        }
    }
}

/// The `v` records of an OBJ file in file order. Lines that are not
/// well-formed vertex records are skipped; the OBJ parser reports those.
fn read_vertex_records(path: &Path) -> std::io::Result<Vec<[f32; 3]>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        if words.next() != Some("v") {
            continue;
        }
        let mut xyz = [0.0f32; 3];
        let parsed = xyz
            .iter_mut()
            .all(|c| match words.next().map(str::parse::<f32>) {
                Some(Ok(v)) => {
                    *c = v;
                    true
                }
                _ => false,
            });
        if parsed {
            records.push(xyz);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_obj(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const TETRAHEDRON: &str = "\
o tetra
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
f 1 3 2
f 1 2 4
f 1 4 3
f 2 3 4
";

    #[test]
    fn counts_match_file() {
        let file = write_obj(TETRAHEDRON);
        let model = load_obj(file.path()).unwrap();
        assert_eq!(model.mesh.vertex_count(), 4);
        assert_eq!(model.mesh.indices.len(), 3 * 4);
        assert_eq!(model.shapes.len(), 1);
        assert_eq!(model.shapes[0].triangles, 4);
    }

    #[test]
    fn quads_are_triangulated() {
        let file = write_obj(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 0 1\nv 1 0 1\nf 1 2 3 4\nf 1 2 6 5\n",
        );
        let model = load_obj(file.path()).unwrap();
        assert_eq!(model.mesh.vertex_count(), 6);
        assert_eq!(model.mesh.triangle_count(), 4);
        assert_eq!(model.mesh.indices.len(), 12);
    }

    #[test]
    fn groups_are_merged_with_offsets() {
        let file = write_obj(
            "o a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\no b\nv 5 0 0\nv 6 0 0\nv 5 1 0\nf 4 5 6\n",
        );
        let model = load_obj(file.path()).unwrap();
        assert_eq!(model.shapes.len(), 2);
        assert_eq!(model.mesh.triangle_count(), 2);
        let vertex_count = model.mesh.vertex_count() as u32;
        assert!(model.mesh.indices.iter().all(|&i| i < vertex_count));
        // The second triangle still lands at x >= 5.
        let i = model.mesh.indices[3] as usize;
        assert!(model.mesh.vertex(i).unwrap().x >= 5.0);
    }

    #[test]
    fn groups_sharing_records_share_vertices() {
        let file = write_obj(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\ng a\nf 1 2 3\ng b\nf 1 3 4\n",
        );
        let model = load_obj(file.path()).unwrap();
        assert_eq!(model.shapes.len(), 2);
        assert_eq!(model.mesh.vertex_count(), 4);
        assert_eq!(model.mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn unreferenced_records_are_kept() {
        let file = write_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nv 9 9 9\nf 1 2 3\n");
        let model = load_obj(file.path()).unwrap();
        assert_eq!(model.mesh.vertex_count(), 4);
        assert_eq!(model.mesh.triangle_count(), 1);
        assert_eq!(model.mesh.positions[9..], [9.0, 9.0, 9.0]);
        assert_eq!(model.mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn missing_material_library_is_a_warning() {
        let file = write_obj(&format!("mtllib does_not_exist.mtl\n{TETRAHEDRON}"));
        let model = load_obj(file.path()).unwrap();
        assert_eq!(model.mesh.triangle_count(), 4);
        assert!(!model.warnings.is_empty());
    }

    #[test]
    fn nonexistent_file_mentions_path() {
        let err = load_obj("/definitely/not/here/model.obj").unwrap_err();
        assert!(matches!(err, AssetError::Load { .. }));
        assert!(err.to_string().contains("/definitely/not/here/model.obj"));
    }

    #[test]
    fn file_without_faces_is_an_error() {
        let file = write_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\n");
        let err = load_obj(file.path()).unwrap_err();
        assert!(matches!(err, AssetError::NoTriangles { .. }));
    }
}
