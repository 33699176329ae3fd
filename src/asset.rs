//! Focal mesh sources: the procedural sphere and Wavefront OBJ files loaded
//! off the render thread.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

use thiserror::Error;
use tracing::{debug, warn};

use crate::math::{calculate_normal, length, normalize};

/// Indexed triangle mesh with per-vertex normals
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f64; 3]>,
    pub normals: Vec<[f64; 3]>,
    pub triangles: Vec<[usize; 3]>,
}

impl Mesh {
    /// UV sphere centred on the origin
    pub fn sphere(radius: f64, width_segments: usize, height_segments: usize) -> Mesh {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);
        let mut positions = Vec::with_capacity((width_segments + 1) * (height_segments + 1));
        let mut normals = Vec::with_capacity(positions.capacity());

        for iy in 0..=height_segments {
            let v = iy as f64 / height_segments as f64;
            let (sin_theta, cos_theta) = (v * std::f64::consts::PI).sin_cos();
            for ix in 0..=width_segments {
                let u = ix as f64 / width_segments as f64;
                let (sin_phi, cos_phi) = (u * std::f64::consts::TAU).sin_cos();
                let normal = [-cos_phi * sin_theta, cos_theta, sin_phi * sin_theta];
                positions.push([normal[0] * radius, normal[1] * radius, normal[2] * radius]);
                normals.push(normal);
            }
        }

        let row = width_segments + 1;
        let mut triangles = Vec::with_capacity(width_segments * height_segments * 2);
        for iy in 0..height_segments {
            for ix in 0..width_segments {
                let a = iy * row + ix + 1;
                let b = iy * row + ix;
                let c = (iy + 1) * row + ix;
                let d = (iy + 1) * row + ix + 1;
                // The pole rows collapse to a point; skip their degenerate halves
                if iy != 0 {
                    triangles.push([a, b, d]);
                }
                if iy != height_segments - 1 {
                    triangles.push([b, c, d]);
                }
            }
        }

        Mesh {
            positions,
            normals,
            triangles,
        }
    }

    /// Parses the `v` and `f` statements of a Wavefront OBJ stream. Polygons
    /// are fan-triangulated; normals are recomputed from the faces.
    pub fn from_obj<R: BufRead>(reader: R) -> Result<Mesh, LoadError> {
        let mut positions = Vec::new();
        let mut triangles = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| LoadError::Io(e.to_string()))?;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut coords = [0.0; 3];
                    for coord in coords.iter_mut() {
                        *coord = tokens
                            .next()
                            .and_then(|t| t.parse::<f64>().ok())
                            .ok_or_else(|| LoadError::parse(line_no, "vertex needs three numbers"))?;
                    }
                    positions.push(coords);
                }
                Some("f") => {
                    let corners = tokens
                        .map(|t| resolve_index(t, positions.len(), line_no))
                        .collect::<Result<Vec<_>, _>>()?;
                    if corners.len() < 3 {
                        return Err(LoadError::parse(line_no, "face needs at least three vertices"));
                    }
                    for i in 1..corners.len() - 1 {
                        triangles.push([corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if triangles.is_empty() {
            return Err(LoadError::Empty);
        }
        let mut mesh = Mesh {
            normals: vec![[0.0; 3]; positions.len()],
            positions,
            triangles,
        };
        mesh.recompute_normals();
        Ok(mesh)
    }

    /// Smooth vertex normals averaged from adjacent face normals
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![[0.0; 3]; self.positions.len()];
        for &[a, b, c] in &self.triangles {
            let normal = calculate_normal(&self.positions[a], &self.positions[b], &self.positions[c]);
            for index in [a, b, c] {
                normals[index][0] += normal[0];
                normals[index][1] += normal[1];
                normals[index][2] += normal[2];
            }
        }
        self.normals = normals.iter().map(normalize).collect();
    }

    /// Re-centres the mesh on its bounding-box centre and scales it so the
    /// farthest vertex sits at `radius`
    pub fn fit_to_radius(&mut self, radius: f64) {
        if self.positions.is_empty() {
            return;
        }
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in &self.positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        let centre = [
            (min[0] + max[0]) / 2.0,
            (min[1] + max[1]) / 2.0,
            (min[2] + max[2]) / 2.0,
        ];
        for p in &mut self.positions {
            for axis in 0..3 {
                p[axis] -= centre[axis];
            }
        }
        let extent = self.positions.iter().map(length).fold(0.0, f64::max);
        if extent > f64::EPSILON {
            let scale = radius / extent;
            for p in &mut self.positions {
                for v in p.iter_mut() {
                    *v *= scale;
                }
            }
        }
    }
}

/// OBJ indices are 1-based; negative ones count back from the last vertex
fn resolve_index(token: &str, vertex_count: usize, line: usize) -> Result<usize, LoadError> {
    let raw = token.split('/').next().unwrap_or_default();
    let index: i64 = raw
        .parse()
        .map_err(|_| LoadError::parse(line, format!("bad face index `{token}`")))?;
    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => vertex_count as i64 + i,
        _ => -1,
    };
    if resolved < 0 || resolved >= vertex_count as i64 {
        return Err(LoadError::parse(line, format!("face index `{token}` out of range")));
    }
    Ok(resolved as usize)
}

/// Failure to produce a focal mesh
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(String),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("mesh contains no faces")]
    Empty,
    #[error("unsupported mesh source `{0}`")]
    Unsupported(String),
    #[error("mesh loader stopped before delivering a result")]
    Disconnected,
}

impl LoadError {
    fn parse(line: usize, message: impl Into<String>) -> Self {
        LoadError::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Where the focal mesh comes from
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum MeshSource {
    /// Procedurally generated sphere
    #[default]
    Sphere,
    /// Wavefront OBJ file on disk
    File(PathBuf),
    /// Any other URI; loading it fails with [`LoadError::Unsupported`]
    Other(String),
}

impl FromStr for MeshSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "sphere" | "builtin:sphere" => MeshSource::Sphere,
            _ => match s.strip_prefix("file://") {
                Some(path) => MeshSource::File(PathBuf::from(path)),
                None if s.contains("://") => MeshSource::Other(s.to_string()),
                None => MeshSource::File(PathBuf::from(s)),
            },
        })
    }
}

impl fmt::Display for MeshSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshSource::Sphere => f.write_str("builtin:sphere"),
            MeshSource::File(path) => write!(f, "file://{}", path.display()),
            MeshSource::Other(uri) => f.write_str(uri),
        }
    }
}

/// State of a mesh that may still be loading
#[derive(Debug)]
pub enum MeshPoll {
    Pending,
    Ready(Mesh),
    Failed(LoadError),
}

/// Receiving end of an asynchronous mesh load. Resolves exactly once.
#[derive(Debug)]
pub struct PendingMesh {
    rx: Option<Receiver<Result<Mesh, LoadError>>>,
}

impl PendingMesh {
    /// A pending mesh plus the sender that completes it
    pub fn channel() -> (Sender<Result<Mesh, LoadError>>, PendingMesh) {
        let (tx, rx) = mpsc::channel();
        (tx, PendingMesh { rx: Some(rx) })
    }

    /// An already-resolved load
    pub fn resolved(result: Result<Mesh, LoadError>) -> PendingMesh {
        let (tx, pending) = Self::channel();
        // The receiver is alive in `pending`, so this cannot fail
        let _ = tx.send(result);
        pending
    }

    /// Non-blocking check. After `Ready` or `Failed` has been returned once,
    /// every later call reports `Pending`.
    pub fn poll(&mut self) -> MeshPoll {
        let Some(rx) = &self.rx else {
            return MeshPoll::Pending;
        };
        let outcome = match rx.try_recv() {
            Err(TryRecvError::Empty) => return MeshPoll::Pending,
            Err(TryRecvError::Disconnected) => MeshPoll::Failed(LoadError::Disconnected),
            Ok(Ok(mesh)) => MeshPoll::Ready(mesh),
            Ok(Err(err)) => MeshPoll::Failed(err),
        };
        self.rx = None;
        outcome
    }
}

/// Radius loaded meshes are fitted to
pub const FOCAL_RADIUS: f64 = 1.0;

/// Width and height segments of the procedural focal sphere
pub const SPHERE_SEGMENTS: (usize, usize) = (48, 32);

/// External mesh asset collaborator
pub trait MeshLoader {
    fn load(&self, source: &MeshSource) -> PendingMesh;
}

/// Loads meshes on a worker thread; the render loop only polls the result.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadedMeshLoader;

impl MeshLoader for ThreadedMeshLoader {
    fn load(&self, source: &MeshSource) -> PendingMesh {
        let path = match source {
            MeshSource::File(path) => path.clone(),
            MeshSource::Sphere => {
                let (w, h) = SPHERE_SEGMENTS;
                return PendingMesh::resolved(Ok(Mesh::sphere(FOCAL_RADIUS, w, h)));
            }
            MeshSource::Other(uri) => {
                warn!(%uri, "no loader for mesh source");
                return PendingMesh::resolved(Err(LoadError::Unsupported(uri.clone())));
            }
        };

        let (tx, pending) = PendingMesh::channel();
        let spawned = thread::Builder::new()
            .name("mesh-loader".into())
            .spawn(move || {
                debug!(path = %path.display(), "loading mesh");
                let result = File::open(&path)
                    .map_err(|e| LoadError::Io(format!("{}: {e}", path.display())))
                    .and_then(|file| Mesh::from_obj(BufReader::new(file)))
                    .map(|mut mesh| {
                        mesh.fit_to_radius(FOCAL_RADIUS);
                        mesh
                    });
                // A disposed viewer drops its receiver; nobody is left to tell
                let _ = tx.send(result);
            });
        match spawned {
            Ok(_) => pending,
            Err(e) => PendingMesh::resolved(Err(LoadError::Io(e.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const QUAD: &str = "\
# unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn obj_polygons_are_fan_triangulated() {
        let mesh = Mesh::from_obj(Cursor::new(QUAD)).unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        for n in &mesh.normals {
            assert!((n[2].abs() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn obj_negative_indices_count_from_the_end() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = Mesh::from_obj(Cursor::new(src)).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn obj_errors_carry_line_numbers() {
        let err = Mesh::from_obj(Cursor::new("v 0 0 0\nf 1 2 9\n")).unwrap_err();
        assert!(matches!(err, LoadError::Parse { line: 2, .. }));
        assert_eq!(Mesh::from_obj(Cursor::new("v 0 0 0\n")).unwrap_err(), LoadError::Empty);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let mesh = Mesh::sphere(2.0, 16, 8);
        assert!(mesh.positions.iter().all(|p| (length(p) - 2.0).abs() < 1e-9));
        assert_eq!(mesh.triangles.len(), 16 * 8 * 2 - 2 * 16);
    }

    #[test]
    fn fit_to_radius_recentres_and_scales() {
        let mut mesh = Mesh::from_obj(Cursor::new(QUAD)).unwrap();
        mesh.fit_to_radius(1.0);
        let farthest = mesh.positions.iter().map(length).fold(0.0, f64::max);
        assert!((farthest - 1.0).abs() < 1e-9);
        assert!((mesh.positions[0][0] + mesh.positions[2][0]).abs() < 1e-9);
    }

    #[test]
    fn mesh_source_parsing() {
        assert_eq!("sphere".parse::<MeshSource>().unwrap(), MeshSource::Sphere);
        assert_eq!(
            "file:///tmp/planet.obj".parse::<MeshSource>().unwrap(),
            MeshSource::File(PathBuf::from("/tmp/planet.obj"))
        );
        assert_eq!(
            "models/moon.obj".parse::<MeshSource>().unwrap(),
            MeshSource::File(PathBuf::from("models/moon.obj"))
        );
        assert!(matches!(
            "https://example.com/fire_planet.glb".parse::<MeshSource>().unwrap(),
            MeshSource::Other(_)
        ));
    }

    #[test]
    fn loader_resolves_builtin_sphere_at_once() {
        let mut pending = ThreadedMeshLoader.load(&MeshSource::Sphere);
        let MeshPoll::Ready(mesh) = pending.poll() else {
            panic!("sphere should be ready without a worker");
        };
        let (w, h) = SPHERE_SEGMENTS;
        assert_eq!(mesh.triangles.len(), 2 * w * (h - 1));
    }

    #[test]
    fn pending_mesh_resolves_once() {
        let (tx, mut pending) = PendingMesh::channel();
        assert!(matches!(pending.poll(), MeshPoll::Pending));
        tx.send(Ok(Mesh::sphere(1.0, 4, 3))).unwrap();
        assert!(matches!(pending.poll(), MeshPoll::Ready(_)));
        assert!(matches!(pending.poll(), MeshPoll::Pending));
    }

    #[test]
    fn dropped_sender_reports_disconnect() {
        let (tx, mut pending) = PendingMesh::channel();
        drop(tx);
        assert!(matches!(pending.poll(), MeshPoll::Failed(LoadError::Disconnected)));
    }

    #[test]
    fn missing_file_fails_through_the_loader() {
        let mut pending = ThreadedMeshLoader.load(&MeshSource::File("/nonexistent/planet.obj".into()));
        let outcome = loop {
            match pending.poll() {
                MeshPoll::Pending => std::thread::yield_now(),
                other => break other,
            }
        };
        assert!(matches!(outcome, MeshPoll::Failed(LoadError::Io(_))));
    }
}
