use crate::error::{EngineError, EngineResult};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// An ordered set of vertices, optionally with triangle indices and
/// per-vertex normals. Immutable once constructed: every transform produces
/// a new `Mesh` or `PointCloud` rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    vertices: Vec<Point3<f32>>,
    triangles: Option<Vec<[u32; 3]>>,
    normals: Option<Vec<Vector3<f32>>>,
    min: Point3<f32>,
    max: Point3<f32>,
}

fn bounds(vertices: &[Point3<f32>]) -> (Point3<f32>, Point3<f32>) {
    let mut min = Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for v in vertices {
        min.x = min.x.min(v.x);
        min.y = min.y.min(v.y);
        min.z = min.z.min(v.z);
        max.x = max.x.max(v.x);
        max.y = max.y.max(v.y);
        max.z = max.z.max(v.z);
    }
    if vertices.is_empty() {
        min = Point3::origin();
        max = Point3::origin();
    }
    (min, max)
}

impl Mesh {
    pub fn new(
        vertices: Vec<Point3<f32>>,
        triangles: Option<Vec<[u32; 3]>>,
        normals: Option<Vec<Vector3<f32>>>,
    ) -> EngineResult<Self> {
        if let Some(n) = &normals {
            if !n.is_empty() && n.len() != vertices.len() {
                return Err(EngineError::InputMissing(format!(
                    "mesh normals length {} does not match vertex count {}",
                    n.len(),
                    vertices.len()
                )));
            }
        }
        let (min, max) = bounds(&vertices);
        Ok(Self {
            vertices,
            triangles,
            normals,
            min,
            max,
        })
    }

    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    pub fn triangles(&self) -> Option<&[[u32; 3]]> {
        self.triangles.as_deref()
    }

    pub fn normals(&self) -> Option<&[Vector3<f32>]> {
        self.normals.as_deref()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn min(&self) -> Point3<f32> {
        self.min
    }

    pub fn max(&self) -> Point3<f32> {
        self.max
    }

    /// `(min + max) / 2`, matching AABB-center conventions used by the
    /// upstream viewer so pre-alignment translations line up with it.
    pub fn aabb_center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn extents(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        let e = self.extents();
        e.x.max(e.y).max(e.z)
    }

    /// Normal at `index`, or the zero vector when normals are absent —
    /// callers treat a zero normal as "no normal data" rather than special
    /// casing `None` at every call site.
    pub fn normal_at(&self, index: usize) -> Vector3<f32> {
        self.normals
            .as_ref()
            .and_then(|n| n.get(index))
            .copied()
            .unwrap_or_else(Vector3::zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cube() -> Mesh {
        let v = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        Mesh::new(v, None, None).unwrap()
    }

    #[test]
    fn aabb_center_and_extents() {
        let m = cube();
        assert_eq!(m.aabb_center(), Point3::new(0.5, 0.5, 0.5));
        assert_eq!(m.extents(), Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn empty_mesh_has_zero_bounds() {
        let m = Mesh::new(vec![], None, None).unwrap();
        assert_eq!(m.min(), Point3::origin());
        assert_eq!(m.max(), Point3::origin());
        assert!(m.is_empty());
    }

    #[test]
    fn mismatched_normals_rejected() {
        let v = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let n = vec![Vector3::z()];
        assert!(Mesh::new(v, None, Some(n)).is_err());
    }
}
