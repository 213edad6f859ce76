use crate::error::{EngineError, EngineResult};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

/// FPFH feature dimensionality (§3 DATA MODEL).
pub const FEATURE_DIM: usize = 33;

/// An ordered set of 3D points with optional matching normals and optional
/// per-point feature vectors. Invariant: `|normals| in {0, |points|}` and
/// `|features| in {0, |points|}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PointCloud {
    points: Vec<Point3<f32>>,
    normals: Vec<Vector3<f32>>,
    #[serde(with = "feature_vec_serde")]
    features: Vec<[f32; FEATURE_DIM]>,
}

mod feature_vec_serde {
    use super::{BigArray, FEATURE_DIM};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Wrapper(#[serde(with = "BigArray")] [f32; FEATURE_DIM]);

    pub fn serialize<S: Serializer>(
        value: &Vec<[f32; FEATURE_DIM]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .iter()
            .map(|arr| Wrapper(*arr))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<[f32; FEATURE_DIM]>, D::Error> {
        let wrapped = Vec::<Wrapper>::deserialize(deserializer)?;
        Ok(wrapped.into_iter().map(|w| w.0).collect())
    }
}

impl PointCloud {
    pub fn new(
        points: Vec<Point3<f32>>,
        normals: Vec<Vector3<f32>>,
        features: Vec<[f32; FEATURE_DIM]>,
    ) -> EngineResult<Self> {
        if !normals.is_empty() && normals.len() != points.len() {
            return Err(EngineError::InputMissing(format!(
                "point cloud normals length {} does not match point count {}",
                normals.len(),
                points.len()
            )));
        }
        if !features.is_empty() && features.len() != points.len() {
            return Err(EngineError::InputMissing(format!(
                "point cloud features length {} does not match point count {}",
                features.len(),
                points.len()
            )));
        }
        Ok(Self {
            points,
            normals,
            features,
        })
    }

    pub fn from_points(points: Vec<Point3<f32>>) -> Self {
        Self {
            points,
            normals: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    pub fn normals(&self) -> &[Vector3<f32>] {
        &self.normals
    }

    pub fn features(&self) -> &[[f32; FEATURE_DIM]] {
        &self.features
    }

    pub fn has_normals(&self) -> bool {
        self.normals.len() == self.points.len() && !self.points.is_empty()
    }

    pub fn has_features(&self) -> bool {
        self.features.len() == self.points.len() && !self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn centroid(&self) -> Point3<f32> {
        if self.points.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.points.len() as f32)
    }

    pub fn extents(&self) -> Vector3<f32> {
        if self.points.is_empty() {
            return Vector3::zeros();
        }
        let mut min = Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        max - min
    }

    pub fn max_extent(&self) -> f32 {
        let e = self.extents();
        e.x.max(e.y).max(e.z)
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<f32>>) -> EngineResult<Self> {
        if normals.len() != self.points.len() {
            return Err(EngineError::InputMissing(
                "replacement normals length mismatch".into(),
            ));
        }
        self.normals = normals;
        Ok(self)
    }

    pub fn with_features(mut self, features: Vec<[f32; FEATURE_DIM]>) -> EngineResult<Self> {
        if features.len() != self.points.len() {
            return Err(EngineError::InputMissing(
                "replacement features length mismatch".into(),
            ));
        }
        self.features = features;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn centroid_of_two_points() {
        let pc = PointCloud::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 2.0),
        ]);
        assert_eq!(pc.centroid(), Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn rejects_mismatched_normals() {
        let pc = PointCloud::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![Vector3::z()],
            vec![],
        );
        assert!(pc.is_err());
    }
}
