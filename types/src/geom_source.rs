use crate::mesh::Mesh;
use crate::point_cloud::PointCloud;
use nalgebra::{Point3, Vector3};

/// The ROI extractor's "target" side accepts either a mesh or a point cloud
/// (Design Notes §9, "Polymorphic mesh-or-pointcloud"). Both expose a
/// uniform `vertices()` capability so downstream code doesn't care which one
/// it got.
#[derive(Debug, Clone)]
pub enum GeomSource {
    Mesh(Mesh),
    Cloud(PointCloud),
}

impl GeomSource {
    pub fn vertices(&self) -> Vec<Point3<f32>> {
        match self {
            GeomSource::Mesh(m) => m.vertices().to_vec(),
            GeomSource::Cloud(c) => c.points().to_vec(),
        }
    }

    pub fn normal_at(&self, index: usize) -> Vector3<f32> {
        match self {
            GeomSource::Mesh(m) => m.normal_at(index),
            GeomSource::Cloud(c) => c.normals().get(index).copied().unwrap_or_else(Vector3::zeros),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GeomSource::Mesh(m) => m.len(),
            GeomSource::Cloud(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_extent(&self) -> f32 {
        match self {
            GeomSource::Mesh(m) => m.max_extent(),
            GeomSource::Cloud(c) => c.max_extent(),
        }
    }

    pub fn centroid(&self) -> Point3<f32> {
        match self {
            GeomSource::Mesh(m) => m.aabb_center(),
            GeomSource::Cloud(c) => c.centroid(),
        }
    }

    pub fn into_cloud(self) -> PointCloud {
        match self {
            GeomSource::Mesh(m) => PointCloud::from_points(m.vertices().to_vec()),
            GeomSource::Cloud(c) => c,
        }
    }
}

impl From<Mesh> for GeomSource {
    fn from(m: Mesh) -> Self {
        GeomSource::Mesh(m)
    }
}

impl From<PointCloud> for GeomSource {
    fn from(c: PointCloud) -> Self {
        GeomSource::Cloud(c)
    }
}
