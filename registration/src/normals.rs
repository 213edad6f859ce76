use geometry::KdTree;
use nalgebra::{Point3, Vector3};
use transform::pca_frame;

/// Hybrid radius/max-neighbor normal estimation (§4.4 step 2): the normal at
/// each point is the PCA axis of least variance among its up-to-`max_nn`
/// neighbours within `radius`. Points with fewer than 3 neighbours get a
/// zero normal. Sign is left as returned by the eigendecomposition — there is
/// no camera viewpoint to orient against, so callers that need consistent
/// orientation (point-to-plane ICP) rely on the ICP correspondence step to
/// reject sign-flipped pairs via nearest-point search, not normal sign.
pub fn estimate_normals(points: &[Point3<f32>], radius: f32, max_nn: usize) -> Vec<Vector3<f32>> {
    if points.is_empty() {
        return Vec::new();
    }
    let tree = KdTree::build(points.to_vec());
    points
        .iter()
        .map(|p| {
            let mut neighbors = tree.within_radius(p, radius);
            neighbors.truncate(max_nn);
            if neighbors.len() < 3 {
                return Vector3::zeros();
            }
            let local: Vec<Point3<f32>> = neighbors.iter().map(|&(idx, _)| points[idx]).collect();
            match pca_frame(&local) {
                Ok(frame) => frame.axes.column(2).into_owned(),
                Err(_) => Vector3::zeros(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    

    #[test]
    fn flat_patch_normal_is_perpendicular_to_plane() {
        let mut points = Vec::new();
        for x in -2..=2 {
            for y in -2..=2 {
                points.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        let normals = estimate_normals(&points, 3.0, 30);
        let center_idx = points
            .iter()
            .position(|p| *p == Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        let n = normals[center_idx];
        assert!(n.z.abs() > 0.9);
    }

    #[test]
    fn isolated_point_gets_zero_normal() {
        let points = vec![Point3::origin(), Point3::new(1000.0, 1000.0, 1000.0)];
        let normals = estimate_normals(&points, 1.0, 30);
        assert!(normals.iter().all(|n| n.norm() == 0.0));
    }
}
