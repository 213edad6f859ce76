use nalgebra::{Point3, Vector3};
use rand::seq::index::sample;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use types::Mesh;

/// Draws `min(n, |V|)` vertex indices without replacement from `mesh`,
/// seeded by `seed` so repeated calls with the same inputs are identical.
/// Returns `(points, normals, indices)`; when the mesh has no normals (or a
/// mismatched count) the returned normals are all zero.
pub fn sample_points_with_normals(
    mesh: &Mesh,
    n: usize,
    seed: u64,
) -> (Vec<Point3<f32>>, Vec<Vector3<f32>>, Vec<usize>) {
    if mesh.is_empty() || n == 0 {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    let count = n.min(mesh.len());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = sample(&mut rng, mesh.len(), count).into_vec();
    indices.sort_unstable();

    let points: Vec<Point3<f32>> = indices.iter().map(|&i| mesh.vertices()[i]).collect();
    let normals: Vec<Vector3<f32>> = indices.iter().map(|&i| mesh.normal_at(i)).collect();
    (points, normals, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn triangle_mesh() -> Mesh {
        let verts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        Mesh::new(verts, None, None).unwrap()
    }

    #[test]
    fn sampling_is_deterministic_for_fixed_seed() {
        let mesh = triangle_mesh();
        let (p1, _, i1) = sample_points_with_normals(&mesh, 2, 11);
        let (p2, _, i2) = sample_points_with_normals(&mesh, 2, 11);
        assert_eq!(i1, i2);
        assert_eq!(p1, p2);
    }

    #[test]
    fn sampling_caps_at_vertex_count() {
        let mesh = triangle_mesh();
        let (points, normals, indices) = sample_points_with_normals(&mesh, 100, 11);
        assert_eq!(points.len(), mesh.len());
        assert_eq!(normals.len(), mesh.len());
        assert_eq!(indices.len(), mesh.len());
    }

    #[test]
    fn empty_mesh_yields_empty_sample() {
        let mesh = Mesh::new(Vec::new(), None, None).unwrap();
        let (points, normals, indices) = sample_points_with_normals(&mesh, 5, 11);
        assert!(points.is_empty() && normals.is_empty() && indices.is_empty());
    }

    #[test]
    fn missing_normals_are_zero() {
        let mesh = triangle_mesh();
        let (_, normals, _) = sample_points_with_normals(&mesh, 3, 11);
        assert!(normals.iter().all(|n| n.norm() == 0.0));
    }
}
