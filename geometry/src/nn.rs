use crate::kdtree::KdTree;
use crate::sampling::sample_points_with_normals;
use nalgebra::Point3;
use rayon::prelude::*;
use types::config::seeds;
use types::Mesh;

const BRUTE_FORCE_CHUNK: usize = 512;
const FALLBACK_SAMPLE_CAP: usize = 18_000;
/// Above this many reference points a KD-tree pays for its own construction;
/// below it, chunked brute force is simpler and just as fast (§5).
const KD_TREE_THRESHOLD: usize = 10_000;

/// k-NN lookup against `reference`, choosing a KD-tree or chunked brute force
/// depending on `reference`'s size (§5). Returns `(index_into_reference,
/// distance)` per query point, one `Vec` per query.
pub fn knn_batch(reference: &[Point3<f32>], queries: &[Point3<f32>], k: usize) -> Vec<Vec<(usize, f32)>> {
    if reference.len() > KD_TREE_THRESHOLD {
        let tree = KdTree::build(reference.to_vec());
        queries.par_iter().map(|q| tree.knn(q, k)).collect()
    } else {
        queries
            .par_iter()
            .map(|q| brute_force_knn(reference, q, k))
            .collect()
    }
}

/// Single-point convenience wrapper over [`knn_batch`] for `k = 1`.
pub fn nearest(reference: &[Point3<f32>], query: &Point3<f32>) -> Option<(usize, f32)> {
    if reference.len() > KD_TREE_THRESHOLD {
        KdTree::build(reference.to_vec()).nearest(query)
    } else {
        brute_force_knn(reference, query, 1).into_iter().next()
    }
}

pub fn radius_batch(reference: &[Point3<f32>], queries: &[Point3<f32>], radius: f32) -> Vec<Vec<(usize, f32)>> {
    if reference.len() > KD_TREE_THRESHOLD {
        let tree = KdTree::build(reference.to_vec());
        queries.par_iter().map(|q| tree.within_radius(q, radius)).collect()
    } else {
        queries
            .par_iter()
            .map(|q| brute_force_radius(reference, q, radius))
            .collect()
    }
}

fn brute_force_knn(reference: &[Point3<f32>], query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
    let mut all: Vec<(usize, f32)> = reference
        .chunks(BRUTE_FORCE_CHUNK)
        .enumerate()
        .flat_map(|(chunk_idx, chunk)| {
            chunk.iter().enumerate().map(move |(i, p)| {
                (chunk_idx * BRUTE_FORCE_CHUNK + i, (p - query).norm())
            })
        })
        .collect();
    all.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    all.truncate(k);
    all
}

fn brute_force_radius(reference: &[Point3<f32>], query: &Point3<f32>, radius: f32) -> Vec<(usize, f32)> {
    let mut hits: Vec<(usize, f32)> = reference
        .chunks(BRUTE_FORCE_CHUNK)
        .enumerate()
        .flat_map(|(chunk_idx, chunk)| {
            chunk.iter().enumerate().filter_map(move |(i, p)| {
                let d = (p - query).norm();
                (d <= radius).then_some((chunk_idx * BRUTE_FORCE_CHUNK + i, d))
            })
        })
        .collect();
    hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    hits
}

/// Closest point on the surface of `mesh` to each of `query_pts`: returns
/// `(closest_point, distance, triangle_id)`. When `mesh` has no triangles,
/// falls back to nearest-vertex of an up-to-18 000-point deterministic
/// sample, chunked to cap peak memory (§4.1 edge case).
pub fn closest_point_on_mesh(mesh: &Mesh, query_pts: &[Point3<f32>]) -> Vec<(Point3<f32>, f32, Option<u32>)> {
    match mesh.triangles() {
        Some(triangles) if !triangles.is_empty() => query_pts
            .par_iter()
            .map(|q| closest_point_on_triangles(mesh.vertices(), triangles, q))
            .collect(),
        _ => {
            let (sample_pts, _, sample_indices) =
                sample_points_with_normals(mesh, FALLBACK_SAMPLE_CAP, seeds::NN_FALLBACK_SAMPLE);
            query_pts
                .par_iter()
                .map(|q| {
                    let (local_idx, dist) = nearest(&sample_pts, q).unwrap_or((0, f32::INFINITY));
                    let point = sample_pts.get(local_idx).copied().unwrap_or(*q);
                    let original_idx = sample_indices.get(local_idx).map(|&i| i as u32);
                    (point, dist, original_idx)
                })
                .collect()
        }
    }
}

fn closest_point_on_triangles(
    vertices: &[Point3<f32>],
    triangles: &[[u32; 3]],
    query: &Point3<f32>,
) -> (Point3<f32>, f32, Option<u32>) {
    let mut best_point = *query;
    let mut best_dist = f32::INFINITY;
    let mut best_tri = None;
    for (tri_id, tri) in triangles.iter().enumerate() {
        let a = vertices[tri[0] as usize];
        let b = vertices[tri[1] as usize];
        let c = vertices[tri[2] as usize];
        let p = closest_point_on_triangle(a, b, c, *query);
        let d = (p - query).norm();
        if d < best_dist {
            best_dist = d;
            best_point = p;
            best_tri = Some(tri_id as u32);
        }
    }
    (best_point, best_dist, best_tri)
}

/// Classic Ericson-style closest point on a triangle via barycentric region tests.
fn closest_point_on_triangle(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>, p: Point3<f32>) -> Point3<f32> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nearest_finds_self_for_identical_points() {
        let reference = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)];
        let (idx, dist) = nearest(&reference, &Point3::new(5.0, 0.0, 0.0)).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn closest_point_on_triangle_interior() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let query = Point3::new(0.25, 0.25, 1.0);
        let cp = closest_point_on_triangle(a, b, c, query);
        assert!((cp.z).abs() < 1e-6);
    }

    #[test]
    fn closest_point_on_mesh_uses_triangles_when_present() {
        let verts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh = Mesh::new(verts, Some(vec![[0, 1, 2]]), None).unwrap();
        let results = closest_point_on_mesh(&mesh, &[Point3::new(0.1, 0.1, 1.0)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].2, Some(0));
    }

    #[test]
    fn closest_point_on_mesh_falls_back_without_triangles() {
        let verts = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        let mesh = Mesh::new(verts, None, None).unwrap();
        let results = closest_point_on_mesh(&mesh, &[Point3::new(9.0, 0.0, 0.0)]);
        assert_eq!(results[0].0, Point3::new(10.0, 0.0, 0.0));
    }
}
