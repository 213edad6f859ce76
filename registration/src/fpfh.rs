use geometry::KdTree;
use nalgebra::{Point3, Vector3};
use types::FEATURE_DIM;

const BINS_PER_FEATURE: usize = FEATURE_DIM / 3;

/// Fast Point Feature Histogram (§4.4 step 3): a 33-dim descriptor per point
/// built from the simplified point feature histogram (SPFH) of each point
/// and a distance-weighted sum of its neighbours' SPFH.
pub fn compute_fpfh(
    points: &[Point3<f32>],
    normals: &[Vector3<f32>],
    radius: f32,
    max_nn: usize,
) -> Vec<[f32; FEATURE_DIM]> {
    if points.is_empty() {
        return Vec::new();
    }
    let tree = KdTree::build(points.to_vec());
    let neighbor_lists: Vec<Vec<(usize, f32)>> = points
        .iter()
        .map(|p| {
            let mut n = tree.within_radius(p, radius);
            n.truncate(max_nn);
            n
        })
        .collect();

    let spfh: Vec<[f32; FEATURE_DIM]> = points
        .iter()
        .enumerate()
        .map(|(i, p)| spfh_at(*p, normals[i], &neighbor_lists[i], points, normals))
        .collect();

    (0..points.len())
        .map(|i| {
            let neighbors = &neighbor_lists[i];
            if neighbors.len() <= 1 {
                return spfh[i];
            }
            let mut weighted = [0.0f32; FEATURE_DIM];
            let mut weight_sum = 0.0f32;
            for &(j, dist) in neighbors {
                if j == i || dist < f32::EPSILON {
                    continue;
                }
                let w = 1.0 / dist;
                for d in 0..FEATURE_DIM {
                    weighted[d] += spfh[j][d] * w;
                }
                weight_sum += w;
            }
            let mut out = spfh[i];
            if weight_sum > 0.0 {
                for d in 0..FEATURE_DIM {
                    out[d] += weighted[d] / weight_sum;
                }
            }
            out
        })
        .collect()
}

fn spfh_at(
    p: Point3<f32>,
    np: Vector3<f32>,
    neighbors: &[(usize, f32)],
    points: &[Point3<f32>],
    normals: &[Vector3<f32>],
) -> [f32; FEATURE_DIM] {
    let mut alpha_hist = [0.0f32; BINS_PER_FEATURE];
    let mut phi_hist = [0.0f32; BINS_PER_FEATURE];
    let mut theta_hist = [0.0f32; BINS_PER_FEATURE];
    if np.norm() < f32::EPSILON {
        return [0.0; FEATURE_DIM];
    }
    let u = np.normalize();
    let mut count = 0usize;

    for &(idx, dist) in neighbors {
        let q = points[idx];
        if dist < f32::EPSILON {
            continue;
        }
        let nq = normals[idx];
        if nq.norm() < f32::EPSILON {
            continue;
        }
        let diff = (q - p) / dist;
        let v = u.cross(&diff);
        if v.norm() < f32::EPSILON {
            continue;
        }
        let v = v.normalize();
        let w = u.cross(&v);

        let alpha = v.dot(&nq);
        let phi = u.dot(&diff);
        let theta = w.dot(&nq).atan2(u.dot(&nq));

        bump(&mut alpha_hist, alpha, -1.0, 1.0);
        bump(&mut phi_hist, phi, -1.0, 1.0);
        bump(&mut theta_hist, theta, -std::f32::consts::PI, std::f32::consts::PI);
        count += 1;
    }

    if count > 0 {
        for h in [&mut alpha_hist, &mut phi_hist, &mut theta_hist] {
            for v in h.iter_mut() {
                *v /= count as f32;
            }
        }
    }

    let mut out = [0.0f32; FEATURE_DIM];
    out[..BINS_PER_FEATURE].copy_from_slice(&alpha_hist);
    out[BINS_PER_FEATURE..2 * BINS_PER_FEATURE].copy_from_slice(&phi_hist);
    out[2 * BINS_PER_FEATURE..3 * BINS_PER_FEATURE].copy_from_slice(&theta_hist);
    out
}

fn bump(hist: &mut [f32; BINS_PER_FEATURE], value: f32, lo: f32, hi: f32) {
    let t = ((value - lo) / (hi - lo)).clamp(0.0, 0.999_999);
    let bin = (t * BINS_PER_FEATURE as f32) as usize;
    hist[bin.min(BINS_PER_FEATURE - 1)] += 1.0;
}

/// Euclidean distance between two FPFH descriptors, used for feature
/// matching during global registration.
pub fn feature_distance(a: &[f32; FEATURE_DIM], b: &[f32; FEATURE_DIM]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flat_patch_yields_nonzero_feature_with_neighbors() {
        let mut points = Vec::new();
        for x in -2..=2 {
            for y in -2..=2 {
                points.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        let normals = vec![Vector3::z(); points.len()];
        let features = compute_fpfh(&points, &normals, 3.0, 30);
        assert_eq!(features.len(), points.len());
        assert!(features.iter().any(|f| f.iter().any(|&v| v != 0.0)));
    }

    #[test]
    fn identical_points_have_zero_feature_distance() {
        let f = [0.5f32; FEATURE_DIM];
        assert_eq!(feature_distance(&f, &f), 0.0);
    }
}
