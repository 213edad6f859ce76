use crate::fpfh::feature_distance;
use nalgebra::Point3;
use rand::seq::index::sample;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use transform::kabsch;
use types::{EngineError, EngineResult, RigidTransform, FEATURE_DIM};

const MAX_RANSAC_ITERATIONS: usize = 4_000_000;
const MAX_VALIDATION_ATTEMPTS: usize = 500;
const EDGE_LENGTH_RATIO_MIN: f32 = 0.9;

/// Nearest-feature correspondence candidates: for each source point, its
/// closest target point in FPFH feature space. This is the candidate pool
/// RANSAC draws its 4-point samples from (§4.4 step 4).
fn feature_correspondences(
    source_features: &[[f32; FEATURE_DIM]],
    target_features: &[[f32; FEATURE_DIM]],
) -> Vec<usize> {
    source_features
        .iter()
        .map(|sf| {
            target_features
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    feature_distance(sf, a)
                        .partial_cmp(&feature_distance(sf, b))
                        .unwrap()
                })
                .map(|(idx, _)| idx)
                .unwrap_or(0)
        })
        .collect()
}

fn edge_length_ratio_ok(src_quad: &[Point3<f32>; 4], dst_quad: &[Point3<f32>; 4]) -> bool {
    for i in 0..4 {
        for j in (i + 1)..4 {
            let src_len = (src_quad[i] - src_quad[j]).norm();
            let dst_len = (dst_quad[i] - dst_quad[j]).norm();
            if src_len < f32::EPSILON || dst_len < f32::EPSILON {
                continue;
            }
            let ratio = (src_len / dst_len).min(dst_len / src_len);
            if ratio < EDGE_LENGTH_RATIO_MIN {
                return false;
            }
        }
    }
    true
}

fn count_inliers(
    transform: &RigidTransform,
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    correspondences: &[usize],
    distance_threshold: f32,
) -> usize {
    source
        .iter()
        .zip(correspondences.iter())
        .filter(|(p, &tgt_idx)| {
            let transformed = transform.apply_point(p);
            (transformed - target[tgt_idx]).norm() <= distance_threshold
        })
        .count()
}

/// RANSAC-based global registration from feature matching (§4.4 steps 4-5).
/// Draws 4-point correspondences, checks edge-length ratio and correspondence
/// distance, and keeps the transform with the most inliers over up to
/// `MAX_RANSAC_ITERATIONS` draws or `MAX_VALIDATION_ATTEMPTS` candidates that
/// pass the cheap checkers, whichever comes first.
pub fn global_feature_ransac(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    source_features: &[[f32; FEATURE_DIM]],
    target_features: &[[f32; FEATURE_DIM]],
    voxel_size: f32,
    seed: u64,
) -> EngineResult<(RigidTransform, f32, f32)> {
    if source.len() < 4 || target.len() < 4 {
        return Err(EngineError::DegenerateInput(
            "global registration requires at least 4 points per side".into(),
        ));
    }
    let distance_threshold = voxel_size * 1.5;
    let correspondences = feature_correspondences(source_features, target_features);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut best: Option<(RigidTransform, usize)> = None;
    let mut validation_attempts = 0usize;

    for _ in 0..MAX_RANSAC_ITERATIONS {
        if validation_attempts >= MAX_VALIDATION_ATTEMPTS {
            break;
        }
        let quad_idx: Vec<usize> = sample(&mut rng, source.len(), 4).into_vec();
        let src_quad: [Point3<f32>; 4] = [
            source[quad_idx[0]],
            source[quad_idx[1]],
            source[quad_idx[2]],
            source[quad_idx[3]],
        ];
        let dst_quad: [Point3<f32>; 4] = [
            target[correspondences[quad_idx[0]]],
            target[correspondences[quad_idx[1]]],
            target[correspondences[quad_idx[2]]],
            target[correspondences[quad_idx[3]]],
        ];
        if !edge_length_ratio_ok(&src_quad, &dst_quad) {
            continue;
        }
        let max_corr_dist = src_quad
            .iter()
            .zip(dst_quad.iter())
            .map(|(s, d)| (s - d).norm())
            .fold(0.0_f32, f32::max);
        if max_corr_dist > distance_threshold * 4.0 {
            continue;
        }
        validation_attempts += 1;

        let Ok(candidate) = kabsch(&src_quad, &dst_quad) else {
            continue;
        };
        let inliers = count_inliers(&candidate, source, target, &correspondences, distance_threshold);
        if best.as_ref().map(|(_, n)| inliers > *n).unwrap_or(true) {
            best = Some((candidate, inliers));
        }
    }

    let (transform, inlier_count) = best.ok_or_else(|| {
        EngineError::NumericalFailure("global RANSAC produced no valid candidate".into())
    })?;
    let fitness = inlier_count as f32 / source.len() as f32;
    let rmse = source
        .iter()
        .zip(correspondences.iter())
        .map(|(p, &idx)| (transform.apply_point(p) - target[idx]).norm_squared())
        .sum::<f32>()
        .sqrt()
        / (source.len() as f32).sqrt();
    Ok((transform, fitness, rmse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    

    fn cube_cloud() -> Vec<Point3<f32>> {
        let mut pts = Vec::new();
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..3 {
                    pts.push(Point3::new(x as f32, y as f32, z as f32));
                }
            }
        }
        pts
    }

    #[test]
    fn recovers_translation_with_matching_features() {
        let source = cube_cloud();
        let shift = Vector3::new(2.0, 0.0, 0.0);
        let target: Vec<Point3<f32>> = source.iter().map(|p| p + shift).collect();
        let features: Vec<[f32; FEATURE_DIM]> = source
            .iter()
            .map(|p| {
                let mut f = [0.0; FEATURE_DIM];
                f[0] = p.x;
                f[1] = p.y;
                f[2] = p.z;
                f
            })
            .collect();
        let (transform, fitness, _) =
            global_feature_ransac(&source, &target, &features, &features, 0.5, 42).unwrap();
        assert!((transform.translation - shift).norm() < 0.5);
        assert!(fitness > 0.5);
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let pts = vec![Point3::origin(); 2];
        let feats = vec![[0.0; FEATURE_DIM]; 2];
        assert!(matches!(
            global_feature_ransac(&pts, &pts, &feats, &feats, 0.5, 42),
            Err(EngineError::DegenerateInput(_))
        ));
    }
}
