use itertools::Itertools;
use nalgebra::Point3;
use rand::seq::index::sample;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use transform::kabsch;
use types::config::seeds as named_seeds;
use types::{EngineError, EngineResult, RigidTransform};

const INLIER_THRESHOLD: f32 = 5.0;
const EXHAUSTIVE_MAX_LANDMARKS: usize = 7;
const RANDOM_TRIPLET_ATTEMPTS: usize = 120;
const MIN_REFIT_INLIERS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ManualRegistrationReport {
    pub rmse: f32,
    pub inlier_rmse: f32,
    pub inlier_count: usize,
    pub total_points: usize,
}

/// Manual landmark registration (§4.7): for `n in [3, 7]` tries every triplet
/// exhaustively; for `n > 7` draws up to 120 random unique triplets (seeded).
/// Each triplet is Kabsch-fit, then scored by `(inlier_count, -median(residual))`
/// over all points at a 5mm threshold. The best triplet's inliers are
/// refit if there are at least 3, otherwise the triplet fit stands.
pub fn manual_register(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
) -> EngineResult<(RigidTransform, ManualRegistrationReport)> {
    if source.len() != target.len() {
        return Err(EngineError::InputMissing(format!(
            "manual registration point count mismatch: {} vs {}",
            source.len(),
            target.len()
        )));
    }
    if source.len() < 3 {
        return Err(EngineError::DegenerateInput(format!(
            "manual registration requires at least 3 landmark pairs, got {}",
            source.len()
        )));
    }

    let triplets = candidate_triplets(source.len());
    let mut best: Option<(RigidTransform, usize, f32)> = None;

    for triplet in triplets {
        let src_tri: Vec<Point3<f32>> = triplet.iter().map(|&i| source[i]).collect();
        let dst_tri: Vec<Point3<f32>> = triplet.iter().map(|&i| target[i]).collect();
        let Ok(candidate) = kabsch(&src_tri, &dst_tri) else {
            continue;
        };

        let mut residuals: Vec<f32> = source
            .iter()
            .zip(target.iter())
            .map(|(s, t)| (candidate.apply_point(s) - t).norm())
            .collect();
        let inlier_count = residuals.iter().filter(|&&r| r <= INLIER_THRESHOLD).count();
        residuals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = percentile(&residuals, 0.5);

        let better = best
            .as_ref()
            .map(|&(_, n, m)| inlier_count > n || (inlier_count == n && median < m))
            .unwrap_or(true);
        if better {
            best = Some((candidate, inlier_count, median));
        }
    }

    let (best_transform, _, _) = best.ok_or_else(|| {
        EngineError::NumericalFailure("manual registration found no valid triplet fit".into())
    })?;

    let residuals_all: Vec<f32> = source
        .iter()
        .zip(target.iter())
        .map(|(s, t)| (best_transform.apply_point(s) - t).norm())
        .collect();
    let inlier_indices: Vec<usize> = residuals_all
        .iter()
        .enumerate()
        .filter(|(_, &r)| r <= INLIER_THRESHOLD)
        .map(|(i, _)| i)
        .collect();

    let final_transform = if inlier_indices.len() >= MIN_REFIT_INLIERS {
        let src_in: Vec<Point3<f32>> = inlier_indices.iter().map(|&i| source[i]).collect();
        let dst_in: Vec<Point3<f32>> = inlier_indices.iter().map(|&i| target[i]).collect();
        kabsch(&src_in, &dst_in).unwrap_or(best_transform)
    } else {
        best_transform
    };

    let residuals_final: Vec<f32> = source
        .iter()
        .zip(target.iter())
        .map(|(s, t)| (final_transform.apply_point(s) - t).norm())
        .collect();
    let inlier_residuals: Vec<f32> = residuals_final
        .iter()
        .copied()
        .filter(|&r| r <= INLIER_THRESHOLD)
        .collect();

    let rmse = rms(&residuals_final);
    let inlier_rmse = if inlier_residuals.is_empty() {
        rmse
    } else {
        rms(&inlier_residuals)
    };

    Ok((
        final_transform,
        ManualRegistrationReport {
            rmse,
            inlier_rmse,
            inlier_count: inlier_residuals.len(),
            total_points: source.len(),
        },
    ))
}

fn candidate_triplets(n: usize) -> Vec<[usize; 3]> {
    if n <= EXHAUSTIVE_MAX_LANDMARKS {
        return (0..n)
            .combinations(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(named_seeds::MANUAL_TRIPLET_RANSAC);
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(RANDOM_TRIPLET_ATTEMPTS);
    for _ in 0..RANDOM_TRIPLET_ATTEMPTS {
        let mut triplet: Vec<usize> = sample(&mut rng, n, 3).into_vec();
        triplet.sort_unstable();
        let key = (triplet[0], triplet[1], triplet[2]);
        if seen.insert(key) {
            out.push([triplet[0], triplet[1], triplet[2]]);
        }
    }
    out
}

fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn rms(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f32>() / values.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use pretty_assertions::assert_eq;

    fn landmarks() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(10.0, 10.0, 0.0),
        ]
    }

    #[test]
    fn recovers_pure_translation() {
        let source = landmarks();
        let shift = Vector3::new(3.0, -2.0, 1.0);
        let target: Vec<Point3<f32>> = source.iter().map(|p| p + shift).collect();
        let (transform, report) = manual_register(&source, &target).unwrap();
        assert!((transform.translation - shift).norm() < 1e-3);
        assert_eq!(report.inlier_count, 5);
        assert!(report.rmse < 1e-3);
    }

    #[test]
    fn rejects_outlier_landmark_via_triplet_selection() {
        let source = landmarks();
        let shift = Vector3::new(5.0, 0.0, 0.0);
        let mut target: Vec<Point3<f32>> = source.iter().map(|p| p + shift).collect();
        let last = target.len() - 1;
        target[last] += Vector3::new(200.0, 150.0, 0.0);

        let (transform, report) = manual_register(&source, &target).unwrap();
        assert!((transform.translation - shift).norm() < 1.0);
        assert_eq!(report.inlier_count, 4);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let source = landmarks();
        let target = vec![Point3::origin(); 3];
        assert!(matches!(
            manual_register(&source, &target),
            Err(EngineError::InputMissing(_))
        ));
    }

    #[test]
    fn too_few_landmarks_rejected() {
        let pts = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(matches!(
            manual_register(&pts, &pts),
            Err(EngineError::DegenerateInput(_))
        ));
    }
}
