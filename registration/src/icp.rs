use geometry::{knn_batch, nearest};
use nalgebra::{Matrix6, Point3, Rotation3, Vector3, Vector6};
use transform::kabsch;
use types::{EngineError, EngineResult, QualityReport, RigidTransform};

/// Thresholds `{6v, 3v, 1.5v}` and max iterations `{120, 160, 220}` (§4.5).
const STAGE_THRESHOLD_FACTORS: [f32; 3] = [6.0, 3.0, 1.5];
const STAGE_MAX_ITERS: [usize; 3] = [120, 160, 220];

fn point_to_point_step(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    current: &RigidTransform,
    threshold: f32,
) -> Option<RigidTransform> {
    let transformed = current.apply_points(source);
    let matches = knn_batch(target, &transformed, 1);

    let mut src_inliers = Vec::new();
    let mut dst_inliers = Vec::new();
    for (i, m) in matches.iter().enumerate() {
        if let Some(&(tgt_idx, dist)) = m.first() {
            if dist <= threshold {
                src_inliers.push(source[i]);
                dst_inliers.push(target[tgt_idx]);
            }
        }
    }
    kabsch(&src_inliers, &dst_inliers).ok()
}

fn point_to_plane_step(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    target_normals: &[Vector3<f32>],
    current: &RigidTransform,
    threshold: f32,
) -> Option<RigidTransform> {
    let transformed = current.apply_points(source);
    let matches = knn_batch(target, &transformed, 1);

    let mut h = Matrix6::zeros();
    let mut b = Vector6::zeros();
    let mut count = 0usize;

    for (p, m) in transformed.iter().zip(matches.iter()) {
        let Some(&(tgt_idx, dist)) = m.first() else {
            continue;
        };
        if dist > threshold {
            continue;
        }
        let q = target[tgt_idx];
        let n = target_normals[tgt_idx];
        if n.norm() < f32::EPSILON {
            continue;
        }
        let n = n.normalize();
        let cross = p.coords.cross(&n);
        let j = Vector6::new(cross.x, cross.y, cross.z, n.x, n.y, n.z);
        let residual = (p - q).dot(&n);
        h += j * j.transpose();
        b += j * (-residual);
        count += 1;
    }

    if count < 6 {
        return None;
    }
    let x = h.lu().solve(&b)?;
    let omega = Vector3::new(x[0], x[1], x[2]);
    let delta_translation = Vector3::new(x[3], x[4], x[5]);
    let delta_rotation = *Rotation3::new(omega).matrix();
    let delta = RigidTransform::new(delta_rotation, delta_translation);
    Some(delta.compose(current))
}

/// Runs one ICP stage to convergence (max `max_iters`), returning the final
/// transform. Falls back to `initial` if the very first step has no inliers.
/// Short point-to-point ICP used for fast candidate ranking before the full
/// multi-scale refinement (§4.6 step 5: "40 iters, dist=8v").
pub fn quick_icp(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    initial: RigidTransform,
    threshold: f32,
    max_iters: usize,
) -> RigidTransform {
    run_stage(source, target, None, initial, threshold, max_iters, false)
}

fn run_stage(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    target_normals: Option<&[Vector3<f32>]>,
    initial: RigidTransform,
    threshold: f32,
    max_iters: usize,
    point_to_plane: bool,
) -> RigidTransform {
    let mut current = initial;
    for _ in 0..max_iters {
        let next = if point_to_plane {
            target_normals.and_then(|tn| point_to_plane_step(source, target, tn, &current, threshold))
        } else {
            point_to_point_step(source, target, &current, threshold)
        };
        match next {
            Some(updated) => {
                let delta = (updated.translation - current.translation).norm();
                current = updated;
                if delta < 1e-6 {
                    break;
                }
            }
            None => break,
        }
    }
    current
}

/// Multi-scale ICP (§4.5): three stages, point-to-point for the first two,
/// point-to-plane for the last (projects onto the target's tangent plane, so
/// only target normals are required — falls back to point-to-point if the
/// target has none).
pub fn multi_scale_icp(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    target_normals: Option<&[Vector3<f32>]>,
    voxel_size: f32,
    initial: RigidTransform,
) -> RigidTransform {
    let mut current = initial;
    for (stage, (&factor, &max_iters)) in STAGE_THRESHOLD_FACTORS
        .iter()
        .zip(STAGE_MAX_ITERS.iter())
        .enumerate()
    {
        let threshold = factor * voxel_size;
        let use_plane = stage == 2 && target_normals.is_some();
        current = run_stage(source, target, target_normals, current, threshold, max_iters, use_plane);
    }
    current
}

fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Symmetric alignment quality (§4.5 "Symmetric quality"): both `d(src->dst)`
/// and `d(dst->src)` contribute to every statistic.
pub fn compute_quality_report(
    source_transformed: &[Point3<f32>],
    target: &[Point3<f32>],
    voxel_size: f32,
) -> QualityReport {
    if source_transformed.is_empty() || target.is_empty() {
        return QualityReport::degenerate();
    }
    let inlier_threshold = (1.5 * voxel_size).max(1.0);

    let fwd: Vec<f32> = source_transformed
        .iter()
        .filter_map(|p| nearest(target, p).map(|(_, d)| d))
        .collect();
    let bwd: Vec<f32> = target
        .iter()
        .filter_map(|p| nearest(source_transformed, p).map(|(_, d)| d))
        .collect();

    let mut fwd_sorted = fwd.clone();
    fwd_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut bwd_sorted = bwd.clone();
    bwd_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let median_fwd = percentile(&fwd_sorted, 0.5);
    let median_bwd = percentile(&bwd_sorted, 0.5);
    let p90_fwd = percentile(&fwd_sorted, 0.9);
    let p90_bwd = percentile(&bwd_sorted, 0.9);
    let mean_fwd = fwd.iter().sum::<f32>() / fwd.len() as f32;
    let mean_bwd = bwd.iter().sum::<f32>() / bwd.len() as f32;

    let median_sym = (median_fwd + median_bwd) / 2.0;
    let p90_sym = (p90_fwd + p90_bwd) / 2.0;
    let mean_sym = (mean_fwd + mean_bwd) / 2.0;

    let rmse = (fwd.iter().map(|d| d * d).sum::<f32>() / fwd.len() as f32).sqrt();
    let fitness = fwd.iter().filter(|&&d| d <= inlier_threshold).count() as f32 / fwd.len() as f32;
    let overlap_fwd = fwd.iter().filter(|&&d| d <= inlier_threshold).count() as f32 / fwd.len() as f32;
    let overlap_bwd = bwd.iter().filter(|&&d| d <= inlier_threshold).count() as f32 / bwd.len() as f32;
    let overlap = (overlap_fwd + overlap_bwd) / 2.0;

    let src_centroid = source_transformed
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / source_transformed.len() as f32;
    let tgt_centroid = target.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / target.len() as f32;
    let center_dist = (src_centroid - tgt_centroid).norm();

    QualityReport {
        rmse,
        fitness,
        overlap,
        center_dist,
        median_sym,
        p90_sym,
        mean_sym,
    }
}

/// Lower is better (§4.5 "Composite score").
pub fn composite_score(report: &QualityReport) -> f32 {
    let numerator = 0.35 * report.median_sym + 0.45 * report.p90_sym + 0.20 * report.rmse;
    let denom = report.overlap.max(1e-3).powf(1.2) * report.fitness.max(1e-2).powf(0.25);
    numerator / denom + 0.08 * report.center_dist
}

/// §4.5 "Degeneracy rejection": `true` means the candidate must be discarded.
pub fn is_degenerate(report: &QualityReport, roi_extent: f32) -> bool {
    report.fitness < 0.02
        || report.overlap < 0.05
        || report.center_dist > (roi_extent * 0.8).max(60.0)
        || (report.rmse < 1e-6 && report.median_sym > 3.0)
}

/// One multi-seed candidate's outcome.
#[derive(Debug, Clone)]
pub struct SeedOutcome {
    pub seed_index: usize,
    pub transform: RigidTransform,
    pub report: QualityReport,
    pub valid: bool,
}

/// Runs multi-scale ICP from every seed in `seeds`, retaining the candidate
/// minimizing the composite score among valid ones; ties broken by
/// `rmse` then seed index (§4.5 "Multi-seed selection"). Point-to-plane
/// (stage 3) only needs a normal on the side being projected onto — the
/// target — so `source` contributes points only, never normals.
pub fn multi_seed_icp(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    target_normals: Option<&[Vector3<f32>]>,
    seeds: &[RigidTransform],
    voxel_size: f32,
    roi_extent: f32,
) -> EngineResult<SeedOutcome> {
    if seeds.is_empty() {
        return Err(EngineError::DegenerateInput("no seeds provided to multi-seed ICP".into()));
    }

    let outcomes: Vec<SeedOutcome> = seeds
        .iter()
        .enumerate()
        .map(|(seed_index, seed)| {
            let transform = multi_scale_icp(source, target, target_normals, voxel_size, *seed);
            let transformed = transform.apply_points(source);
            let report = compute_quality_report(&transformed, target, voxel_size);
            let valid = !is_degenerate(&report, roi_extent);
            SeedOutcome {
                seed_index,
                transform,
                report,
                valid,
            }
        })
        .collect();

    outcomes
        .into_iter()
        .min_by(|a, b| {
            let sa = (!a.valid, composite_score(&a.report) * 1000.0, a.report.rmse, a.seed_index);
            let sb = (!b.valid, composite_score(&b.report) * 1000.0, b.report.rmse, b.seed_index);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or_else(|| EngineError::NumericalFailure("multi-seed ICP produced no candidates".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cube_cloud() -> Vec<Point3<f32>> {
        let mut pts = Vec::new();
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    pts.push(Point3::new(x as f32, y as f32, z as f32));
                }
            }
        }
        pts
    }

    #[test]
    fn multi_scale_icp_recovers_small_translation() {
        let source = cube_cloud();
        let shift = Vector3::new(0.2, 0.0, 0.0);
        let target: Vec<Point3<f32>> = source.iter().map(|p| p + shift).collect();
        let result = multi_scale_icp(&source, &target, None, 0.5, RigidTransform::identity());
        assert!((result.translation - shift).norm() < 0.1);
    }

    #[test]
    fn identical_clouds_score_near_zero() {
        let pts = cube_cloud();
        let report = compute_quality_report(&pts, &pts, 0.5);
        assert!(report.rmse < 1e-4);
        assert!(report.fitness > 0.99);
    }

    #[test]
    fn empty_target_is_degenerate_quality() {
        let report = compute_quality_report(&cube_cloud(), &[], 0.5);
        assert_eq!(report, QualityReport::degenerate());
    }

    #[test]
    fn degeneracy_rejects_low_fitness() {
        let mut report_ok = QualityReport::degenerate();
        report_ok.fitness = 0.5;
        report_ok.overlap = 0.5;
        report_ok.center_dist = 1.0;
        report_ok.rmse = 0.5;
        report_ok.median_sym = 0.5;
        assert!(!is_degenerate(&report_ok, 100.0));

        let mut report_bad = report_ok;
        report_bad.fitness = 0.01;
        assert!(is_degenerate(&report_bad, 100.0));
    }

    #[test]
    fn multi_seed_icp_prefers_lower_composite_score() {
        let source = cube_cloud();
        let target = source.clone();
        let seeds = vec![RigidTransform::identity(), RigidTransform::translation_only(Vector3::new(50.0, 0.0, 0.0))];
        let outcome = multi_seed_icp(&source, &target, None, &seeds, 0.5, 10.0).unwrap();
        assert_eq!(outcome.seed_index, 0);
    }
}
