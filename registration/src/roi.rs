use crate::fpfh::compute_fpfh;
use crate::icp::{compute_quality_report, composite_score, is_degenerate, multi_seed_icp, quick_icp};
use crate::normals::estimate_normals;
use crate::ransac::global_feature_ransac;
use crate::voxel::{voxel_downsample, voxel_size_for};
use nalgebra::{Point3, Vector3};
use tracing::warn;
use transform::{local_centroid_seeds, pca_euler_seeds, pca_frame, uniform_stride_cap};
use types::config::seeds as named_seeds;
use types::{EngineConfig, EngineError, EngineResult, GeomSource, QualityGate, QualityReport, RigidTransform};

/// Minimum ROI size before falling back to the full mesh (§4.6 "ROI policy").
const MIN_ROI_POINTS: usize = 200;
const MAX_ROI_SAMPLE: usize = 1_000;
const CANDIDATE_CAP: usize = 96;
const FAST_RANK_TOP_K: usize = 12;
const FAST_RANK_ITERS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrealignMode {
    None,
    Center,
    Front,
}

#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub prealign: PrealignMode,
    pub roi_radius: f32,
    pub z_bias: f32,
}

/// Picks the face/jaw roles by relative extent (§4.6 "ROI policy"): the mesh
/// at least 1.5x the other's extent is the "face" (larger, ROI host); the
/// other is the "jaw" (smaller, ROI query source).
pub fn is_partial_overlap(a_extent: f32, b_extent: f32) -> bool {
    let (lo, hi) = if a_extent < b_extent {
        (a_extent, b_extent)
    } else {
        (b_extent, a_extent)
    };
    lo > 0.0 && hi >= 1.5 * lo
}

/// `≈10-14` strategies under partial overlap, 3 otherwise (§4.6 "Strategy
/// enumeration"). Radii are read from config rather than hardcoded so the
/// Open Question in §9 (tuned-for-adult-anatomy defaults) stays adjustable.
pub fn enumerate_strategies(partial_overlap: bool, roi_radii: &[f32; 5]) -> Vec<Strategy> {
    if !partial_overlap {
        return vec![
            Strategy {
                prealign: PrealignMode::Front,
                roi_radius: roi_radii[2],
                z_bias: 0.0,
            },
            Strategy {
                prealign: PrealignMode::Center,
                roi_radius: roi_radii[2],
                z_bias: 0.0,
            },
            Strategy {
                prealign: PrealignMode::None,
                roi_radius: roi_radii[2],
                z_bias: 0.0,
            },
        ];
    }
    let mut strategies = Vec::with_capacity(12);
    for &r in roi_radii {
        strategies.push(Strategy {
            prealign: PrealignMode::Front,
            roi_radius: r,
            z_bias: 0.0,
        });
    }
    for &r in roi_radii {
        strategies.push(Strategy {
            prealign: PrealignMode::Center,
            roi_radius: r,
            z_bias: 0.0,
        });
    }
    for &z in &[-10.0, 10.0] {
        strategies.push(Strategy {
            prealign: PrealignMode::Front,
            roi_radius: roi_radii[2],
            z_bias: z,
        });
    }
    strategies
}

/// Pre-alignment translation for `strategy`, applied to `source` before ROI
/// extraction and feature registration (§4.6 "Strategy enumeration").
pub fn prealign_translation(
    strategy: &Strategy,
    source_centroid: Point3<f32>,
    target_centroid: Point3<f32>,
    source_min_z: f32,
    target_min_z: f32,
) -> Vector3<f32> {
    match strategy.prealign {
        PrealignMode::None => Vector3::zeros(),
        PrealignMode::Center => target_centroid.coords - source_centroid.coords,
        PrealignMode::Front => {
            let xy = Vector3::new(
                target_centroid.x - source_centroid.x,
                target_centroid.y - source_centroid.y,
                0.0,
            );
            let z = (target_min_z - source_min_z) + strategy.z_bias;
            xy + Vector3::new(0.0, 0.0, z)
        }
    }
}

/// Subset of `larger`'s points within `radius` of any of up to
/// `MAX_ROI_SAMPLE` sampled `smaller` points (§4.6 "ROI policy"). Falls back
/// to the full point set when fewer than `MIN_ROI_POINTS` survive.
pub fn extract_roi(
    larger: &[Point3<f32>],
    smaller_sample: &[Point3<f32>],
    radius: f32,
) -> (Vec<Point3<f32>>, Vec<usize>, bool) {
    let probes: Vec<Point3<f32>> = if smaller_sample.len() > MAX_ROI_SAMPLE {
        smaller_sample[..MAX_ROI_SAMPLE].to_vec()
    } else {
        smaller_sample.to_vec()
    };

    let mut roi_indices: Vec<usize> = larger
        .iter()
        .enumerate()
        .filter_map(|(i, p)| {
            probes
                .iter()
                .any(|q| (p - q).norm() <= radius)
                .then_some(i)
        })
        .collect();

    if roi_indices.len() < MIN_ROI_POINTS {
        warn!(
            roi_points = roi_indices.len(),
            "ROI below minimum size, falling back to full mesh"
        );
        roi_indices = (0..larger.len()).collect();
        let points = larger.to_vec();
        return (points, roi_indices, true);
    }

    let points: Vec<Point3<f32>> = roi_indices.iter().map(|&i| larger[i]).collect();
    (points, roi_indices, false)
}

/// Outcome of running one strategy end to end (§4.6 "Per-strategy procedure").
#[derive(Debug, Clone)]
pub struct AttemptDiagnostic {
    pub strategy_index: usize,
    pub prealign: PrealignMode,
    pub roi_radius: f32,
    pub z_bias: f32,
    pub roi_fallback: bool,
    pub composite_score: f32,
    pub passed: bool,
    pub seed_index: usize,
}

pub struct StrategyOutcome {
    pub transform: RigidTransform,
    pub report: QualityReport,
    pub diagnostic: AttemptDiagnostic,
}

/// Runs the full per-strategy pipeline: pre-align, ROI extraction, voxel +
/// FPFH + RANSAC, candidate generation and capping, fast ranking, and full
/// multi-scale refinement (§4.6 steps 1-7).
#[allow(clippy::too_many_arguments)]
pub fn run_strategy(
    strategy_index: usize,
    strategy: &Strategy,
    source_full: &[Point3<f32>],
    larger_full: &[Point3<f32>],
    smaller_sample: &[Point3<f32>],
    source_centroid: Point3<f32>,
    target_centroid: Point3<f32>,
    source_min_z: f32,
    target_min_z: f32,
) -> EngineResult<StrategyOutcome> {
    let translation = prealign_translation(
        strategy,
        source_centroid,
        target_centroid,
        source_min_z,
        target_min_z,
    );
    let prealign_transform = RigidTransform::translation_only(translation);
    let prealigned_source: Vec<Point3<f32>> = source_full.iter().map(|p| p + translation).collect();

    let (roi_points, _roi_indices, roi_fallback) =
        extract_roi(larger_full, smaller_sample, strategy.roi_radius);

    let roi_extent = bounding_extent(&roi_points);
    let voxel = voxel_size_for(roi_extent, 0.01, 0.4, 0.6);

    let source_down = voxel_downsample(&prealigned_source, voxel);
    let target_down = voxel_downsample(&roi_points, voxel);
    if source_down.len() < 4 || target_down.len() < 4 {
        return Err(EngineError::DegenerateInput(
            "strategy produced too few points after downsampling".into(),
        ));
    }

    let source_normals = estimate_normals(&source_down, voxel * 2.0, 30);
    let target_normals = estimate_normals(&target_down, voxel * 2.0, 30);
    let source_fpfh = compute_fpfh(&source_down, &source_normals, voxel * 5.0, 100);
    let target_fpfh = compute_fpfh(&target_down, &target_normals, voxel * 5.0, 100);

    let ransac_transform = global_feature_ransac(
        &source_down,
        &target_down,
        &source_fpfh,
        &target_fpfh,
        voxel,
        named_seeds::GLOBAL_RANSAC,
    )
    .map(|(t, _, _)| t)
    .unwrap_or_else(|_| RigidTransform::identity());

    let mut candidates = vec![ransac_transform];
    if let (Ok(src_frame), Ok(dst_frame)) = (pca_frame(&source_down), pca_frame(&target_down)) {
        candidates.extend(pca_euler_seeds(&src_frame, &dst_frame));
    }
    candidates.extend(local_centroid_seeds(&source_down));
    let candidates = uniform_stride_cap(&candidates, CANDIDATE_CAP);

    let fast_threshold = 8.0 * voxel;
    let mut ranked: Vec<(f32, RigidTransform)> = candidates
        .iter()
        .map(|seed| {
            let refined = quick_icp(&source_down, &target_down, *seed, fast_threshold, FAST_RANK_ITERS);
            let transformed = refined.apply_points(&source_down);
            let report = compute_quality_report(&transformed, &target_down, voxel);
            let score = report.rmse / report.fitness.max(1e-3);
            (score, refined)
        })
        .collect();
    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    ranked.truncate(FAST_RANK_TOP_K);
    let top_seeds: Vec<RigidTransform> = ranked.into_iter().map(|(_, t)| t).collect();

    let outcome = multi_seed_icp(
        &source_down,
        &target_down,
        Some(&target_normals),
        &top_seeds,
        voxel,
        roi_extent,
    )?;

    let final_transform = outcome.transform.compose(&prealign_transform);
    let final_transformed = final_transform.apply_points(source_full);
    let final_report = compute_quality_report(&final_transformed, larger_full, voxel);

    let score = composite_score(&final_report);
    let passed_degenerate = !is_degenerate(&final_report, roi_extent);

    Ok(StrategyOutcome {
        transform: final_transform,
        report: final_report,
        diagnostic: AttemptDiagnostic {
            strategy_index,
            prealign: strategy.prealign,
            roi_radius: strategy.roi_radius,
            z_bias: strategy.z_bias,
            roi_fallback,
            composite_score: score,
            passed: passed_degenerate,
            seed_index: outcome.seed_index,
        },
    })
}

fn bounding_extent(points: &[Point3<f32>]) -> f32 {
    if points.is_empty() {
        return 1.0;
    }
    let mut min = Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }
    let e = max - min;
    e.x.max(e.y).max(e.z).max(1.0)
}

/// Final selection across every strategy's outcome (§4.6 "Branch selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    ValidBest,
    FallbackPrealign,
}

pub struct AutoRegisterResult {
    pub transform: RigidTransform,
    pub report: QualityReport,
    pub quality_gate: QualityGate,
    pub passed: bool,
    pub low_confidence: bool,
    pub selection_mode: SelectionMode,
    pub best_strategy: Option<usize>,
    pub best_seed_index: Option<usize>,
    pub attempt_count: usize,
    pub attempt_diagnostics: Vec<AttemptDiagnostic>,
    pub model_centers: (Point3<f32>, Point3<f32>),
}

/// Chooses the best passing strategy by minimal composite score, or the
/// conservative translation-only fallback if none pass (§4.6 "Branch
/// selection").
pub fn select_branch(
    outcomes: Vec<StrategyOutcome>,
    quality_gate: QualityGate,
    fallback_translation: Vector3<f32>,
    model_centers: (Point3<f32>, Point3<f32>),
) -> AutoRegisterResult {
    let attempt_count = outcomes.len();
    let mut diagnostics: Vec<AttemptDiagnostic> =
        outcomes.iter().map(|o| o.diagnostic.clone()).collect();
    diagnostics.truncate(12);

    let passing: Vec<&StrategyOutcome> = outcomes
        .iter()
        .filter(|o| o.diagnostic.passed && quality_gate.passes(&o.report))
        .collect();

    if let Some(best) = passing
        .into_iter()
        .min_by(|a, b| a.diagnostic.composite_score.partial_cmp(&b.diagnostic.composite_score).unwrap())
    {
        return AutoRegisterResult {
            transform: best.transform,
            report: best.report,
            quality_gate,
            passed: true,
            low_confidence: false,
            selection_mode: SelectionMode::ValidBest,
            best_strategy: Some(best.diagnostic.strategy_index),
            best_seed_index: Some(best.diagnostic.seed_index),
            attempt_count,
            attempt_diagnostics: diagnostics,
            model_centers,
        };
    }

    AutoRegisterResult {
        transform: RigidTransform::translation_only(fallback_translation),
        report: QualityReport::degenerate(),
        quality_gate,
        passed: false,
        low_confidence: true,
        selection_mode: SelectionMode::FallbackPrealign,
        best_strategy: None,
        best_seed_index: None,
        attempt_count,
        attempt_diagnostics: diagnostics,
        model_centers,
    }
}

/// `refine_icp`'s two-branch structure recovered from the original
/// implementation: a ROI-aware branch limited to the jaw/face overlap region
/// and a full-mesh branch, with the better-scoring result reported.
pub fn refine_branches(
    config: &EngineConfig,
    source: &GeomSource,
    target: &GeomSource,
    initial: RigidTransform,
) -> EngineResult<(RigidTransform, QualityReport)> {
    let source_points = source.vertices();
    let target_points = target.vertices();
    if source_points.is_empty() || target_points.is_empty() {
        return Err(EngineError::DegenerateInput("refine_icp requires non-empty meshes".into()));
    }

    let roi_extent = bounding_extent(&target_points);
    let voxel = voxel_size_for(roi_extent, 0.008, 0.4, 0.5);

    let full_transform = {
        let target_normals = estimate_normals(&target_points, voxel * 2.0, 30);
        multi_seed_icp_single(
            &source_points,
            &target_points,
            Some(&target_normals),
            initial,
            voxel,
            roi_extent,
        )?
    };

    let (roi_points, _idx, fallback) = extract_roi(
        &target_points,
        &sample_for_roi(&source_points),
        config.roi.refine_distance_threshold,
    );
    let roi_branch = if fallback {
        None
    } else {
        let roi_extent = bounding_extent(&roi_points);
        let roi_voxel = voxel_size_for(roi_extent, 0.008, 0.4, 0.5);
        let roi_normals = estimate_normals(&roi_points, roi_voxel * 2.0, 30);
        multi_seed_icp_single(
            &source_points,
            &roi_points,
            Some(&roi_normals),
            initial,
            roi_voxel,
            roi_extent,
        )
        .ok()
    };

    let candidates = [Some(full_transform), roi_branch];
    let best = candidates
        .into_iter()
        .flatten()
        .min_by(|a, b| composite_score(&a.1).partial_cmp(&composite_score(&b.1)).unwrap())
        .ok_or_else(|| EngineError::NumericalFailure("refine_icp produced no candidate".into()))?;

    Ok(best)
}

fn sample_for_roi(points: &[Point3<f32>]) -> Vec<Point3<f32>> {
    if points.len() <= MAX_ROI_SAMPLE {
        return points.to_vec();
    }
    points.iter().step_by(points.len() / MAX_ROI_SAMPLE).copied().collect()
}

fn multi_seed_icp_single(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    target_normals: Option<&[Vector3<f32>]>,
    initial: RigidTransform,
    voxel: f32,
    roi_extent: f32,
) -> EngineResult<(RigidTransform, QualityReport)> {
    let seeds = transform::local_perturbation_seeds(&initial);
    let outcome = multi_seed_icp(source, target, target_normals, &seeds, voxel, roi_extent)?;
    Ok((outcome.transform, outcome.report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_overlap_detects_size_ratio() {
        assert!(is_partial_overlap(10.0, 20.0));
        assert!(!is_partial_overlap(10.0, 12.0));
    }

    #[test]
    fn full_overlap_enumerates_three_strategies() {
        let radii = [35.0, 45.0, 55.0, 70.0, 85.0];
        assert_eq!(enumerate_strategies(false, &radii).len(), 3);
    }

    #[test]
    fn partial_overlap_enumerates_within_spec_window() {
        let radii = [35.0, 45.0, 55.0, 70.0, 85.0];
        let n = enumerate_strategies(true, &radii).len();
        assert!((10..=14).contains(&n));
    }

    #[test]
    fn roi_falls_back_when_below_minimum() {
        let larger = vec![Point3::new(1000.0, 1000.0, 1000.0); 5];
        let smaller = vec![Point3::origin()];
        let (points, _, fallback) = extract_roi(&larger, &smaller, 1.0);
        assert!(fallback);
        assert_eq!(points.len(), larger.len());
    }
}
