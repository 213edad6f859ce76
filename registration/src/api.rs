use crate::icp::{compute_quality_report, multi_seed_icp};
use crate::manual::{manual_register, ManualRegistrationReport};
use crate::roi::{
    enumerate_strategies, is_partial_overlap, refine_branches, run_strategy, select_branch,
    AutoRegisterResult,
};
use crate::suggest::{suggest_points, SuggestDiagnostics, SuggestParams};
use crate::voxel::voxel_size_for;
use nalgebra::Point3;
use rand::seq::index::sample;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use transform::umeyama;
use types::config::seeds as named_seeds;
use types::{
    CorrespondencePair, DeviceProfile, EngineConfig, EngineError, EngineResult, GeomSource, Mesh,
    Profile, QualityReport, RigidTransform, ScanKind,
};

const SIMILARITY_SOURCE_SAMPLE: usize = 8_000;
const SIMILARITY_TARGET_SAMPLE: usize = 15_000;
/// `|scale - 1| > 0.03` flags a likely unit mismatch between source and target (§4.8).
const SCALE_DRIFT_THRESHOLD: f32 = 0.03;

/// Manual landmark registration entry point (§6): thin wrapper with
/// engine-level telemetry over [`manual_register`].
pub fn register_manual(
    source_landmarks: &[Point3<f32>],
    target_landmarks: &[Point3<f32>],
) -> EngineResult<(RigidTransform, ManualRegistrationReport)> {
    let result = manual_register(source_landmarks, target_landmarks)?;
    info!(
        inlier_count = result.1.inlier_count,
        total_points = result.1.total_points,
        rmse = result.1.rmse,
        "manual_register"
    );
    Ok(result)
}

/// Fully-automatic coarse registration (§6): enumerates strategies, runs each
/// independently, and selects the best-scoring passing branch or falls back
/// to a conservative pre-alignment.
pub fn auto_register(config: &EngineConfig, source: &GeomSource, target: &GeomSource) -> EngineResult<AutoRegisterResult> {
    let source_points = source.vertices();
    let target_points = target.vertices();
    if source_points.is_empty() || target_points.is_empty() {
        return Err(EngineError::DegenerateInput(
            "auto_register requires non-empty source and target".into(),
        ));
    }

    let source_extent = source.max_extent();
    let target_extent = target.max_extent();
    let partial_overlap = is_partial_overlap(source_extent, target_extent);
    let strategies = enumerate_strategies(partial_overlap, &config.roi.roi_radii);

    let (larger_points, larger_is_target) = if target_extent >= source_extent {
        (&target_points, true)
    } else {
        (&source_points, false)
    };
    let smaller_sample = sample_for_ransac_source(if larger_is_target {
        &source_points
    } else {
        &target_points
    });

    let source_centroid = source.centroid();
    let target_centroid = target.centroid();
    let source_min_z = min_z(&source_points);
    let target_min_z = min_z(&target_points);

    let outcomes: Vec<_> = strategies
        .iter()
        .enumerate()
        .filter_map(|(idx, strategy)| {
            run_strategy(
                idx,
                strategy,
                &source_points,
                larger_points,
                &smaller_sample,
                source_centroid,
                target_centroid,
                source_min_z,
                target_min_z,
            )
            .ok()
        })
        .collect();

    let profile = Profile::infer(ScanKind::Intraoral, ScanKind::Face);
    let quality_gate = config.quality_gate(profile, DeviceProfile::Standard);
    let fallback = target_centroid.coords - source_centroid.coords;

    let result = select_branch(outcomes, quality_gate, fallback, (source_centroid, target_centroid));
    info!(
        attempt_count = result.attempt_count,
        passed = result.passed,
        low_confidence = result.low_confidence,
        "auto_register"
    );
    Ok(result)
}

fn sample_for_ransac_source(points: &[Point3<f32>]) -> Vec<Point3<f32>> {
    const CAP: usize = 1_000;
    if points.len() <= CAP {
        return points.to_vec();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(named_seeds::ROI_SAMPLE);
    let mut indices: Vec<usize> = sample(&mut rng, points.len(), CAP).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|i| points[i]).collect()
}

fn min_z(points: &[Point3<f32>]) -> f32 {
    points.iter().map(|p| p.z).fold(f32::INFINITY, f32::min)
}

/// ICP refinement from an existing coarse estimate (§6): delegates to the
/// two-branch (ROI + full-mesh) refiner and reports the better of the two.
pub fn refine_icp(
    config: &EngineConfig,
    source: &GeomSource,
    target: &GeomSource,
    initial: RigidTransform,
) -> EngineResult<(RigidTransform, QualityReport)> {
    let result = refine_branches(config, source, target, initial)?;
    info!(
        rmse = result.1.rmse,
        fitness = result.1.fitness,
        overlap = result.1.overlap,
        "refine_icp"
    );
    Ok(result)
}

/// Semi-automatic correspondence suggestion (§6).
pub fn suggest_points_api(
    source: &Mesh,
    target: &Mesh,
    params: SuggestParams,
) -> EngineResult<(Vec<CorrespondencePair>, RigidTransform, SuggestDiagnostics)> {
    let result = suggest_points(source, target, params)?;
    info!(
        pair_count = result.0.len(),
        roi_mode = result.2.roi_mode,
        backfilled = result.2.backfilled,
        "semi_auto_suggest"
    );
    Ok(result)
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityReport {
    pub scale: f32,
    pub scale_drift: f32,
    pub likely_scale_mismatch: bool,
    pub rmse: f32,
}

/// Diagnostic-only similarity check (§4.8): fits a Kabsch+scale transform
/// over subsampled point sets and reports how far the recovered scale
/// deviates from 1.0. Never used to actually rescale a registration.
pub fn similarity_check(source: &GeomSource, target: &GeomSource) -> EngineResult<SimilarityReport> {
    let source_points = subsample(
        &source.vertices(),
        SIMILARITY_SOURCE_SAMPLE,
        named_seeds::SIMILARITY_CHECK_SOURCE_SAMPLE,
    );
    let target_points = subsample(
        &target.vertices(),
        SIMILARITY_TARGET_SAMPLE,
        named_seeds::SIMILARITY_CHECK_TARGET_SAMPLE,
    );
    let n = source_points.len().min(target_points.len());
    if n < 3 {
        return Err(EngineError::DegenerateInput(
            "similarity_check requires at least 3 paired samples".into(),
        ));
    }
    let fit = umeyama(&source_points[..n], &target_points[..n])?;

    let rmse = (source_points[..n]
        .iter()
        .zip(target_points[..n].iter())
        .map(|(s, t)| (fit.apply_point(s) - t).norm_squared())
        .sum::<f32>()
        / n as f32)
        .sqrt();

    let scale_drift = (fit.scale - 1.0).abs();
    Ok(SimilarityReport {
        scale: fit.scale,
        scale_drift,
        likely_scale_mismatch: scale_drift > SCALE_DRIFT_THRESHOLD,
        rmse,
    })
}

fn subsample(points: &[Point3<f32>], n: usize, seed: u64) -> Vec<Point3<f32>> {
    if points.len() <= n {
        return points.to_vec();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = sample(&mut rng, points.len(), n).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|i| points[i]).collect()
}

/// Returns the built-in profile table (§6 "get_profiles"), unadjusted for
/// device.
pub fn get_profiles(config: &EngineConfig) -> Vec<(Profile, types::QualityGate)> {
    [
        Profile::Default,
        Profile::IntraoralFaceStrict,
        Profile::IntraoralFaceRelaxed,
        Profile::FaceFace,
    ]
    .into_iter()
    .map(|p| (p, config.profiles.base(p)))
    .collect()
}

/// Quick feasibility pass used before committing to a full [`auto_register`]
/// run: one multi-seed ICP attempt from identity plus a centroid-translation
/// seed, with no ROI strategy search.
pub fn quick_feasibility_check(
    source: &GeomSource,
    target: &GeomSource,
) -> EngineResult<QualityReport> {
    let source_points = source.vertices();
    let target_points = target.vertices();
    if source_points.is_empty() || target_points.is_empty() {
        return Err(EngineError::DegenerateInput(
            "quick_feasibility_check requires non-empty source and target".into(),
        ));
    }
    let roi_extent = target.max_extent().max(1.0);
    let voxel = voxel_size_for(roi_extent, 0.01, 0.4, 0.6);
    let translation = target.centroid().coords - source.centroid().coords;
    let seeds = vec![RigidTransform::identity(), RigidTransform::translation_only(translation)];
    let outcome = multi_seed_icp(&source_points, &target_points, None, &seeds, voxel, roi_extent)?;
    let transformed = outcome.transform.apply_points(&source_points);
    Ok(compute_quality_report(&transformed, &target_points, voxel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use pretty_assertions::assert_eq;

    fn cube_mesh(offset: Vector3<f32>) -> Mesh {
        let mut verts = Vec::new();
        for x in 0..4 {
            for y in 0..4 {
                for z in 0..4 {
                    verts.push(Point3::new(x as f32, y as f32, z as f32) + offset);
                }
            }
        }
        Mesh::new(verts, None, None).unwrap()
    }

    #[test]
    fn get_profiles_returns_four_entries() {
        let config = EngineConfig::default();
        assert_eq!(get_profiles(&config).len(), 4);
    }

    #[test]
    fn similarity_check_detects_no_drift_for_identical_scale() {
        let source: GeomSource = cube_mesh(Vector3::zeros()).into();
        let target: GeomSource = cube_mesh(Vector3::new(1.0, 0.0, 0.0)).into();
        let report = similarity_check(&source, &target).unwrap();
        assert!(!report.likely_scale_mismatch);
        assert!(report.scale_drift < SCALE_DRIFT_THRESHOLD);
    }

    #[test]
    fn quick_feasibility_check_rejects_empty_input() {
        let empty: GeomSource = Mesh::new(Vec::new(), None, None).unwrap().into();
        let target: GeomSource = cube_mesh(Vector3::zeros()).into();
        assert!(quick_feasibility_check(&empty, &target).is_err());
    }
}
