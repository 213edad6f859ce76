use crate::icp::quick_icp;
use geometry::{nearest, sample_curvature, sample_points_with_normals};
use nalgebra::{Point3, Vector3};
use rand::seq::index::sample;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use transform::kabsch;
use types::config::seeds as named_seeds;
use types::{CorrespondencePair, CorrespondenceReason, EngineError, EngineResult, Mesh, RigidTransform};

const SOURCE_SAMPLE: usize = 6_500;
const TARGET_SAMPLE: usize = 22_000;
const COARSE_ICP_ITERS: usize = 25;
const COARSE_ICP_THRESHOLD: f32 = 6.0;

#[derive(Debug, Clone, Copy)]
pub struct SuggestParams {
    pub force_mouth_roi: bool,
    pub num_pairs: usize,
}

#[derive(Debug, Clone)]
pub struct SuggestDiagnostics {
    pub roi_mode: &'static str,
    pub nearest_mode: &'static str,
    pub roi_point_count: usize,
    pub backfilled: usize,
}

/// Semi-automatic correspondence suggestion (§4.6), run in ten steps:
/// sample, coarse-align, ROI clip, mutual-NN pairing, distance gate, RANSAC
/// verification, scoring, spread-constrained top-k selection, backfill.
pub fn suggest_points(
    source: &Mesh,
    target: &Mesh,
    params: SuggestParams,
) -> EngineResult<(Vec<CorrespondencePair>, RigidTransform, SuggestDiagnostics)> {
    if source.is_empty() || target.is_empty() {
        return Err(EngineError::DegenerateInput(
            "suggest_points requires non-empty source and target".into(),
        ));
    }

    // Step 1: sample.
    let (src_pts, _src_normals, src_idx) =
        sample_points_with_normals(source, SOURCE_SAMPLE, named_seeds::SEMI_AUTO_SOURCE_SAMPLE);
    let (tgt_pts, tgt_normals, _tgt_idx) =
        sample_points_with_normals(target, TARGET_SAMPLE, named_seeds::SEMI_AUTO_TARGET_SAMPLE);
    if src_pts.len() < 3 || tgt_pts.len() < 3 {
        return Err(EngineError::DegenerateInput(
            "too few sampled points for correspondence suggestion".into(),
        ));
    }

    // Step 2: coarse init via centroid match, then vanilla ICP.
    let src_centroid = centroid(&src_pts);
    let tgt_centroid = centroid(&tgt_pts);
    let coarse_init = RigidTransform::translation_only(tgt_centroid.coords - src_centroid.coords);
    let coarse = quick_icp(&src_pts, &tgt_pts, coarse_init, COARSE_ICP_THRESHOLD, COARSE_ICP_ITERS);
    let src_transformed = coarse.apply_points(&src_pts);

    // Step 3: hard ROI on the target.
    let max_extent = extent(&src_transformed).max(extent(&tgt_pts));
    let margin = (0.32 * max_extent).clamp(8.0, 28.0);
    let percentile_pct = if params.force_mouth_roi { 0.07 } else { 0.13 };
    let roi_mode = if params.force_mouth_roi { "mouth" } else { "full_face" };

    let (roi_indices, roi_point_count) = hard_roi(&src_transformed, &tgt_pts, margin, percentile_pct);
    let roi_targets: Vec<Point3<f32>> = roi_indices.iter().map(|&i| tgt_pts[i]).collect();
    let roi_target_normals: Vec<Vector3<f32>> = roi_indices.iter().map(|&i| tgt_normals[i]).collect();

    // Step 4: mutual nearest-neighbour pairs, deduped one-to-one by target index.
    let mut pairs = mutual_nearest_pairs(&src_transformed, &roi_targets);

    // Step 5: distance gate.
    let dist_threshold = distance_gate_threshold(&pairs);
    pairs.retain(|p| p.distance <= dist_threshold);

    // Step 6: RANSAC verification.
    let inlier_threshold = if params.force_mouth_roi { 3.8 } else { 5.0 };
    let (verified, nearest_mode) = ransac_verify(&src_transformed, &roi_targets, &pairs, inlier_threshold);
    let candidate_pairs = if verified.len() >= 3 { verified } else { pairs };

    // Step 7: score every surviving pair.
    let curvature = source_curvature(source, &src_idx);
    let scored: Vec<(MatchPair, f32)> = candidate_pairs
        .iter()
        .map(|m| {
            let n_src = Vector3::zeros();
            let n_tgt = roi_target_normals.get(m.target_idx).copied().unwrap_or_else(Vector3::zeros);
            let normal_term = if n_src.norm() > 0.0 && n_tgt.norm() > 0.0 {
                (n_src.dot(&n_tgt) + 1.0) / 2.0
            } else {
                0.5
            };
            let curv = curvature.get(m.source_idx).copied().unwrap_or(0.0);
            let score = 0.62 / (1.0 + m.distance) + 0.20 * normal_term + 0.12 * curv + 0.06;
            (*m, score)
        })
        .collect();

    // Step 8: spread-constrained top-k selection.
    let source_extent = extent(&src_transformed);
    let min_src_spread = (source_extent * 0.10).max(10.0);
    let min_tgt_spread = (source_extent * 0.08).max(7.5);
    let k = params.num_pairs.max(1);
    let mut selected = select_with_spread(&scored, &src_transformed, &roi_targets, k, min_src_spread, min_tgt_spread);

    // Step 9: backfill from relaxed ROI nearest neighbours if short.
    let mut backfilled = 0usize;
    if selected.len() < k {
        let needed = k - selected.len();
        let extra = backfill(&src_transformed, &roi_targets, &selected, needed);
        backfilled = extra.len();
        selected.extend(extra);
    }

    // Step 10: emit correspondence pairs with clipped confidence.
    let max_score = selected.iter().map(|(_, s)| *s).fold(0.0_f32, f32::max).max(1e-6);
    let out = selected
        .into_iter()
        .enumerate()
        .map(|(id, (m, score))| {
            let score_norm = score / max_score;
            let confidence = (0.55 + 0.4 * score_norm).clamp(0.0, 0.99);
            CorrespondencePair {
                id: id as u32,
                source_point: src_pts[m.source_idx],
                target_point: roi_targets[m.target_idx],
                score,
                reason: m.reason,
                distance: m.distance,
                confidence,
            }
        })
        .collect();

    Ok((
        out,
        coarse,
        SuggestDiagnostics {
            roi_mode,
            nearest_mode,
            roi_point_count,
            backfilled,
        },
    ))
}

fn centroid(points: &[Point3<f32>]) -> Point3<f32> {
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f32)
}

fn extent(points: &[Point3<f32>]) -> f32 {
    if points.is_empty() {
        return 0.0;
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
    e.x.max(e.y).max(e.z)
}

fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f32).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

fn hard_roi(
    src_transformed: &[Point3<f32>],
    target: &[Point3<f32>],
    margin: f32,
    near_source_pct: f32,
) -> (Vec<usize>, usize) {
    let (mut min, mut max) = (
        Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
        Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
    );
    for p in src_transformed {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }
    min -= Vector3::new(margin, margin, margin);
    max += Vector3::new(margin, margin, margin);

    let distances: Vec<f32> = target
        .iter()
        .filter_map(|p| nearest(src_transformed, p).map(|(_, d)| d))
        .collect();
    let mut sorted = distances.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let near_threshold = percentile(&sorted, near_source_pct).clamp(2.5, 20.0);

    let mut indices: Vec<usize> = target
        .iter()
        .zip(distances.iter())
        .enumerate()
        .filter(|(_, (p, d))| {
            p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y && p.z >= min.z && p.z <= max.z
                && **d <= near_threshold
        })
        .map(|(i, _)| i)
        .collect();

    if indices.len() < 900 {
        let mut by_distance: Vec<(usize, f32)> = distances.iter().copied().enumerate().collect();
        by_distance.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        indices = by_distance.into_iter().take(3_600.min(target.len())).map(|(i, _)| i).collect();
    }

    let count = indices.len();
    (indices, count)
}

#[derive(Debug, Clone, Copy)]
struct MatchPair {
    source_idx: usize,
    target_idx: usize,
    distance: f32,
    reason: CorrespondenceReason,
}

fn mutual_nearest_pairs(source: &[Point3<f32>], target: &[Point3<f32>]) -> Vec<MatchPair> {
    if target.is_empty() {
        return Vec::new();
    }
    let src_to_tgt: Vec<Option<(usize, f32)>> = source.iter().map(|p| nearest(target, p)).collect();
    let tgt_to_src: Vec<Option<(usize, f32)>> = target.iter().map(|p| nearest(source, p)).collect();

    let mut best_by_target: HashMap<usize, (usize, f32)> = HashMap::new();
    for (src_idx, maybe) in src_to_tgt.iter().enumerate() {
        let Some((tgt_idx, dist)) = maybe else { continue };
        let Some((back_idx, _)) = tgt_to_src[*tgt_idx] else { continue };
        if back_idx != src_idx {
            continue;
        }
        let better = best_by_target
            .get(tgt_idx)
            .map(|&(_, d)| *dist < d)
            .unwrap_or(true);
        if better {
            best_by_target.insert(*tgt_idx, (src_idx, *dist));
        }
    }

    best_by_target
        .into_iter()
        .map(|(target_idx, (source_idx, distance))| MatchPair {
            source_idx,
            target_idx,
            distance,
            reason: CorrespondenceReason::MutualNearest,
        })
        .collect()
}

fn distance_gate_threshold(pairs: &[MatchPair]) -> f32 {
    if pairs.is_empty() {
        return 9.5;
    }
    let mut distances: Vec<f32> = pairs.iter().map(|p| p.distance).collect();
    distances.sort_by(|a, b| a.partial_cmp(b).unwrap());
    percentile(&distances, 0.6).clamp(1.8, 9.5)
}

fn ransac_verify(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    pairs: &[MatchPair],
    inlier_threshold: f32,
) -> (Vec<MatchPair>, &'static str) {
    if pairs.len() < 3 {
        return (Vec::new(), "insufficient_candidates");
    }
    let iterations = (3 * pairs.len()).clamp(40, 180);
    let mut rng = ChaCha8Rng::seed_from_u64(named_seeds::SEMI_AUTO_RANSAC);

    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_median = f32::INFINITY;

    for _ in 0..iterations {
        let triplet = sample(&mut rng, pairs.len(), 3).into_vec();
        let src_tri: Vec<Point3<f32>> = triplet.iter().map(|&i| source[pairs[i].source_idx]).collect();
        let dst_tri: Vec<Point3<f32>> = triplet.iter().map(|&i| target[pairs[i].target_idx]).collect();
        let Ok(candidate) = kabsch(&src_tri, &dst_tri) else {
            continue;
        };

        let mut residuals = Vec::new();
        let mut inliers = Vec::new();
        for (i, p) in pairs.iter().enumerate() {
            let transformed = candidate.apply_point(&source[p.source_idx]);
            let residual = (transformed - target[p.target_idx]).norm();
            if residual <= inlier_threshold {
                inliers.push(i);
                residuals.push(residual);
            }
        }
        residuals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = percentile(&residuals, 0.5);

        if inliers.len() > best_inliers.len()
            || (inliers.len() == best_inliers.len() && median < best_median)
        {
            best_inliers = inliers;
            best_median = median;
        }
    }

    let verified = best_inliers
        .into_iter()
        .map(|i| MatchPair {
            reason: CorrespondenceReason::RansacVerified,
            ..pairs[i]
        })
        .collect();
    (verified, "ransac_verified")
}

fn select_with_spread(
    scored: &[(MatchPair, f32)],
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    k: usize,
    min_src_spread: f32,
    min_tgt_spread: f32,
) -> Vec<(MatchPair, f32)> {
    let mut ranked = scored.to_vec();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let mut selected: Vec<(MatchPair, f32)> = Vec::new();
    for (m, score) in ranked {
        let src_p = source[m.source_idx];
        let tgt_p = target[m.target_idx];
        let far_enough = selected.iter().all(|(sel, _)| {
            (source[sel.source_idx] - src_p).norm() >= min_src_spread
                && (target[sel.target_idx] - tgt_p).norm() >= min_tgt_spread
        });
        if far_enough {
            selected.push((m, score));
        }
        if selected.len() >= k {
            break;
        }
    }
    selected
}

fn backfill(
    source: &[Point3<f32>],
    target: &[Point3<f32>],
    already: &[(MatchPair, f32)],
    needed: usize,
) -> Vec<(MatchPair, f32)> {
    const BACKFILL_PENALTY: f32 = 0.22;
    let used_targets: std::collections::HashSet<usize> = already.iter().map(|(m, _)| m.target_idx).collect();

    let mut candidates: Vec<(MatchPair, f32)> = source
        .iter()
        .enumerate()
        .filter_map(|(src_idx, p)| {
            let (tgt_idx, dist) = nearest(target, p)?;
            if used_targets.contains(&tgt_idx) {
                return None;
            }
            Some((
                MatchPair {
                    source_idx: src_idx,
                    target_idx: tgt_idx,
                    distance: dist,
                    reason: CorrespondenceReason::Backfill,
                },
                (0.62 / (1.0 + dist) - BACKFILL_PENALTY).max(0.0),
            ))
        })
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    candidates.truncate(needed);
    candidates
}

fn source_curvature(mesh: &Mesh, indices: &[usize]) -> Vec<f32> {
    sample_curvature(mesh, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    

    fn flat_mesh(n: i32, z: f32) -> Mesh {
        let mut verts = Vec::new();
        for x in 0..n {
            for y in 0..n {
                verts.push(Point3::new(x as f32, y as f32, z));
            }
        }
        Mesh::new(verts, None, None).unwrap()
    }

    #[test]
    fn suggest_points_rejects_empty_mesh() {
        let empty = Mesh::new(Vec::new(), None, None).unwrap();
        let target = flat_mesh(10, 0.0);
        assert!(suggest_points(
            &empty,
            &target,
            SuggestParams {
                force_mouth_roi: false,
                num_pairs: 5
            }
        )
        .is_err());
    }

    #[test]
    fn suggest_points_returns_pairs_for_overlapping_meshes() {
        let source = flat_mesh(15, 0.0);
        let target = flat_mesh(15, 0.5);
        let result = suggest_points(
            &source,
            &target,
            SuggestParams {
                force_mouth_roi: false,
                num_pairs: 5,
            },
        );
        assert!(result.is_ok());
    }
}
