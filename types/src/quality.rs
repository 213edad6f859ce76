use serde::{Deserialize, Serialize};

/// Symmetric-distance-based alignment quality (§3 DATA MODEL, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub rmse: f32,
    pub fitness: f32,
    pub overlap: f32,
    pub center_dist: f32,
    pub median_sym: f32,
    pub p90_sym: f32,
    pub mean_sym: f32,
}

impl QualityReport {
    pub fn degenerate() -> Self {
        Self {
            rmse: f32::INFINITY,
            fitness: 0.0,
            overlap: 0.0,
            center_dist: f32::INFINITY,
            median_sym: f32::INFINITY,
            p90_sym: f32::INFINITY,
            mean_sym: f32::INFINITY,
        }
    }
}

/// Per-profile threshold bundle deciding `low_confidence` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    pub rmse_max: f32,
    pub fitness_min: f32,
    pub overlap_min: f32,
    pub center_dist_max: f32,
}

impl QualityGate {
    pub fn passes(&self, report: &QualityReport) -> bool {
        report.rmse <= self.rmse_max
            && report.fitness >= self.fitness_min
            && report.overlap >= self.overlap_min
            && report.center_dist <= self.center_dist_max
    }

    pub fn scale(&self, rmse: f32, fitness: f32, overlap: f32, center_dist: f32) -> QualityGate {
        QualityGate {
            rmse_max: self.rmse_max * rmse,
            fitness_min: self.fitness_min * fitness,
            overlap_min: self.overlap_min * overlap,
            center_dist_max: self.center_dist_max * center_dist,
        }
    }
}

/// Why a correspondence pair was selected — surfaced so callers can tell a
/// primary suggestion from a relaxed backfill (§4.6 step 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrespondenceReason {
    MutualNearest,
    RansacVerified,
    Backfill,
}

/// `(source_point, target_point, score, reason, distance)` (§3 DATA MODEL).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrespondencePair {
    pub id: u32,
    pub source_point: nalgebra::Point3<f32>,
    pub target_point: nalgebra::Point3<f32>,
    pub score: f32,
    pub reason: CorrespondenceReason,
    pub distance: f32,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    

    #[test]
    fn relaxed_gate_is_superset_of_strict() {
        // §8 "Profile monotonicity": relaxed admits a strict superset of strict's passes.
        let strict = QualityGate {
            rmse_max: 2.6,
            fitness_min: 0.24,
            overlap_min: 0.24,
            center_dist_max: 35.0,
        };
        let relaxed = QualityGate {
            rmse_max: 3.8,
            fitness_min: 0.16,
            overlap_min: 0.16,
            center_dist_max: 50.0,
        };
        let report = QualityReport {
            rmse: 3.0,
            fitness: 0.18,
            overlap: 0.20,
            center_dist: 40.0,
            median_sym: 1.0,
            p90_sym: 2.0,
            mean_sym: 1.5,
        };
        assert!(!strict.passes(&report));
        assert!(relaxed.passes(&report));
    }
}
