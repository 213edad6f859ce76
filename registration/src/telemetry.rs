use serde::Serialize;
use tracing::info;
use types::{CorrespondencePair, QualityReport, RigidTransform};

/// Structured telemetry emitted around `refine_icp` calls (§6 telemetry
/// contract). The engine has no file/HTTP layer of its own — callers that
/// need append-only session logs subscribe a `tracing_subscriber` layer and
/// persist these events themselves.
#[derive(Debug, Clone, Serialize)]
pub struct RefineIcpEvent {
    pub rmse: f32,
    pub fitness: f32,
    pub overlap: f32,
    pub center_dist: f32,
}

pub fn log_refine_icp(report: &QualityReport) {
    let event = RefineIcpEvent {
        rmse: report.rmse,
        fitness: report.fitness,
        overlap: report.overlap,
        center_dist: report.center_dist,
    };
    info!(event = "refine_icp", rmse = event.rmse, fitness = event.fitness, overlap = event.overlap, center_dist = event.center_dist);
}

#[derive(Debug, Clone, Serialize)]
pub struct SemiAutoSuggestEvent {
    pub pair_count: usize,
    pub roi_mode: &'static str,
    pub backfilled: usize,
}

pub fn log_semi_auto_suggest(pairs: &[CorrespondencePair], roi_mode: &'static str, backfilled: usize) {
    let event = SemiAutoSuggestEvent {
        pair_count: pairs.len(),
        roi_mode,
        backfilled,
    };
    info!(
        event = "semi_auto_suggest",
        pair_count = event.pair_count,
        roi_mode = event.roi_mode,
        backfilled = event.backfilled
    );
}

/// A full suggestion session, summarizing every accept/reject decision a
/// caller recorded against the suggested pairs (§6 "semi_auto_session_report").
#[derive(Debug, Clone, Serialize)]
pub struct SemiAutoSessionReport {
    pub suggested: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub final_transform: Option<RigidTransform>,
}

pub fn log_semi_auto_session_report(report: &SemiAutoSessionReport) {
    info!(
        event = "semi_auto_session_report",
        suggested = report.suggested,
        accepted = report.accepted,
        rejected = report.rejected,
        "semi-auto suggestion session closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn session_report_tracks_counts() {
        let report = SemiAutoSessionReport {
            suggested: 10,
            accepted: 7,
            rejected: 3,
            final_transform: Some(RigidTransform::identity()),
        };
        assert_eq!(report.accepted + report.rejected, report.suggested);
    }
}
