use nalgebra::{Matrix3, Point3, Vector3};
use types::{EngineError, EngineResult, SimilarityTransform};

fn centroid(points: &[Point3<f32>]) -> Point3<f32> {
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f32)
}

/// Similarity fit (§4.3 Umeyama): extends Kabsch with a scalar scale
/// `s = trace(D*S) / var(X)`. Diagnostic only — the engine never applies a
/// non-unit scale to an actual alignment, this is reported as a drift metric.
pub fn umeyama(x: &[Point3<f32>], y: &[Point3<f32>]) -> EngineResult<SimilarityTransform> {
    if x.len() != y.len() {
        return Err(EngineError::InputMissing(format!(
            "umeyama point count mismatch: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 3 {
        return Err(EngineError::DegenerateInput(format!(
            "umeyama requires at least 3 paired points, got {}",
            x.len()
        )));
    }

    let n = x.len() as f32;
    let x_bar = centroid(x);
    let y_bar = centroid(y);
    let xc: Vec<Vector3<f32>> = x.iter().map(|p| p - x_bar).collect();
    let yc: Vec<Vector3<f32>> = y.iter().map(|p| p - y_bar).collect();

    let sigma_xy = xc
        .iter()
        .zip(yc.iter())
        .fold(Matrix3::zeros(), |acc, (xi, yi)| acc + xi * yi.transpose())
        / n;
    let var_x: f32 = xc.iter().map(|v| v.norm_squared()).sum::<f32>() / n;
    if var_x < f32::EPSILON {
        return Err(EngineError::DegenerateInput(
            "umeyama source variance is zero".into(),
        ));
    }

    let svd = sigma_xy.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| EngineError::NumericalFailure("umeyama SVD failed to produce U".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| EngineError::NumericalFailure("umeyama SVD failed to produce V^T".into()))?;
    let v = v_t.transpose();
    let d = svd.singular_values;

    let sign = (v * u.transpose()).determinant().signum();
    let correction_diag = [1.0, 1.0, sign];
    let correction = Matrix3::new(
        correction_diag[0],
        0.0,
        0.0,
        0.0,
        correction_diag[1],
        0.0,
        0.0,
        0.0,
        correction_diag[2],
    );
    let rotation = v * correction * u.transpose();

    let trace_term: f32 = d[0] * correction_diag[0] + d[1] * correction_diag[1] + d[2] * correction_diag[2];
    let scale = trace_term / var_x;
    let translation = y_bar.coords - scale * (rotation * x_bar.coords);

    Ok(SimilarityTransform {
        scale,
        rotation,
        translation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    

    fn cube_points() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn identity_scale_is_one() {
        let pts = cube_points();
        let t = umeyama(&pts, &pts).unwrap();
        assert!((t.scale - 1.0).abs() < 1e-4);
    }

    #[test]
    fn uniform_scale_is_recovered() {
        let src = cube_points();
        let dst: Vec<Point3<f32>> = src.iter().map(|p| Point3::from(p.coords * 2.5)).collect();
        let t = umeyama(&src, &dst).unwrap();
        assert!((t.scale - 2.5).abs() < 1e-3);
    }

    #[test]
    fn degenerate_zero_variance_source_rejected() {
        let src = vec![Point3::origin(); 4];
        let dst = cube_points();
        assert!(matches!(
            umeyama(&src, &dst[..4]),
            Err(EngineError::DegenerateInput(_))
        ));
    }
}
