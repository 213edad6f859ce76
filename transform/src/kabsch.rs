use nalgebra::{Matrix3, Point3, Vector3};
use types::{EngineError, EngineResult, RigidTransform};

fn centroid(points: &[Point3<f32>]) -> Point3<f32> {
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f32)
}

fn cross_covariance(xc: &[Vector3<f32>], yc: &[Vector3<f32>]) -> Matrix3<f32> {
    xc.iter()
        .zip(yc.iter())
        .fold(Matrix3::zeros(), |acc, (x, y)| acc + x * y.transpose())
}

/// Rigid-fit `R, t` minimizing `sum ||R*x_i + t - y_i||^2` (§4.3 Kabsch).
/// Requires at least 3 paired points; fewer is a degenerate fit, not a
/// numerical one, since no rotation is determined by fewer than 3 points.
pub fn kabsch(x: &[Point3<f32>], y: &[Point3<f32>]) -> EngineResult<RigidTransform> {
    if x.len() != y.len() {
        return Err(EngineError::InputMissing(format!(
            "kabsch point count mismatch: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 3 {
        return Err(EngineError::DegenerateInput(format!(
            "kabsch requires at least 3 paired points, got {}",
            x.len()
        )));
    }

    let x_bar = centroid(x);
    let y_bar = centroid(y);
    let xc: Vec<Vector3<f32>> = x.iter().map(|p| p - x_bar).collect();
    let yc: Vec<Vector3<f32>> = y.iter().map(|p| p - y_bar).collect();

    let h = cross_covariance(&xc, &yc);
    let svd = h.svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| EngineError::NumericalFailure("kabsch SVD failed to produce U".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| EngineError::NumericalFailure("kabsch SVD failed to produce V^T".into()))?;
    let v = v_t.transpose();

    let d = (v * u.transpose()).determinant().signum();
    let correction = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, d);
    let rotation = v * correction * u.transpose();
    let translation = y_bar.coords - rotation * x_bar.coords;

    Ok(RigidTransform::new(rotation, translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use pretty_assertions::assert_eq;

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
    fn identity_input_recovers_identity() {
        let pts = cube_points();
        let t = kabsch(&pts, &pts).unwrap();
        assert!(t.orthogonality_error() < 1e-5);
        assert!(t.translation.norm() < 1e-4);
    }

    #[test]
    fn pure_translation_is_recovered_exactly() {
        let src = cube_points();
        let shift = Vector3::new(3.0, -2.0, 5.0);
        let dst: Vec<Point3<f32>> = src.iter().map(|p| p + shift).collect();
        let t = kabsch(&src, &dst).unwrap();
        assert!((t.translation - shift).norm() < 1e-4);
        assert!(t.orthogonality_error() < 1e-5);
    }

    #[test]
    fn pure_rotation_is_recovered() {
        let src = cube_points();
        let r = *Rotation3::from_euler_angles(0.3, 0.5, 0.7).matrix();
        let dst: Vec<Point3<f32>> = src.iter().map(|p| Point3::from(r * p.coords)).collect();
        let t = kabsch(&src, &dst).unwrap();
        let recovered = t.apply_points(&src);
        for (a, b) in recovered.iter().zip(dst.iter()) {
            assert!((a - b).norm() < 1e-3);
        }
        assert!(t.rotation.determinant() > 0.0);
    }

    #[test]
    fn fewer_than_three_points_is_degenerate() {
        let pts = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(
            kabsch(&pts, &pts),
            Err(EngineError::DegenerateInput(
                "kabsch requires at least 3 paired points, got 2".into()
            ))
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let x = cube_points();
        let y = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        assert!(kabsch(&x, &y).is_err());
    }
}
