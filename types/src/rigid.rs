use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Tolerance for the orthogonality testable property (§8): `||R^T R - I||_F <= 1e-6`.
pub const ORTHOGONALITY_TOLERANCE: f32 = 1e-5;

/// A rigid transform: rotation `R` with `det(R) = +1`, translation `t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: Matrix3<f32>, translation: Vector3<f32>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn translation_only(translation: Vector3<f32>) -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation,
        }
    }

    /// `||R^T R - I||_F` — zero for a perfect rotation.
    pub fn orthogonality_error(&self) -> f32 {
        let should_be_identity = self.rotation.transpose() * self.rotation;
        (should_be_identity - Matrix3::identity()).norm()
    }

    pub fn is_valid_rotation(&self) -> bool {
        self.orthogonality_error() <= ORTHOGONALITY_TOLERANCE && self.rotation.determinant() > 0.0
    }

    pub fn apply_point(&self, p: &Point3<f32>) -> Point3<f32> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    pub fn apply_points(&self, pts: &[Point3<f32>]) -> Vec<Point3<f32>> {
        pts.iter().map(|p| self.apply_point(p)).collect()
    }

    pub fn apply_vector(&self, v: &Vector3<f32>) -> Vector3<f32> {
        self.rotation * v
    }

    /// `self` composed after `other`: `self.compose(other)` applies `other`
    /// first, then `self` (matrix convention `M_self * M_other`).
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn to_homogeneous(&self) -> Matrix4<f32> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn inverse(&self) -> RigidTransform {
        let r_inv = self.rotation.transpose();
        RigidTransform {
            rotation: r_inv,
            translation: -(r_inv * self.translation),
        }
    }
}

/// Diagnostic-only similarity transform (§3): adds a scalar scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTransform {
    pub scale: f32,
    pub rotation: Matrix3<f32>,
    pub translation: Vector3<f32>,
}

impl SimilarityTransform {
    pub fn apply_point(&self, p: &Point3<f32>) -> Point3<f32> {
        Point3::from(self.scale * (self.rotation * p.coords) + self.translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use pretty_assertions::assert_eq;

    #[test]
    fn identity_is_orthonormal() {
        let t = RigidTransform::identity();
        assert!(t.is_valid_rotation());
        assert_eq!(t.orthogonality_error(), 0.0);
    }

    #[test]
    fn inverse_round_trips() {
        let r = *Rotation3::from_euler_angles(0.1, 0.2, 0.3).matrix();
        let t = RigidTransform::new(r, Vector3::new(1.0, 2.0, 3.0));
        let p = Point3::new(4.0, 5.0, 6.0);
        let back = t.inverse().apply_point(&t.apply_point(&p));
        assert!((back - p).norm() < 1e-5);
    }
}
