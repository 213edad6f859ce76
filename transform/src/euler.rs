use nalgebra::Matrix3;

/// `R = Rz(az) * Ry(ay) * Rx(ax)`, angles in degrees (§4.3 seed generation).
pub fn euler_xyz_to_matrix(ax_deg: f32, ay_deg: f32, az_deg: f32) -> Matrix3<f32> {
    let ax = ax_deg.to_radians();
    let ay = ay_deg.to_radians();
    let az = az_deg.to_radians();
    let (sx, cx) = ax.sin_cos();
    let (sy, cy) = ay.sin_cos();
    let (sz, cz) = az.sin_cos();

    let rx = Matrix3::new(1.0, 0.0, 0.0, 0.0, cx, -sx, 0.0, sx, cx);
    let ry = Matrix3::new(cy, 0.0, sy, 0.0, 1.0, 0.0, -sy, 0.0, cy);
    let rz = Matrix3::new(cz, -sz, 0.0, sz, cz, 0.0, 0.0, 0.0, 1.0);
    rz * ry * rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    

    #[test]
    fn zero_angles_is_identity() {
        let r = euler_xyz_to_matrix(0.0, 0.0, 0.0);
        assert!((r - Matrix3::identity()).norm() < 1e-6);
    }

    #[test]
    fn ninety_about_z_rotates_x_to_y() {
        let r = euler_xyz_to_matrix(0.0, 0.0, 90.0);
        let rotated = r * Vector3::x();
        assert!((rotated - Vector3::y()).norm() < 1e-4);
    }

    #[test]
    fn result_is_always_orthonormal() {
        let r = euler_xyz_to_matrix(23.0, -47.0, 118.0);
        assert!(((r.transpose() * r) - Matrix3::identity()).norm() < 1e-4);
        assert!((r.determinant() - 1.0).abs() < 1e-4);
    }
}
