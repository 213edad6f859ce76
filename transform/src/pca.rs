use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use types::{EngineError, EngineResult};

/// A principal-component frame: columns are eigenvectors of the point set's
/// covariance, ordered by descending eigenvalue, forced right-handed
/// (§4.3 PCA frame).
#[derive(Debug, Clone, Copy)]
pub struct PcaFrame {
    pub centroid: Point3<f32>,
    pub axes: Matrix3<f32>,
    pub eigenvalues: Vector3<f32>,
}

pub fn pca_frame(points: &[Point3<f32>]) -> EngineResult<PcaFrame> {
    if points.len() < 3 {
        return Err(EngineError::DegenerateInput(format!(
            "pca frame requires at least 3 points, got {}",
            points.len()
        )));
    }
    let n = points.len() as f32;
    let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
    let centroid = Point3::from(sum / n);

    let cov = points
        .iter()
        .fold(Matrix3::zeros(), |acc, p| {
            let c = p - centroid;
            acc + c * c.transpose()
        })
        / n;

    let eigen = SymmetricEigen::new(cov);
    let mut order: Vec<usize> = (0..3).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut axes = Matrix3::zeros();
    let mut eigenvalues = Vector3::zeros();
    for (col, &src) in order.iter().enumerate() {
        axes.set_column(col, &eigen.eigenvectors.column(src));
        eigenvalues[col] = eigen.eigenvalues[src];
    }

    if axes.determinant() < 0.0 {
        let flipped = -axes.column(2);
        axes.set_column(2, &flipped);
    }

    Ok(PcaFrame {
        centroid,
        axes,
        eigenvalues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    

    #[test]
    fn frame_is_right_handed() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 0.1),
            Point3::new(-3.0, 0.0, 0.0),
        ];
        let frame = pca_frame(&points).unwrap();
        assert!(frame.axes.determinant() > 0.0);
    }

    #[test]
    fn eigenvalues_are_descending() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(-5.0, 0.1, 0.0),
            Point3::new(2.0, -0.1, 0.0),
            Point3::new(0.0, 0.0, 0.01),
        ];
        let frame = pca_frame(&points).unwrap();
        assert!(frame.eigenvalues[0] >= frame.eigenvalues[1]);
        assert!(frame.eigenvalues[1] >= frame.eigenvalues[2]);
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let points = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(pca_frame(&points).is_err());
    }
}
