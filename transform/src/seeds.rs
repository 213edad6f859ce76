use crate::euler::euler_xyz_to_matrix;
use crate::pca::PcaFrame;
use nalgebra::{Matrix3, Point3, Vector3};
use types::RigidTransform;

const FLIP_VARIANTS: [[f32; 3]; 4] = [
    [1.0, 1.0, 1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
];

const SEED_EULERS: [(f32, f32, f32); 6] = [
    (0.0, 0.0, 0.0),
    (0.0, 0.0, 90.0),
    (0.0, 0.0, 180.0),
    (0.0, 0.0, 270.0),
    (0.0, 180.0, 0.0),
    (180.0, 0.0, 0.0),
];

fn diag(d: [f32; 3]) -> Matrix3<f32> {
    Matrix3::new(d[0], 0.0, 0.0, 0.0, d[1], 0.0, 0.0, 0.0, d[2])
}

/// The 24 PCA+Euler seeds: 4 right-handed sign-flip variants of the PCA
/// frame alignment, each composed with 6 seed Euler rotations (§4.3).
pub fn pca_euler_seeds(src: &PcaFrame, dst: &PcaFrame) -> Vec<RigidTransform> {
    let mut seeds = Vec::with_capacity(24);
    for flip in FLIP_VARIANTS {
        let r_pca = dst.axes * diag(flip) * src.axes.transpose();
        for (ax, ay, az) in SEED_EULERS {
            let r_seed = euler_xyz_to_matrix(ax, ay, az);
            let r = r_seed * r_pca;
            let t = dst.centroid.coords - r * src.centroid.coords;
            seeds.push(RigidTransform::new(r, t));
        }
    }
    seeds
}

const ROT_PERTURBS: [(f32, f32, f32); 6] = [
    (8.0, 0.0, 0.0),
    (-8.0, 0.0, 0.0),
    (0.0, 8.0, 0.0),
    (0.0, -8.0, 0.0),
    (0.0, 0.0, 12.0),
    (0.0, 0.0, -12.0),
];

const TRANS_PERTURBS: [(f32, f32, f32); 6] = [
    (0.0, 0.0, 8.0),
    (0.0, 0.0, -8.0),
    (5.0, 0.0, 0.0),
    (-5.0, 0.0, 0.0),
    (0.0, 5.0, 0.0),
    (0.0, -5.0, 0.0),
];

/// Local perturbation seeds around a base transform, used by the multi-seed
/// ICP refiner to escape local minima (§4.3): the base transform plus 6
/// rotation perturbations and 6 translation perturbations, 13 seeds total.
pub fn local_perturbation_seeds(base: &RigidTransform) -> Vec<RigidTransform> {
    let mut seeds = Vec::with_capacity(13);
    seeds.push(*base);
    for (ax, ay, az) in ROT_PERTURBS {
        let p_rotation = euler_xyz_to_matrix(ax, ay, az);
        let perturb = RigidTransform::new(p_rotation, Vector3::zeros());
        seeds.push(perturb.compose(base));
    }
    for (tx, ty, tz) in TRANS_PERTURBS {
        let perturb = RigidTransform::translation_only(Vector3::new(tx, ty, tz));
        seeds.push(perturb.compose(base));
    }
    seeds
}

/// Conservative seeds around the source centroid for jaw/face partial
/// overlap (§4.6): identity plus `3x3x3` Euler angles in `{-10, 0, 10}` deg
/// crossed with Z offsets in `{-5, 0, 5}` mm, 82 seeds total.
pub fn local_centroid_seeds(source_points: &[Point3<f32>]) -> Vec<RigidTransform> {
    const ANGLES: [f32; 3] = [-10.0, 0.0, 10.0];
    const Z_OFFSETS: [f32; 3] = [-5.0, 0.0, 5.0];

    if source_points.is_empty() {
        return vec![RigidTransform::identity()];
    }
    let sum = source_points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    let centroid = sum / source_points.len() as f32;

    let mut seeds = Vec::with_capacity(82);
    seeds.push(RigidTransform::identity());
    for &ax in &ANGLES {
        for &ay in &ANGLES {
            for &az in &ANGLES {
                let r = euler_xyz_to_matrix(ax, ay, az);
                let base_t = centroid - r * centroid;
                for &dz in &Z_OFFSETS {
                    let mut t = base_t;
                    t.z += dz;
                    seeds.push(RigidTransform::new(r, t));
                }
            }
        }
    }
    seeds
}

/// Deterministic uniform-stride cap matching `numpy.linspace(0, n-1, cap,
/// dtype=int)` (§4.6 step 4): selects `cap` evenly spaced indices rather than
/// truncating or sampling randomly.
pub fn uniform_stride_cap<T: Clone>(items: &[T], cap: usize) -> Vec<T> {
    if items.len() <= cap || cap == 0 {
        return items.to_vec();
    }
    if cap == 1 {
        return vec![items[0].clone()];
    }
    (0..cap)
        .map(|i| {
            let idx = (i as f64 * (items.len() - 1) as f64 / (cap - 1) as f64).round() as usize;
            items[idx.min(items.len() - 1)].clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pca_euler_seeds_count_is_24() {
        let frame = PcaFrame {
            centroid: Point3::origin(),
            axes: Matrix3::identity(),
            eigenvalues: Vector3::new(3.0, 2.0, 1.0),
        };
        assert_eq!(pca_euler_seeds(&frame, &frame).len(), 24);
    }

    #[test]
    fn local_perturbation_seeds_count_is_13() {
        let seeds = local_perturbation_seeds(&RigidTransform::identity());
        assert_eq!(seeds.len(), 13);
    }

    #[test]
    fn local_centroid_seeds_count_is_82() {
        let pts = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.0)];
        assert_eq!(local_centroid_seeds(&pts).len(), 82);
    }

    #[test]
    fn uniform_stride_cap_preserves_endpoints() {
        let items: Vec<usize> = (0..200).collect();
        let capped = uniform_stride_cap(&items, 96);
        assert_eq!(capped.len(), 96);
        assert_eq!(*capped.first().unwrap(), 0);
        assert_eq!(*capped.last().unwrap(), 199);
    }

    #[test]
    fn uniform_stride_cap_is_noop_under_capacity() {
        let items: Vec<usize> = (0..10).collect();
        assert_eq!(uniform_stride_cap(&items, 96), items);
    }
}
