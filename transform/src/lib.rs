pub mod euler;
pub mod kabsch;
pub mod pca;
pub mod seeds;
pub mod umeyama;

pub use euler::euler_xyz_to_matrix;
pub use kabsch::kabsch;
pub use pca::{pca_frame, PcaFrame};
pub use seeds::{local_centroid_seeds, local_perturbation_seeds, pca_euler_seeds, uniform_stride_cap};
pub use umeyama::umeyama;
