pub mod curvature;
pub mod heap;
pub mod kdtree;
pub mod nn;
pub mod sampling;

pub use curvature::sample_curvature;
pub use kdtree::KdTree;
pub use nn::{closest_point_on_mesh, knn_batch, nearest, radius_batch};
pub use sampling::sample_points_with_normals;
