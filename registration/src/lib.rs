pub mod api;
pub mod fpfh;
pub mod icp;
pub mod manual;
pub mod normals;
pub mod ransac;
pub mod roi;
pub mod suggest;
pub mod telemetry;
pub mod voxel;

pub use api::{
    auto_register, get_profiles, quick_feasibility_check, refine_icp, register_manual,
    similarity_check, suggest_points_api, SimilarityReport,
};
pub use manual::ManualRegistrationReport;
pub use roi::{AttemptDiagnostic, AutoRegisterResult, PrealignMode, SelectionMode, Strategy};
pub use suggest::{SuggestDiagnostics, SuggestParams};
