//! Pose estimation adapter and backends.

mod backend;
pub mod backends;
pub mod decode;

pub use backend::{EstimatorHandle, InputParams, MultiParams, PoseEstimator};
pub use backends::{
    build_estimator, BackendKind, EstimatorSettings, SyntheticConfig, SyntheticEstimator,
};

#[cfg(feature = "backend-tract")]
pub use backends::TractEstimator;
