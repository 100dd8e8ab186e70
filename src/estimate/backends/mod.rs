pub mod synthetic;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, Result};
use crate::estimate::backend::PoseEstimator;

pub use synthetic::{SyntheticConfig, SyntheticEstimator};

#[cfg(feature = "backend-tract")]
pub use tract::TractEstimator;

/// Estimator backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Synthetic,
    Tract,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Synthetic => "synthetic",
            BackendKind::Tract => "tract",
        }
    }

    /// Whether this build can construct the backend.
    pub fn is_available(self) -> bool {
        match self {
            BackendKind::Synthetic => true,
            BackendKind::Tract => cfg!(feature = "backend-tract"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" | "stub" => Ok(BackendKind::Synthetic),
            "tract" => Ok(BackendKind::Tract),
            other => Err(OverlayError::InvalidConfig(format!(
                "unknown estimator backend {:?} (expected synthetic or tract)",
                other
            ))),
        }
    }
}

/// Everything needed to construct an estimator.
#[derive(Clone, Debug)]
pub struct EstimatorSettings {
    pub backend: BackendKind,
    pub model_dir: PathBuf,
    pub synthetic: SyntheticConfig,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model_dir: PathBuf::from("models"),
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Construct the configured estimator backend.
pub fn build_estimator(settings: &EstimatorSettings) -> Result<Box<dyn PoseEstimator>> {
    match settings.backend {
        BackendKind::Synthetic => Ok(Box::new(SyntheticEstimator::new(
            settings.synthetic.clone(),
        ))),
        #[cfg(feature = "backend-tract")]
        BackendKind::Tract => Ok(Box::new(TractEstimator::new(&settings.model_dir))),
        #[cfg(not(feature = "backend-tract"))]
        BackendKind::Tract => Err(OverlayError::InvalidConfig(
            "backend 'tract' requires the backend-tract feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("Synthetic".parse::<BackendKind>().unwrap(), BackendKind::Synthetic);
        assert_eq!("stub".parse::<BackendKind>().unwrap(), BackendKind::Synthetic);
        assert_eq!("tract".parse::<BackendKind>().unwrap(), BackendKind::Tract);
        assert!("onnxruntime".parse::<BackendKind>().is_err());
    }

    #[test]
    fn builds_synthetic_by_default() {
        let estimator = build_estimator(&EstimatorSettings::default()).unwrap();
        assert_eq!(estimator.name(), "synthetic");
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_requires_feature() {
        let settings = EstimatorSettings {
            backend: BackendKind::Tract,
            ..EstimatorSettings::default()
        };
        assert!(!BackendKind::Tract.is_available());
        assert!(build_estimator(&settings).is_err());
    }
}
