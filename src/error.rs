use crate::store::Architecture;

/// Errors surfaced by the overlay kernel.
///
/// Setup-time variants are fatal to `RenderLoop::setup` and bubble to the caller.
/// `Estimation` is the only variant the render loop recovers from on its own.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("camera permission denied: {0}")]
    CameraPermissionDenied(String),

    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("failed to load pose model {architecture}: {reason}")]
    ModelLoad {
        architecture: Architecture,
        reason: String,
    },

    #[error("failed to reconfigure estimator: {0}")]
    Reconfigure(String),

    #[error("pose estimation failed: {0}")]
    Estimation(String),

    #[error("invalid resource url: {0:?}")]
    InvalidResourceUrl(String),

    #[error("failed to load image {url}: {reason}")]
    ImageLoad { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, OverlayError>;

impl OverlayError {
    /// True for failures that abort setup before any loop activity begins.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            OverlayError::CameraPermissionDenied(_)
                | OverlayError::CaptureUnavailable(_)
                | OverlayError::ModelLoad { .. }
                | OverlayError::InvalidResourceUrl(_)
                | OverlayError::ImageLoad { .. }
        )
    }

    /// True when the loop can skip the current tick and keep scheduling.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OverlayError::Estimation(_))
    }
}

/// Render an anyhow chain on one line for embedding in a typed error.
pub(crate) fn chain_message(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
