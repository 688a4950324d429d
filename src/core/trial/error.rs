use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Unknown pose {pose} (known poses: {pose_count})")]
    UnknownPose { pose: usize, pose_count: usize },
    #[error("Video frame not ready")]
    FrameNotReady,
    #[error("Rendering surface unavailable")]
    SurfaceUnavailable,
    #[error("Classifier model not loaded")]
    ModelNotLoaded,
    #[error("Pose estimator error: {0}")]
    Estimator(String),
    #[error("Classifier error: {0}")]
    Classifier(String),
    #[error("Renderer error: {0}")]
    Renderer(String),
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}
