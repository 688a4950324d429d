//! 姿势跟练试验引擎
//!
//! 1. 状态机 - 空闲 → 准备倒计时 → 检测 → 空闲
//! 2. 双计时器 - 每秒倒计时 + 固定间隔采样，只由会话启停
//! 3. 检测管线 - 关键点估计 → 归一化 → 分类 → 比较目标姿势
//! 4. 计分板 - 每个姿势的累计命中次数

pub mod classifier;
pub mod config;
pub mod error;
pub mod estimator;
pub mod frame;
pub mod keypoint;
pub mod pipeline;
pub mod renderer;
pub mod score;
pub mod session;
pub mod state_machine;
pub mod timer;

pub use classifier::{MockPoseClassifier, ModelSlot, PoseClassifier};
pub use config::TrialConfig;
pub use error::TrialError;
pub use estimator::{EstimateOptions, MockPoseEstimator, PoseEstimator};
pub use frame::{FrameInfo, FrameSource, LatestFrame, StaticFrameSource, VideoFrame};
pub use keypoint::{
    BodyPart, Keypoint, KeypointSet, NormalizedFeatureVector, SkeletonSegment, NORMALIZATION_SCALE,
};
pub use pipeline::{DetectOutcome, DetectionPipeline, DetectionStats, SkipReason};
pub use renderer::{HeadlessRenderer, MockRenderer, SkeletonRenderer};
pub use score::ScoreBoard;
pub use session::{TrialSession, TrialSnapshot};
pub use state_machine::{StateAction, StateMachine, TargetPose, TrialState};
