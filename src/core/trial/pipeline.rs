use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::classifier::ModelSlot;
use super::config::TrialConfig;
use super::error::TrialError;
use super::estimator::{EstimateOptions, PoseEstimator};
use super::frame::VideoFrame;
use super::renderer::SkeletonRenderer;
use super::score::ScoreBoard;
use super::state_machine::TargetPose;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FrameNotReady,
    SurfaceUnavailable,
    ModelNotLoaded,
    EstimatorFailed,
    ClassifierFailed,
    Other,
}

impl From<&TrialError> for SkipReason {
    fn from(err: &TrialError) -> Self {
        match err {
            TrialError::FrameNotReady => SkipReason::FrameNotReady,
            TrialError::SurfaceUnavailable => SkipReason::SurfaceUnavailable,
            TrialError::ModelNotLoaded => SkipReason::ModelNotLoaded,
            TrialError::Estimator(_) => SkipReason::EstimatorFailed,
            TrialError::Classifier(_) => SkipReason::ClassifierFailed,
            TrialError::InvalidConfig(_)
            | TrialError::Config(_)
            | TrialError::UnknownPose { .. }
            | TrialError::Renderer(_)
            | TrialError::Runtime(_) => SkipReason::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectOutcome {
    Match,
    NoMatch,
    Skipped(SkipReason),
}

/// 检测统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub ticks: u64,
    pub matches: u64,
    pub misses: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct StatsCounters {
    ticks: AtomicU64,
    matches: AtomicU64,
    misses: AtomicU64,
    skipped: AtomicU64,
}

/// 帧 → 关键点 → 归一化特征 → 分类 → 与目标姿势比较
///
/// 每次调用只依赖传入的帧和目标姿势，不读取会话状态；
/// 多个调用可以同时在途，命中时各自给计分板加一。
pub struct DetectionPipeline {
    estimator: Arc<dyn PoseEstimator>,
    classifier: Arc<ModelSlot>,
    renderer: Arc<dyn SkeletonRenderer>,
    scores: Arc<ScoreBoard>,
    options: EstimateOptions,
    min_part_confidence: f32,
    stats: StatsCounters,
}

impl DetectionPipeline {
    pub fn new(
        config: &TrialConfig,
        estimator: Arc<dyn PoseEstimator>,
        classifier: Arc<ModelSlot>,
        renderer: Arc<dyn SkeletonRenderer>,
    ) -> Self {
        Self {
            estimator,
            classifier,
            renderer,
            scores: Arc::new(ScoreBoard::new(config.pose_count)),
            options: EstimateOptions {
                flip_horizontal: config.flip_horizontal,
            },
            min_part_confidence: config.min_part_confidence,
            stats: StatsCounters::default(),
        }
    }

    pub async fn detect(&self, frame: Option<VideoFrame>, target: TargetPose) -> DetectOutcome {
        self.stats.ticks.fetch_add(1, Ordering::AcqRel);

        let outcome = match self.run(frame, target).await {
            Ok(true) => {
                self.scores.record_match(target);
                self.stats.matches.fetch_add(1, Ordering::AcqRel);
                DetectOutcome::Match
            }
            Ok(false) => {
                self.stats.misses.fetch_add(1, Ordering::AcqRel);
                DetectOutcome::NoMatch
            }
            Err(e) => {
                match e {
                    TrialError::Estimator(_) | TrialError::Classifier(_) => {
                        warn!("⚠️ Detection skipped: {}", e)
                    }
                    _ => debug!("Detection skipped: {}", e),
                }
                self.stats.skipped.fetch_add(1, Ordering::AcqRel);
                DetectOutcome::Skipped(SkipReason::from(&e))
            }
        };

        debug!("🎯 target {} -> {:?}", target.index(), outcome);
        outcome
    }

    async fn run(&self, frame: Option<VideoFrame>, target: TargetPose) -> Result<bool, TrialError> {
        let frame = frame
            .filter(VideoFrame::is_ready)
            .ok_or(TrialError::FrameNotReady)?;
        if !self.renderer.is_available() {
            return Err(TrialError::SurfaceUnavailable);
        }
        let classifier = self.classifier.get().ok_or(TrialError::ModelNotLoaded)?;

        let info = frame.info();
        let keypoints = self.estimator.estimate(frame, self.options).await?;
        debug!(
            "Frame {} ({}x{}): {} keypoints",
            info.frame_number,
            info.width,
            info.height,
            keypoints.len()
        );

        let features = keypoints.normalize();

        if let Err(e) = self.renderer.draw(&keypoints, self.min_part_confidence) {
            debug!("Overlay draw failed: {}", e);
        }

        let predicted = classifier.predict(features).await?;
        Ok(predicted == target.index())
    }

    pub fn scores(&self) -> &Arc<ScoreBoard> {
        &self.scores
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats {
            ticks: self.stats.ticks.load(Ordering::Acquire),
            matches: self.stats.matches.load(Ordering::Acquire),
            misses: self.stats.misses.load(Ordering::Acquire),
            skipped: self.stats.skipped.load(Ordering::Acquire),
        }
    }

    pub fn classifier(&self) -> &Arc<ModelSlot> {
        &self.classifier
    }
}
