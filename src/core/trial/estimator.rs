use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;

use super::error::TrialError;
use super::frame::VideoFrame;
use super::keypoint::KeypointSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimateOptions {
    pub flip_horizontal: bool,
}

/// 单人关键点估计（外部模型）
///
/// 帧没准备好时可以直接返回错误，管线会把这一拍记为跳过。
pub trait PoseEstimator: Send + Sync {
    fn estimate(
        &self,
        frame: VideoFrame,
        options: EstimateOptions,
    ) -> BoxFuture<'_, Result<KeypointSet, TrialError>>;
}

pub struct MockPoseEstimator {
    keypoints: KeypointSet,
    latency: Duration,
    failure_pattern: Option<Box<dyn Fn(u64) -> bool + Send + Sync>>,
    calls: AtomicU64,
    last_flip: AtomicBool,
}

impl MockPoseEstimator {
    pub fn new(keypoints: KeypointSet) -> Self {
        Self {
            keypoints,
            latency: Duration::ZERO,
            failure_pattern: None,
            calls: AtomicU64::new(0),
            last_flip: AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 按调用序号（从 1 开始）决定是否失败
    pub fn with_failures<F>(mut self, pattern: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        self.failure_pattern = Some(Box::new(pattern));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }

    pub fn last_flip(&self) -> bool {
        self.last_flip.load(Ordering::Acquire)
    }
}

impl PoseEstimator for MockPoseEstimator {
    fn estimate(
        &self,
        _frame: VideoFrame,
        options: EstimateOptions,
    ) -> BoxFuture<'_, Result<KeypointSet, TrialError>> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_flip
            .store(options.flip_horizontal, Ordering::Release);

        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let failed = self
                .failure_pattern
                .as_ref()
                .map(|p| p(call))
                .unwrap_or(false);
            if failed {
                return Err(TrialError::Estimator(format!(
                    "mock failure on call {}",
                    call
                )));
            }
            Ok(self.keypoints.clone())
        })
    }
}
