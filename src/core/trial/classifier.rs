use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::{info, warn};
use once_cell::sync::OnceCell;

use super::error::TrialError;
use super::keypoint::NormalizedFeatureVector;

/// 姿势分类器（外部模型），输出预测的姿势下标
pub trait PoseClassifier: Send + Sync {
    fn predict(&self, features: NormalizedFeatureVector) -> BoxFuture<'_, Result<usize, TrialError>>;
}

/// 分类器只在启动时加载一次；加载完成前管线不会调用它
#[derive(Default)]
pub struct ModelSlot {
    model: OnceCell<Arc<dyn PoseClassifier>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(model: Arc<dyn PoseClassifier>) -> Self {
        let slot = Self::new();
        slot.load(model);
        slot
    }

    pub fn load(&self, model: Arc<dyn PoseClassifier>) -> bool {
        match self.model.set(model) {
            Ok(()) => {
                info!("✅ Classifier model loaded");
                true
            }
            Err(_) => {
                warn!("⚠️ Classifier model already loaded, ignoring reload");
                false
            }
        }
    }

    pub fn get(&self) -> Option<Arc<dyn PoseClassifier>> {
        self.model.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

pub struct MockPoseClassifier {
    // 按调用序号给出预测结果，None 表示推理失败
    prediction: Box<dyn Fn(u64) -> Option<usize> + Send + Sync>,
    latency: Box<dyn Fn(u64) -> Duration + Send + Sync>,
    calls: AtomicU64,
}

impl MockPoseClassifier {
    pub fn always(pose: usize) -> Self {
        Self::with_pattern(move |_| Some(pose))
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Option<usize> + Send + Sync + 'static,
    {
        Self {
            prediction: Box::new(pattern),
            latency: Box::new(|_| Duration::ZERO),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_pattern(move |_| latency)
    }

    pub fn with_latency_pattern<F>(mut self, pattern: F) -> Self
    where
        F: Fn(u64) -> Duration + Send + Sync + 'static,
    {
        self.latency = Box::new(pattern);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Acquire)
    }
}

impl PoseClassifier for MockPoseClassifier {
    fn predict(&self, _features: NormalizedFeatureVector) -> BoxFuture<'_, Result<usize, TrialError>> {
        let call = self.calls.fetch_add(1, Ordering::AcqRel) + 1;

        Box::pin(async move {
            let latency = (self.latency)(call);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            (self.prediction)(call)
                .ok_or_else(|| TrialError::Classifier(format!("mock failure on call {}", call)))
        })
    }
}
