use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::error::TrialError;
use super::keypoint::KeypointSet;

/// 骨架叠加层绘制（外部），失败不影响计分
pub trait SkeletonRenderer: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    fn draw(&self, keypoints: &KeypointSet, min_confidence: f32) -> Result<(), TrialError>;
}

/// No overlay at all.
pub struct HeadlessRenderer;

impl SkeletonRenderer for HeadlessRenderer {
    fn draw(&self, _keypoints: &KeypointSet, _min_confidence: f32) -> Result<(), TrialError> {
        Ok(())
    }
}

pub struct MockRenderer {
    available: AtomicBool,
    failing: bool,
    draws: AtomicU64,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            failing: false,
            draws: AtomicU64::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Acquire)
    }
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SkeletonRenderer for MockRenderer {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn draw(&self, _keypoints: &KeypointSet, _min_confidence: f32) -> Result<(), TrialError> {
        self.draws.fetch_add(1, Ordering::AcqRel);
        if self.failing {
            return Err(TrialError::Renderer("mock canvas lost".to_string()));
        }
        Ok(())
    }
}
