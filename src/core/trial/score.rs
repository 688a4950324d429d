use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;

use super::state_machine::TargetPose;

/// 每个姿势的累计命中次数，整个会话内不清零
///
/// 只有 `record_match` 能修改计数；重叠的检测回调各自做一次原子加一，不会丢失更新。
pub struct ScoreBoard {
    counts: Vec<AtomicU32>,
}

impl ScoreBoard {
    pub fn new(pose_count: usize) -> Self {
        Self {
            counts: (0..pose_count).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn pose_count(&self) -> usize {
        self.counts.len()
    }

    pub fn record_match(&self, pose: TargetPose) -> bool {
        match self.counts.get(pose.index()) {
            Some(count) => {
                count.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => {
                warn!("⚠️ ScoreBoard: match for unknown pose {}", pose.index());
                false
            }
        }
    }

    pub fn score(&self, pose: TargetPose) -> u32 {
        self.counts
            .get(pose.index())
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .collect()
    }
}
