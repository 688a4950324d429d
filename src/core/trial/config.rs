use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::TrialError;

/// 一次试验的参数
///
/// 所有字段都有默认值，JSON 里只写需要覆盖的部分即可：
///
/// ```ignore
/// let config = TrialConfig::from_json(r#"{ "countdown_secs": 5, "pose_count": 3 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    /// 每个倒计时阶段（准备 / 检测）的秒数
    pub countdown_secs: u32,
    /// 采样间隔（毫秒）
    pub sampling_interval_ms: u64,
    /// 分类器认识的姿势数量，决定计分板大小
    pub pose_count: usize,
    /// 骨架叠加层的关键点置信度阈值
    pub min_part_confidence: f32,
    /// 前置摄像头需要水平镜像
    pub flip_horizontal: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 10,
            sampling_interval_ms: 100,
            pose_count: 4,
            min_part_confidence: 0.5,
            flip_horizontal: true,
        }
    }
}

impl TrialConfig {
    /// Short countdown for a quick practice round.
    pub fn for_warmup() -> Self {
        Self {
            countdown_secs: 3,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, TrialError> {
        let config: TrialConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrialError> {
        if self.countdown_secs == 0 {
            return Err(TrialError::InvalidConfig(
                "countdown_secs must be > 0".to_string(),
            ));
        }
        if self.sampling_interval_ms == 0 {
            return Err(TrialError::InvalidConfig(
                "sampling_interval_ms must be > 0".to_string(),
            ));
        }
        if self.pose_count == 0 {
            return Err(TrialError::InvalidConfig(
                "pose_count must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_part_confidence) {
            return Err(TrialError::InvalidConfig(format!(
                "min_part_confidence must be within [0, 1], got {}",
                self.min_part_confidence
            )));
        }
        Ok(())
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }
}
