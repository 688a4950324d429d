use std::sync::Mutex;

/// 摄像头帧（RGBA）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl VideoFrame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp_ms,
            frame_number,
        }
    }

    /// 宿主给的尺寸可能溢出，溢出时为 None
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    pub fn expected_len(&self) -> Option<usize> {
        self.pixel_count().and_then(|p| p.checked_mul(4))
    }

    /// 尺寸有效且缓冲区完整才交给估计器
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0 && self.expected_len() == Some(self.data.len())
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            width: self.width,
            height: self.height,
            timestamp_ms: self.timestamp_ms,
            frame_number: self.frame_number,
        }
    }
}

/// 帧元数据（轻量级，用于日志）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

/// Camera-side collaborator. `None` means no frame is available yet.
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Option<VideoFrame>;
}

/// 宿主推送的最新一帧
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<VideoFrame>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: VideoFrame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl FrameSource for LatestFrame {
    fn current_frame(&self) -> Option<VideoFrame> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

/// 始终返回同一帧，测试用
pub struct StaticFrameSource {
    frame: Option<VideoFrame>,
}

impl StaticFrameSource {
    pub fn ready(width: u32, height: u32) -> Self {
        let data = vec![0u8; width as usize * height as usize * 4];
        Self {
            frame: Some(VideoFrame::new(width, height, data, 0, 0)),
        }
    }

    pub fn empty() -> Self {
        Self { frame: None }
    }
}

impl FrameSource for StaticFrameSource {
    fn current_frame(&self) -> Option<VideoFrame> {
        self.frame.clone()
    }
}
