use serde::{Deserialize, Serialize};

/// 分类器训练时使用的坐标缩放常数
pub const NORMALIZATION_SCALE: f32 = 400.0;

/// PoseNet 的 17 个关键点，顺序与估计器输出一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BodyPart {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl BodyPart {
    pub const COUNT: usize = 17;
}

/// 骨架连线（两端都足够可信时才绘制）
pub const SKELETON_CONNECTIONS: [(BodyPart, BodyPart); 12] = [
    (BodyPart::LeftHip, BodyPart::LeftShoulder),
    (BodyPart::LeftElbow, BodyPart::LeftShoulder),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightShoulder),
    (BodyPart::RightElbow, BodyPart::RightShoulder),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftHip, BodyPart::RightHip),
];

/// 单个关键点，坐标为像素值
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkeletonSegment {
    pub from: Keypoint,
    pub to: Keypoint,
}

/// 一帧的估计结果，只在单次检测内存活
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointSet {
    keypoints: Vec<Keypoint>,
}

impl KeypointSet {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn get(&self, part: BodyPart) -> Option<&Keypoint> {
        self.keypoints.get(part as usize)
    }

    /// 展平为 [x0, y0, x1, y1, ...] 并除以缩放常数，置信度不参与
    pub fn normalize(&self) -> NormalizedFeatureVector {
        let features = self
            .keypoints
            .iter()
            .flat_map(|k| [k.x / NORMALIZATION_SCALE, k.y / NORMALIZATION_SCALE])
            .collect();
        NormalizedFeatureVector(features)
    }

    pub fn confident_points(&self, min_confidence: f32) -> Vec<Keypoint> {
        self.keypoints
            .iter()
            .copied()
            .filter(|k| k.is_valid(min_confidence))
            .collect()
    }

    /// 相邻关键点连线；任意一端低于阈值或缺失则跳过
    pub fn skeleton_segments(&self, min_confidence: f32) -> Vec<SkeletonSegment> {
        SKELETON_CONNECTIONS
            .iter()
            .filter_map(|&(a, b)| {
                let from = self.get(a)?;
                let to = self.get(b)?;
                if from.is_valid(min_confidence) && to.is_valid(min_confidence) {
                    Some(SkeletonSegment {
                        from: *from,
                        to: *to,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

impl From<Vec<Keypoint>> for KeypointSet {
    fn from(keypoints: Vec<Keypoint>) -> Self {
        Self::new(keypoints)
    }
}

/// 分类器输入
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeatureVector(Vec<f32>);

impl NormalizedFeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}
