//! 姿势跟练会话

use crate::core::trial::{
    DetectionPipeline, DetectionStats, EstimateOptions, Keypoint, KeypointSet, LatestFrame,
    ModelSlot, NormalizedFeatureVector, PoseClassifier, PoseEstimator, SkeletonRenderer,
    SkeletonSegment, TrialConfig, TrialError, TrialSession, TrialSnapshot, VideoFrame,
};
use flutter_rust_bridge::{frb, DartFnFuture};
use futures::future::BoxFuture;
use log::info;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};

/// 所有会话共用一个单工作线程的运行时，计时器和推理回调都在上面调度
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> Result<&'static Runtime, TrialError> {
    RUNTIME.get_or_try_init(|| {
        info!("🔧 Starting pose-trial runtime");
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pose-trial")
            .enable_time()
            .build()?;
        Ok(runtime)
    })
}

/// 交给 Dart 绘制的骨架叠加层
#[derive(Debug, Clone)]
pub struct SkeletonOverlay {
    pub points: Vec<Keypoint>,
    pub segments: Vec<SkeletonSegment>,
}

/// 姿势跟练会话
///
/// ```dart
/// final trial = await PoseTrial.create(
///   configJson: null,
///   estimate: (frame, flip) => poseNet.estimate(frame, flip),
///   drawOverlay: (overlay) async => painter.update(overlay),
/// );
/// await trial.attachClassifier(predict: (features) => model.predict(features));
/// trial.pushFrame(frame: cameraFrame);
/// trial.start(pose: 2);
/// final snapshot = trial.snapshot;
/// ```
#[frb(opaque)]
pub struct PoseTrial {
    session: TrialSession,
    frames: Arc<LatestFrame>,
    classifier: Arc<ModelSlot>,
    overlay: Arc<DartOverlay>,
}

impl PoseTrial {
    /// 创建会话；config_json 为空时使用默认配置
    #[frb]
    pub fn create(
        config_json: Option<String>,
        estimate: impl Fn(VideoFrame, bool) -> DartFnFuture<Option<Vec<Keypoint>>>
            + Send
            + Sync
            + 'static,
        draw_overlay: impl Fn(SkeletonOverlay) -> DartFnFuture<()> + Send + Sync + 'static,
    ) -> Result<Self, TrialError> {
        crate::init_logging();

        let config = match config_json {
            Some(json) => TrialConfig::from_json(&json)?,
            None => TrialConfig::default(),
        };
        let handle = runtime()?.handle().clone();

        let frames = Arc::new(LatestFrame::new());
        let classifier = Arc::new(ModelSlot::new());
        let overlay = Arc::new(DartOverlay {
            draw: Box::new(draw_overlay),
            surface_ready: AtomicBool::new(true),
            runtime: handle.clone(),
        });
        let pipeline = DetectionPipeline::new(
            &config,
            Arc::new(DartEstimator {
                estimate: Box::new(estimate),
            }),
            classifier.clone(),
            overlay.clone(),
        );
        let session = TrialSession::new(config, pipeline, frames.clone(), handle)?;

        info!("🧘 PoseTrial: created");
        Ok(Self {
            session,
            frames,
            classifier,
            overlay,
        })
    }

    /// 分类器模型加载完成后调用一次；重复调用返回 false
    #[frb]
    pub fn attach_classifier(
        &self,
        predict: impl Fn(Vec<f32>) -> DartFnFuture<Option<u32>> + Send + Sync + 'static,
    ) -> bool {
        self.classifier.load(Arc::new(DartClassifier {
            predict: Box::new(predict),
        }))
    }

    #[frb(sync)]
    pub fn push_frame(&self, frame: VideoFrame) {
        self.frames.push(frame)
    }

    /// 画布被移除 / 重新挂载
    #[frb(sync)]
    pub fn set_surface_ready(&self, ready: bool) {
        self.overlay.surface_ready.store(ready, Ordering::Release);
    }

    #[frb(sync)]
    pub fn start(&self, pose: u32) -> Result<bool, TrialError> {
        self.session.request_start(pose as usize)
    }

    #[frb(sync)]
    pub fn stop(&self) -> bool {
        self.session.request_stop()
    }

    #[frb(sync, getter)]
    pub fn snapshot(&self) -> TrialSnapshot {
        self.session.snapshot()
    }

    #[frb(sync, getter)]
    pub fn stats(&self) -> DetectionStats {
        self.session.stats()
    }

    #[frb(sync, getter)]
    pub fn classifier_loaded(&self) -> bool {
        self.classifier.is_loaded()
    }
}

impl Drop for PoseTrial {
    fn drop(&mut self) {
        info!("🗑️ PoseTrial: released");
    }
}

type EstimateFn = dyn Fn(VideoFrame, bool) -> DartFnFuture<Option<Vec<Keypoint>>> + Send + Sync;
type PredictFn = dyn Fn(Vec<f32>) -> DartFnFuture<Option<u32>> + Send + Sync;
type DrawFn = dyn Fn(SkeletonOverlay) -> DartFnFuture<()> + Send + Sync;

struct DartEstimator {
    estimate: Box<EstimateFn>,
}

impl PoseEstimator for DartEstimator {
    fn estimate(
        &self,
        frame: VideoFrame,
        options: EstimateOptions,
    ) -> BoxFuture<'_, Result<KeypointSet, TrialError>> {
        let pending = (self.estimate)(frame, options.flip_horizontal);
        Box::pin(async move {
            pending
                .await
                .map(KeypointSet::new)
                .ok_or_else(|| TrialError::Estimator("no pose returned".to_string()))
        })
    }
}

struct DartClassifier {
    predict: Box<PredictFn>,
}

impl PoseClassifier for DartClassifier {
    fn predict(&self, features: NormalizedFeatureVector) -> BoxFuture<'_, Result<usize, TrialError>> {
        let pending = (self.predict)(features.into_inner());
        Box::pin(async move {
            pending
                .await
                .map(|pose| pose as usize)
                .ok_or_else(|| TrialError::Classifier("no prediction returned".to_string()))
        })
    }
}

struct DartOverlay {
    draw: Box<DrawFn>,
    surface_ready: AtomicBool,
    runtime: Handle,
}

impl SkeletonRenderer for DartOverlay {
    fn is_available(&self) -> bool {
        self.surface_ready.load(Ordering::Acquire)
    }

    fn draw(&self, keypoints: &KeypointSet, min_confidence: f32) -> Result<(), TrialError> {
        let overlay = SkeletonOverlay {
            points: keypoints.confident_points(min_confidence),
            segments: keypoints.skeleton_segments(min_confidence),
        };
        // 不等待 Dart 端绘制完成
        self.runtime.spawn((self.draw)(overlay));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trial::{BodyPart, TrialState};
    use std::sync::atomic::AtomicU64;
    use std::thread;
    use std::time::{Duration, Instant};

    fn estimate_fn() -> impl Fn(VideoFrame, bool) -> DartFnFuture<Option<Vec<Keypoint>>> + Send + Sync
    {
        |_frame: VideoFrame, _flip: bool| -> DartFnFuture<Option<Vec<Keypoint>>> {
            Box::pin(async { Some(vec![Keypoint::new(100.0, 100.0, 0.9); BodyPart::COUNT]) })
        }
    }

    #[test]
    fn test_create_rejects_bad_config() {
        let result = PoseTrial::create(
            Some(r#"{ "pose_count": 0 }"#.to_string()),
            estimate_fn(),
            |_| Box::pin(async {}),
        );
        assert!(matches!(result, Err(TrialError::InvalidConfig(_))));
    }

    #[test]
    fn test_classifier_attached_once() {
        let trial = PoseTrial::create(None, estimate_fn(), |_| Box::pin(async {})).unwrap();
        assert!(!trial.classifier_loaded());

        assert!(trial.attach_classifier(|_| Box::pin(async { Some(0) })));
        assert!(!trial.attach_classifier(|_| Box::pin(async { Some(1) })));
        assert!(trial.classifier_loaded());
    }

    #[test]
    fn test_trial_scores_through_dart_callbacks() {
        let overlays = Arc::new(AtomicU64::new(0));
        let drawn = overlays.clone();
        let trial = PoseTrial::create(
            Some(r#"{ "countdown_secs": 2, "sampling_interval_ms": 50 }"#.to_string()),
            estimate_fn(),
            move |overlay| {
                assert_eq!(overlay.segments.len(), 12);
                drawn.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            },
        )
        .unwrap();
        trial.attach_classifier(|features| {
            assert_eq!(features.len(), BodyPart::COUNT * 2);
            Box::pin(async { Some(1) })
        });
        trial.push_frame(VideoFrame::new(4, 4, vec![0u8; 64], 0, 1));

        assert!(trial.start(1).unwrap());

        // 真实时钟：轮询到第一次命中，上限留足余量
        let deadline = Instant::now() + Duration::from_secs(10);
        while trial.snapshot().scores[1] == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        let snapshot = trial.snapshot();
        assert!(snapshot.scores[1] > 0);
        assert_ne!(snapshot.state, TrialState::PendingStart);
        assert!(overlays.load(Ordering::SeqCst) > 0);

        trial.stop();
        assert_eq!(trial.snapshot().state, TrialState::Idle);
    }
}
