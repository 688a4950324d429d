use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::config::TrialConfig;
use super::error::TrialError;
use super::frame::FrameSource;
use super::pipeline::{DetectOutcome, DetectionPipeline, DetectionStats};
use super::state_machine::{CountdownTick, StateAction, StateMachine, TargetPose, TrialState};
use super::timer::Timer;

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// 倒计时与计分读数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSnapshot {
    pub state: TrialState,
    pub target: Option<usize>,
    pub remaining_secs: u32,
    pub scores: Vec<u32>,
}

struct Inner {
    machine: StateMachine,
    countdown: Timer,
    sampling: Timer,
}

struct Shared {
    inner: Mutex<Inner>,
    pipeline: Arc<DetectionPipeline>,
    frames: Arc<dyn FrameSource>,
    config: TrialConfig,
    runtime: Handle,
    status: watch::Sender<TrialSnapshot>,
}

/// 一个训练会话：状态机、两个计时器和检测管线的唯一持有者
///
/// 计时器任务只持有弱引用，每一拍都重新加锁读取当前状态。
/// 停止或倒计时到期后，已经在途的检测仍会完成并计分（软取消），
/// 计入的是发起那一拍时的目标姿势。
pub struct TrialSession {
    shared: Arc<Shared>,
}

impl TrialSession {
    pub fn new(
        config: TrialConfig,
        pipeline: DetectionPipeline,
        frames: Arc<dyn FrameSource>,
        runtime: Handle,
    ) -> Result<Self, TrialError> {
        config.validate()?;

        let machine = StateMachine::new(config.countdown_secs);
        let pipeline = Arc::new(pipeline);
        let initial = TrialSnapshot {
            state: machine.current_state(),
            target: None,
            remaining_secs: machine.remaining_secs(),
            scores: pipeline.scores().snapshot(),
        };
        let (status, _) = watch::channel(initial);

        info!(
            "🧘 TrialSession: created ({} poses, {}s countdown, {}ms sampling)",
            config.pose_count, config.countdown_secs, config.sampling_interval_ms
        );

        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    machine,
                    countdown: Timer::new("countdown"),
                    sampling: Timer::new("sampling"),
                }),
                pipeline,
                frames,
                config,
                runtime,
                status,
            }),
        })
    }

    /// 只在空闲时生效；试验进行中再次开始会被忽略并返回 false
    pub fn request_start(&self, pose: usize) -> Result<bool, TrialError> {
        let pose_count = self.shared.config.pose_count;
        if pose >= pose_count {
            return Err(TrialError::UnknownPose { pose, pose_count });
        }

        let mut inner = self.shared.lock_inner();
        let action = inner.machine.request_start(TargetPose(pose));
        if action == StateAction::Reject {
            info!(
                "🚫 Start for pose {} ignored: trial already {:?}",
                pose,
                inner.machine.current_state()
            );
            return Ok(false);
        }

        info!("▶️ Trial requested for pose {}", pose);
        self.shared.apply(&mut inner, action);
        self.shared.publish(&inner);
        Ok(true)
    }

    pub fn request_stop(&self) -> bool {
        let mut inner = self.shared.lock_inner();
        let action = inner.machine.request_stop();
        if action == StateAction::Reject {
            debug!("Stop ignored: no trial running");
            return false;
        }

        info!("⏹️ Trial stopped");
        self.shared.apply(&mut inner, action);
        self.shared.publish(&inner);
        true
    }

    pub fn state(&self) -> TrialState {
        self.shared.lock_inner().machine.current_state()
    }

    pub fn target(&self) -> Option<TargetPose> {
        self.shared.lock_inner().machine.target()
    }

    pub fn remaining_secs(&self) -> u32 {
        self.shared.lock_inner().machine.remaining_secs()
    }

    pub fn scores(&self) -> Vec<u32> {
        self.shared.pipeline.scores().snapshot()
    }

    pub fn stats(&self) -> DetectionStats {
        self.shared.pipeline.stats()
    }

    pub fn snapshot(&self) -> TrialSnapshot {
        self.shared.snapshot(&self.shared.lock_inner())
    }

    pub fn subscribe(&self) -> watch::Receiver<TrialSnapshot> {
        self.shared.status.subscribe()
    }

    pub fn config(&self) -> &TrialConfig {
        &self.shared.config
    }
}

impl Drop for TrialSession {
    fn drop(&mut self) {
        let mut inner = self.shared.lock_inner();
        inner.countdown.disarm();
        inner.sampling.disarm();
        info!("🗑️ TrialSession: released");
    }
}

impl Shared {
    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(self: &Arc<Self>, inner: &mut Inner, action: StateAction) {
        match action {
            StateAction::ArmCountdown => {
                self.arm_countdown(inner);
            }
            StateAction::ArmSamplingAndCountdown => {
                inner.countdown.disarm();
                self.arm_sampling(inner);
                self.arm_countdown(inner);
            }
            StateAction::DisarmAll => {
                inner.countdown.disarm();
                inner.sampling.disarm();
            }
            StateAction::Reject => {}
        }
    }

    fn arm_countdown(self: &Arc<Self>, inner: &mut Inner) {
        let weak = Arc::downgrade(self);
        inner
            .countdown
            .arm(&self.runtime, COUNTDOWN_PERIOD, move |generation| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_countdown_tick(generation);
                }
            });
    }

    fn arm_sampling(self: &Arc<Self>, inner: &mut Inner) {
        let weak = Arc::downgrade(self);
        inner.sampling.arm(
            &self.runtime,
            self.config.sampling_interval(),
            move |generation| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_sampling_tick(generation);
                }
            },
        );
    }

    fn on_countdown_tick(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock_inner();
        if !inner.countdown.is_current(generation) {
            debug!("Stale countdown tick (gen {})", generation);
            return;
        }

        match inner.machine.countdown_tick() {
            CountdownTick::Running(remaining) => {
                debug!("⏳ {:?}: {}s left", inner.machine.current_state(), remaining);
            }
            CountdownTick::Expired(action) => {
                info!(
                    "⏰ Countdown expired, now {:?}",
                    inner.machine.current_state()
                );
                self.apply(&mut inner, action);
            }
            CountdownTick::Ignored => return,
        }
        self.publish(&inner);
    }

    /// 不等待检测完成；目标姿势在这里取一次，随任务带到结束
    fn on_sampling_tick(self: &Arc<Self>, generation: u64) {
        let target = {
            let inner = self.lock_inner();
            if !inner.sampling.is_current(generation)
                || inner.machine.current_state() != TrialState::Detecting
            {
                return;
            }
            match inner.machine.target() {
                Some(target) => target,
                None => return,
            }
        };

        let frame = self.frames.current_frame();
        let pipeline = Arc::clone(&self.pipeline);
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let outcome = pipeline.detect(frame, target).await;
            if outcome == DetectOutcome::Match {
                if let Some(shared) = weak.upgrade() {
                    shared.publish(&shared.lock_inner());
                }
            }
        });
    }

    fn snapshot(&self, inner: &Inner) -> TrialSnapshot {
        TrialSnapshot {
            state: inner.machine.current_state(),
            target: inner.machine.target().map(|t| t.index()),
            remaining_secs: inner.machine.remaining_secs(),
            scores: self.pipeline.scores().snapshot(),
        }
    }

    fn publish(&self, inner: &Inner) {
        self.status.send_replace(self.snapshot(inner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trial::classifier::{MockPoseClassifier, ModelSlot};
    use crate::core::trial::estimator::MockPoseEstimator;
    use crate::core::trial::frame::StaticFrameSource;
    use crate::core::trial::keypoint::{BodyPart, Keypoint, KeypointSet};
    use crate::core::trial::renderer::MockRenderer;
    use tokio::time::sleep;

    fn pose() -> KeypointSet {
        vec![Keypoint::new(120.0, 80.0, 0.9); BodyPart::COUNT].into()
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    struct Fixture {
        session: TrialSession,
        estimator: Arc<MockPoseEstimator>,
        classifier: Arc<MockPoseClassifier>,
    }

    fn fixture(classifier: MockPoseClassifier) -> Fixture {
        let config = TrialConfig::default();
        let estimator = Arc::new(MockPoseEstimator::new(pose()));
        let classifier = Arc::new(classifier);
        let pipeline = DetectionPipeline::new(
            &config,
            estimator.clone(),
            Arc::new(ModelSlot::loaded(classifier.clone())),
            Arc::new(MockRenderer::new()),
        );
        let session = TrialSession::new(
            config,
            pipeline,
            Arc::new(StaticFrameSource::ready(8, 8)),
            Handle::current(),
        )
        .expect("valid config");

        Fixture {
            session,
            estimator,
            classifier,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_countdown_enters_detecting() {
        let f = fixture(MockPoseClassifier::always(0));
        assert!(f.session.request_start(0).unwrap());
        assert_eq!(f.session.state(), TrialState::PendingStart);
        assert_eq!(f.session.remaining_secs(), 10);

        sleep(ms(3_500)).await;
        assert_eq!(f.session.state(), TrialState::PendingStart);
        assert_eq!(f.session.remaining_secs(), 7);
        assert_eq!(f.estimator.calls(), 0);

        sleep(ms(6_550)).await;
        assert_eq!(f.session.state(), TrialState::Detecting);
        assert_eq!(f.session.remaining_secs(), 10);
        assert_eq!(f.session.target(), Some(TargetPose(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_trial_returns_to_idle() {
        let f = fixture(MockPoseClassifier::always(1));
        f.session.request_start(1).unwrap();

        sleep(ms(20_500)).await;
        assert_eq!(f.session.state(), TrialState::Idle);
        assert_eq!(f.session.target(), None);

        let calls = f.estimator.calls();
        assert!(calls >= 99 && calls <= 100, "calls = {}", calls);
        assert_eq!(f.session.scores()[1] as u64, calls);

        // 到期后不再采样
        sleep(ms(5_000)).await;
        assert_eq!(f.estimator.calls(), calls);
        assert_eq!(f.session.remaining_secs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_detecting() {
        let f = fixture(MockPoseClassifier::always(0));
        f.session.request_start(0).unwrap();

        sleep(ms(10_550)).await;
        assert_eq!(f.session.state(), TrialState::Detecting);
        assert_eq!(f.estimator.calls(), 5);

        assert!(f.session.request_stop());
        assert_eq!(f.session.state(), TrialState::Idle);
        assert_eq!(f.session.remaining_secs(), 10);

        sleep(ms(5_000)).await;
        assert_eq!(f.estimator.calls(), 5);
        assert_eq!(f.session.remaining_secs(), 10);
        assert_eq!(f.session.scores()[0], 5);

        assert!(!f.session.request_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_pending_start() {
        let f = fixture(MockPoseClassifier::always(0));
        f.session.request_start(2).unwrap();

        sleep(ms(4_500)).await;
        assert!(f.session.request_stop());
        assert_eq!(f.session.remaining_secs(), 10);

        sleep(ms(10_000)).await;
        assert_eq!(f.session.state(), TrialState::Idle);
        assert_eq!(f.session.remaining_secs(), 10);
        assert_eq!(f.estimator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejected_while_detecting() {
        let f = fixture(MockPoseClassifier::always(0));
        f.session.request_start(0).unwrap();
        sleep(ms(12_500)).await;
        assert_eq!(f.session.state(), TrialState::Detecting);
        let remaining = f.session.remaining_secs();

        assert!(!f.session.request_start(3).unwrap());
        assert_eq!(f.session.state(), TrialState::Detecting);
        assert_eq!(f.session.target(), Some(TargetPose(0)));
        assert_eq!(f.session.remaining_secs(), remaining);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pose_rejected() {
        let f = fixture(MockPoseClassifier::always(0));
        let result = f.session.request_start(4);
        assert!(matches!(
            result,
            Err(TrialError::UnknownPose {
                pose: 4,
                pose_count: 4
            })
        ));
        assert_eq!(f.session.state(), TrialState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_match_keeps_captured_pose() {
        // 第一次分类很慢，停止并换成姿势 1 之后才返回
        let classifier = MockPoseClassifier::always(0)
            .with_latency_pattern(|n| if n == 1 { ms(500) } else { Duration::ZERO });
        let f = fixture(classifier);
        f.session.request_start(0).unwrap();

        sleep(ms(10_150)).await;
        assert_eq!(f.estimator.calls(), 1);
        assert_eq!(f.classifier.calls(), 1);

        f.session.request_stop();
        assert!(f.session.request_start(1).unwrap());
        assert_eq!(f.session.target(), Some(TargetPose(1)));

        sleep(ms(1_000)).await;
        assert_eq!(f.session.scores(), vec![1, 0, 0, 0]);
        assert_eq!(f.session.state(), TrialState::PendingStart);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_detects_no_double_count() {
        // 推理比采样慢，多个检测同时在途
        let classifier = MockPoseClassifier::always(2).with_latency(ms(350));
        let f = fixture(classifier);
        f.session.request_start(2).unwrap();

        sleep(ms(11_050)).await;
        f.session.request_stop();
        let calls = f.estimator.calls();
        assert_eq!(calls, 10);

        sleep(ms(1_000)).await;
        assert_eq!(f.session.scores()[2] as u64, calls);
        assert_eq!(f.session.stats().matches, calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimator_failures_do_not_stop_sampling() {
        let config = TrialConfig::default();
        let estimator = Arc::new(MockPoseEstimator::new(pose()).with_failures(|n| n % 2 == 0));
        let pipeline = DetectionPipeline::new(
            &config,
            estimator.clone(),
            Arc::new(ModelSlot::loaded(Arc::new(MockPoseClassifier::always(0)))),
            Arc::new(MockRenderer::new()),
        );
        let session = TrialSession::new(
            config,
            pipeline,
            Arc::new(StaticFrameSource::ready(8, 8)),
            Handle::current(),
        )
        .unwrap();

        session.request_start(0).unwrap();
        sleep(ms(11_050)).await;

        assert_eq!(session.state(), TrialState::Detecting);
        assert_eq!(estimator.calls(), 10);
        assert_eq!(session.scores()[0], 5);
        assert_eq!(session.stats().skipped, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_frames_skip_silently() {
        let config = TrialConfig::default();
        let estimator = Arc::new(MockPoseEstimator::new(pose()));
        let pipeline = DetectionPipeline::new(
            &config,
            estimator.clone(),
            Arc::new(ModelSlot::loaded(Arc::new(MockPoseClassifier::always(0)))),
            Arc::new(MockRenderer::new()),
        );
        let session = TrialSession::new(
            config,
            pipeline,
            Arc::new(StaticFrameSource::empty()),
            Handle::current(),
        )
        .unwrap();

        session.request_start(0).unwrap();
        sleep(ms(10_550)).await;

        assert_eq!(session.state(), TrialState::Detecting);
        assert_eq!(estimator.calls(), 0);
        assert_eq!(session.stats().skipped, 5);
        assert_eq!(session.scores()[0], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_countdown_and_transition() {
        let f = fixture(MockPoseClassifier::always(0));
        let mut rx = f.session.subscribe();
        assert_eq!(rx.borrow().state, TrialState::Idle);

        f.session.request_start(0).unwrap();
        let snapshot = rx
            .wait_for(|s| s.state == TrialState::Detecting)
            .await
            .expect("session alive")
            .clone();

        assert_eq!(snapshot.remaining_secs, 10);
        assert_eq!(snapshot.target, Some(0));
        assert_eq!(f.session.snapshot().state, TrialState::Detecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scores_accumulate_across_trials() {
        let mut config = TrialConfig::default();
        config.countdown_secs = 1;
        let estimator = Arc::new(MockPoseEstimator::new(pose()));
        let pipeline = DetectionPipeline::new(
            &config,
            estimator,
            Arc::new(ModelSlot::loaded(Arc::new(MockPoseClassifier::with_pattern(
                |_| Some(1),
            )))),
            Arc::new(MockRenderer::new()),
        );
        let session = TrialSession::new(
            config,
            pipeline,
            Arc::new(StaticFrameSource::ready(8, 8)),
            Handle::current(),
        )
        .unwrap();

        session.request_start(1).unwrap();
        sleep(ms(1_550)).await;
        session.request_stop();
        let first = session.scores()[1];
        assert_eq!(first, 5);

        session.request_start(1).unwrap();
        sleep(ms(1_550)).await;
        session.request_stop();
        assert_eq!(session.scores()[1], first * 2);
    }
}
