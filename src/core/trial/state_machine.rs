use serde::{Deserialize, Serialize};

/// 用户需要做出的姿势（分类器输出的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetPose(pub usize);

impl TargetPose {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Idle,
    PendingStart,
    Detecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEvent {
    Start(TargetPose),
    CountdownExpired,
    Stop,
}

/// 状态迁移后计时器要做的事，由会话执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    ArmCountdown,
    ArmSamplingAndCountdown,
    DisarmAll,
    Reject,
}

impl TrialState {
    pub fn transition(&self, event: TrialEvent) -> (TrialState, StateAction) {
        match (self, event) {
            (TrialState::Idle, TrialEvent::Start(_)) => {
                (TrialState::PendingStart, StateAction::ArmCountdown)
            }
            (TrialState::PendingStart, TrialEvent::CountdownExpired) => {
                (TrialState::Detecting, StateAction::ArmSamplingAndCountdown)
            }
            (TrialState::Detecting, TrialEvent::CountdownExpired) => {
                (TrialState::Idle, StateAction::DisarmAll)
            }
            (TrialState::PendingStart | TrialState::Detecting, TrialEvent::Stop) => {
                (TrialState::Idle, StateAction::DisarmAll)
            }
            (state, _) => (*state, StateAction::Reject),
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, TrialState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    Running(u32),
    /// 归零，已执行对应阶段的到期处理
    Expired(StateAction),
    Ignored,
}

/// 试验状态 + 目标姿势 + 剩余秒数，不含任何计时器
pub struct StateMachine {
    state: TrialState,
    target: Option<TargetPose>,
    remaining: u32,
    duration: u32,
    transition_counter: u64,
}

impl StateMachine {
    pub fn new(duration: u32) -> Self {
        Self {
            state: TrialState::Idle,
            target: None,
            remaining: duration,
            duration,
            transition_counter: 0,
        }
    }

    pub fn request_start(&mut self, pose: TargetPose) -> StateAction {
        let (next, action) = self.state.transition(TrialEvent::Start(pose));
        if action == StateAction::Reject {
            return action;
        }
        self.target = Some(pose);
        self.remaining = self.duration;
        self.apply(next);
        action
    }

    pub fn on_pending_countdown_expired(&mut self) -> StateAction {
        if self.state != TrialState::PendingStart {
            return StateAction::Reject;
        }
        let (next, action) = self.state.transition(TrialEvent::CountdownExpired);
        self.remaining = self.duration;
        self.apply(next);
        action
    }

    pub fn on_detecting_countdown_expired(&mut self) -> StateAction {
        if self.state != TrialState::Detecting {
            return StateAction::Reject;
        }
        let (next, action) = self.state.transition(TrialEvent::CountdownExpired);
        self.target = None;
        self.apply(next);
        action
    }

    pub fn request_stop(&mut self) -> StateAction {
        let (next, action) = self.state.transition(TrialEvent::Stop);
        if action == StateAction::Reject {
            return action;
        }
        self.target = None;
        self.remaining = self.duration;
        self.apply(next);
        action
    }

    /// 倒计时每秒调用一次。减到零时触发当前阶段的到期处理，且只触发一次。
    pub fn countdown_tick(&mut self) -> CountdownTick {
        if !self.state.is_running() || self.remaining == 0 {
            return CountdownTick::Ignored;
        }

        self.remaining -= 1;
        if self.remaining > 0 {
            return CountdownTick::Running(self.remaining);
        }

        let action = match self.state {
            TrialState::PendingStart => self.on_pending_countdown_expired(),
            TrialState::Detecting => self.on_detecting_countdown_expired(),
            TrialState::Idle => StateAction::Reject,
        };
        CountdownTick::Expired(action)
    }

    fn apply(&mut self, next: TrialState) {
        self.state = next;
        self.transition_counter += 1;
    }

    pub fn current_state(&self) -> TrialState {
        self.state
    }

    pub fn target(&self) -> Option<TargetPose> {
        self.target
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_counter
    }
}
