use std::time::Duration;

use log::debug;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// 周期触发器，只由会话启停
///
/// 每次启动都会换一个新的代号（generation），回调收到的代号与当前代号不一致时
/// 说明这一拍来自已经停掉的旧任务，调用方应直接忽略。
pub struct Timer {
    name: &'static str,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            task: None,
        }
    }

    /// 第一拍在一个周期之后；已在运行则先停掉旧任务
    pub fn arm<F>(&mut self, runtime: &Handle, period: Duration, on_tick: F) -> u64
    where
        F: Fn(u64) + Send + 'static,
    {
        self.disarm();
        self.generation += 1;

        let generation = self.generation;
        let start = Instant::now() + period;
        let task = runtime.spawn(async move {
            let mut ticker = time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                on_tick(generation);
            }
        });

        debug!("⏱️ {} timer armed (gen {}, every {:?})", self.name, generation, period);
        self.task = Some(task);
        generation
    }

    /// 可重复调用
    pub fn disarm(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                debug!("⏹️ {} timer disarmed (gen {})", self.name, self.generation);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && self.generation == generation
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.disarm();
    }
}
