use std::future::Future;

use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};

/// Owns a spawned task and aborts it when dropped, so a replaced or
/// discarded session cannot keep mutating state.
pub struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(future))
    }

    /// Runs `on_tick` every `period`, the first time one period from now.
    pub fn every<F, Fut>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                on_tick().await;
            }
        })
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Periodic sampling while the session is tracking.
pub struct SamplingTimer {
    period: Duration,
    task: Option<TaskGuard>,
}

impl SamplingTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, task: None }
    }

    /// Any timer already running is cancelled first, so repeated starts
    /// never stack.
    pub fn start<F, Fut>(&mut self, on_tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        self.task = Some(TaskGuard::every(self.period, on_tick));
    }

    pub fn stop(&mut self) {
        self.task = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}
