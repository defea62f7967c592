//! Fluent configuration for a scheduled task.

use super::task::{ScheduledTask, TaskContext};
use super::SchedulerShared;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Pending configuration for one named task; nothing is armed until
/// [`schedule`](TaskBuilder::schedule).
pub struct TaskBuilder {
    shared: Arc<SchedulerShared>,
    name: String,
    body: Box<dyn Fn(&TaskContext) + Send + Sync>,
    delay: Duration,
    repeat: Duration,
}

impl TaskBuilder {
    pub(crate) fn new(
        shared: Arc<SchedulerShared>,
        name: String,
        body: Box<dyn Fn(&TaskContext) + Send + Sync>,
    ) -> Self {
        Self {
            shared,
            name,
            body,
            delay: Duration::ZERO,
            repeat: Duration::ZERO,
        }
    }

    /// Delay before the first firing.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Interval between firings; zero means one-shot.
    pub fn repeat(mut self, repeat: Duration) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn clear_delay(mut self) -> Self {
        self.delay = Duration::ZERO;
        self
    }

    pub fn clear_repeat(mut self) -> Self {
        self.repeat = Duration::ZERO;
        self
    }

    /// Construct the task, register it under its name, and arm the timer:
    /// one-shot when `repeat` is zero, fixed-period otherwise — exactly one
    /// timer registration either way.
    ///
    /// Scheduling a name that is still active is a usage error.
    pub fn schedule(self) -> Result<ScheduledTask> {
        let period = if self.repeat.is_zero() {
            None
        } else {
            Some(self.repeat)
        };

        let task = ScheduledTask::new(
            self.name.clone(),
            self.body,
            period,
            Arc::downgrade(&self.shared),
        );

        {
            let mut registry = self.shared.registry.lock();
            if registry.contains_key(&self.name) {
                return Err(Error::TaskExists(self.name));
            }
            registry.insert(self.name.clone(), task.clone());
        }

        let pool = self.shared.pool.clone();
        let target = task.inner.clone();
        let fire = Box::new(move || {
            #[cfg(feature = "telemetry")]
            pool.metrics().record_task_fired();

            let run_target = target.clone();
            pool.execute(move || run_target.run());
        });

        match self.shared.timer.register(self.delay, period, fire) {
            Ok(handle) => {
                *task.inner.timer_handle.lock() = Some(handle);
                // a cancel racing the arming found no handle to cancel yet
                if task.status().is_terminal() {
                    if let Some(handle) = task.inner.timer_handle.lock().take() {
                        handle.cancel();
                    }
                }
                Ok(task)
            }
            Err(error) => {
                self.shared.unregister(&self.name, &task.inner);
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("repeat", &self.repeat)
            .finish()
    }
}
