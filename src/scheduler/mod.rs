//! Named, cancellable, optionally-repeating task scheduling.
//!
//! The scheduler owns a registry mapping task name to its active
//! [`ScheduledTask`], a [`WorkerPool`] that task bodies run on, and a
//! [`Timer`] that decides when they fire. Building and arming a task goes
//! through [`TaskScheduler::build_task`].

pub mod builder;
pub mod task;
pub mod timer;

pub use builder::TaskBuilder;
pub use task::{ScheduledTask, TaskContext, TaskStatus};

use crate::config::Config;
use crate::error::Result;
use crate::executor::{Executor, WorkerPool};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use task::TaskInner;
use timer::Timer;

pub(crate) struct SchedulerShared {
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) timer: Timer,
    pub(crate) registry: Mutex<HashMap<String, ScheduledTask>>,
    grace: Duration,
}

impl SchedulerShared {
    /// Drop the registry entry for `name`, but only while it still refers to
    /// `who` — the name may have been re-registered after a finish.
    pub(crate) fn unregister(&self, name: &str, who: &Arc<TaskInner>) {
        let mut registry = self.registry.lock();
        let is_current = registry
            .get(name)
            .map_or(false, |task| Arc::ptr_eq(&task.inner, who));
        if is_current {
            registry.remove(name);
        }
    }
}

/// The scheduling front end.
///
/// ```no_run
/// use mesh_futures::{Config, TaskScheduler};
/// use std::time::Duration;
///
/// let scheduler = TaskScheduler::new(Config::default()).unwrap();
/// let task = scheduler
///     .build_task("heartbeat", |_ctx| println!("tick"))
///     .delay(Duration::from_millis(50))
///     .repeat(Duration::from_secs(1))
///     .schedule()
///     .unwrap();
///
/// task.cancel();
/// scheduler.shutdown();
/// ```
pub struct TaskScheduler {
    shared: Arc<SchedulerShared>,
}

impl TaskScheduler {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(&config)?);
        let timer = Timer::spawn(format!("{}-timer", config.thread_name_prefix))?;

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                pool,
                timer,
                registry: Mutex::new(HashMap::new()),
                grace: config.shutdown_grace,
            }),
        })
    }

    /// Begin configuring a task; nothing fires until the builder's
    /// [`schedule`](TaskBuilder::schedule).
    pub fn build_task<F>(&self, name: impl Into<String>, body: F) -> TaskBuilder
    where
        F: Fn(&TaskContext) + Send + Sync + 'static,
    {
        TaskBuilder::new(self.shared.clone(), name.into(), Box::new(body))
    }

    /// The active task registered under `name`, if any.
    pub fn task(&self, name: &str) -> Option<ScheduledTask> {
        self.shared.registry.lock().get(name).cloned()
    }

    /// Cancel the task registered under `name`. Returns whether an active
    /// task was found and cancelled.
    pub fn cancel(&self, name: &str) -> bool {
        match self.task(name) {
            Some(task) => task.cancel(),
            None => false,
        }
    }

    /// Number of currently registered tasks.
    pub fn active_tasks(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// The scheduler's worker pool, for running promise work alongside
    /// scheduled tasks.
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.shared.pool.clone()
    }

    #[cfg(feature = "telemetry")]
    pub fn metrics(&self) -> &Arc<crate::telemetry::Metrics> {
        self.shared.pool.metrics()
    }

    /// Cancel every registered task, stop the timer, and drain the worker
    /// pool within the configured grace period.
    ///
    /// Returns whether all in-flight work finished inside the grace period.
    pub fn shutdown(&self) -> bool {
        let tasks: Vec<ScheduledTask> = self.shared.registry.lock().values().cloned().collect();
        for task in tasks {
            task.cancel();
        }

        self.shared.timer.shutdown();
        self.shared.pool.shutdown_graceful(self.shared.grace)
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("active_tasks", &self.active_tasks())
            .field("pool", &self.shared.pool)
            .finish()
    }
}
