//! Runtime handle for one named unit of scheduled work.

use super::timer::TimerHandle;
use super::SchedulerShared;
use crate::executor::panic_handler::run_caught;
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

/// Lifecycle of a scheduled task.
///
/// `Scheduled -> Running -> Scheduled` for repeating tasks,
/// `Scheduled -> Running -> Finished` for one-shots, and either of the
/// non-terminal states may move to `Cancelled`. `Finished` and `Cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Scheduled,
    Running,
    Cancelled,
    Finished,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Cancelled | TaskStatus::Finished)
    }
}

/// Interruption token handed to every task body run.
///
/// Cancellation is cooperative: [`cancel`](ScheduledTask::cancel) sets the
/// interrupted flag, wakes sleepers, and unparks the recorded worker thread.
/// A body that never checks the token simply finishes its current run.
pub struct TaskContext {
    interrupted: Mutex<bool>,
    wake: Condvar,
    running_thread: Mutex<Option<Thread>>,
}

impl TaskContext {
    fn new() -> Self {
        Self {
            interrupted: Mutex::new(false),
            wake: Condvar::new(),
            running_thread: Mutex::new(None),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.lock()
    }

    /// Sleep for `duration`, waking early on interruption. Returns `true`
    /// when the full duration elapsed, `false` when interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut interrupted = self.interrupted.lock();
        while !*interrupted {
            if self.wake.wait_until(&mut interrupted, deadline).timed_out() {
                return !*interrupted;
            }
        }
        false
    }

    pub(crate) fn interrupt(&self) {
        *self.interrupted.lock() = true;
        self.wake.notify_all();
        // wake bodies parked outside our condvar too
        let running = self.running_thread.lock().clone();
        if let Some(thread) = running {
            thread.unpark();
        }
    }

    fn enter_run(&self) {
        *self.running_thread.lock() = Some(thread::current());
    }

    fn exit_run(&self) {
        *self.running_thread.lock() = None;
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

pub(crate) struct TaskInner {
    pub(crate) name: String,
    body: Box<dyn Fn(&TaskContext) + Send + Sync>,
    period: Option<Duration>,
    status: Mutex<TaskStatus>,
    context: TaskContext,
    /// Serializes firings of this task: a slow run delays the next firing,
    /// it never overlaps it.
    run_gate: Mutex<()>,
    pub(crate) timer_handle: Mutex<Option<TimerHandle>>,
    scheduler: Weak<SchedulerShared>,
}

impl TaskInner {
    /// One firing, on a worker thread.
    pub(crate) fn run(self: &Arc<Self>) {
        let _serial = self.run_gate.lock();

        {
            let mut status = self.status.lock();
            if status.is_terminal() {
                return;
            }
            *status = TaskStatus::Running;
        }

        self.context.enter_run();
        let outcome = run_caught(|| (self.body)(&self.context));
        self.context.exit_run();

        if let Err(message) = outcome {
            eprintln!("scheduled task `{}` panicked: {}", self.name, message);
            #[cfg(feature = "telemetry")]
            if let Some(shared) = self.scheduler.upgrade() {
                shared.pool.metrics().record_task_panic();
            }
        }

        let mut status = self.status.lock();
        if *status == TaskStatus::Cancelled {
            return;
        }

        if self.period.is_none() {
            *status = TaskStatus::Finished;
            drop(status);
            if let Some(shared) = self.scheduler.upgrade() {
                shared.unregister(&self.name, self);
            }
        } else {
            *status = TaskStatus::Scheduled;
        }
    }
}

/// Handle for one named, cancellable, optionally-repeating scheduled task.
///
/// Clones share the same underlying task.
#[derive(Clone)]
pub struct ScheduledTask {
    pub(crate) inner: Arc<TaskInner>,
}

impl ScheduledTask {
    pub(crate) fn new(
        name: String,
        body: Box<dyn Fn(&TaskContext) + Send + Sync>,
        period: Option<Duration>,
        scheduler: Weak<SchedulerShared>,
    ) -> Self {
        ScheduledTask {
            inner: Arc::new(TaskInner {
                name,
                body,
                period,
                status: Mutex::new(TaskStatus::Scheduled),
                context: TaskContext::new(),
                run_gate: Mutex::new(()),
                timer_handle: Mutex::new(None),
                scheduler,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> TaskStatus {
        *self.inner.status.lock()
    }

    /// Cancel the timer registration, interrupt an in-flight run, and remove
    /// the task from the scheduler's registry. A no-op on a finished or
    /// already-cancelled task; returns whether this call cancelled it.
    pub fn cancel(&self) -> bool {
        {
            let mut status = self.inner.status.lock();
            if status.is_terminal() {
                return false;
            }
            *status = TaskStatus::Cancelled;
        }

        if let Some(handle) = self.inner.timer_handle.lock().take() {
            handle.cancel();
        }
        self.inner.context.interrupt();

        if let Some(shared) = self.inner.scheduler.upgrade() {
            shared.unregister(&self.inner.name, &self.inner);
            #[cfg(feature = "telemetry")]
            shared.pool.metrics().record_task_cancelled();
        }

        true
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}
