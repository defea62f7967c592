//! Work execution infrastructure.
//!
//! This module provides the worker-dispatch facility: the worker threads,
//! work-stealing queues, and the pool that promise fulfilment and scheduled
//! task bodies run on.

pub mod job;
pub mod panic_handler;
pub mod pool;
pub mod worker;

pub use job::JobId;
pub use pool::WorkerPool;

pub(crate) use job::Job;

/// Fire-and-forget dispatch contract consumed by promises, listener futures,
/// and the scheduler.
///
/// `execute` runs the job on some worker, possibly immediately on the calling
/// thread for inline executors. Implementations must not propagate panics out
/// of the job into their own control flow.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}
