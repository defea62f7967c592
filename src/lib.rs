//! MESH - asynchronous completion and scheduling toolkit
//!
//! Small building blocks for work whose result becomes available later, on a
//! different thread, exactly once: a single-assignment promise with chained
//! continuations, a callback-driven listener future, and a named cancellable
//! task scheduler, all running on a work-stealing worker pool.
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_futures::prelude::*;
//! use std::time::Duration;
//!
//! // Promise chain on the default runtime
//! let promise: Promise<i32> = Promise::new();
//! let printed = promise
//!     .then_apply(|n| n * 2)
//!     .unwrap()
//!     .then_accept(|n| println!("got {}", n))
//!     .unwrap();
//! promise.fulfill_in_async(|| Ok(21));
//! printed.get(Duration::from_secs(1)).unwrap();
//!
//! // Named repeating task
//! let scheduler = TaskScheduler::new(Config::default()).unwrap();
//! scheduler
//!     .build_task("heartbeat", |_ctx| println!("tick"))
//!     .repeat(Duration::from_millis(100))
//!     .schedule()
//!     .unwrap();
//! scheduler.shutdown();
//! ```
//!
//! # Features
//!
//! - **Single-Assignment Settling**: a cell settles exactly once; later
//!   attempts are no-ops, never overwrites
//! - **Chained Continuations**: `then_apply`/`then_accept` with failures
//!   propagated to descendants untouched
//! - **Listener Futures**: success/failure callbacks bound at construction,
//!   fired exactly once
//! - **Named Scheduling**: delayed and fixed-period tasks with cooperative
//!   interruption and graceful shutdown
//! - **Telemetry**: pool and scheduler counters with run-latency histogram
//!   (optional)

// Lint configuration
#![warn(missing_docs, missing_debug_implementations)]
#![allow(dead_code)] // During development

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod promise;
pub mod runtime;
pub mod scheduler;

#[cfg(feature = "telemetry")]
pub mod telemetry;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::Executor;
pub use promise::{submit, submit_on, CompletionCell, ListenerFuture, Outcome, Promise};
pub use runtime::{init, init_with_config, shutdown};
pub use scheduler::{ScheduledTask, TaskBuilder, TaskContext, TaskScheduler, TaskStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_promise_chain_on_default_runtime() {
        let _rt = runtime::TEST_RUNTIME_LOCK.write();
        shutdown();

        let promise: Promise<i32> = Promise::new();
        let child = promise.then_apply(|n| n + 1).unwrap();

        promise.fulfill_in_async(|| Ok(41));

        assert_eq!(child.get(Duration::from_secs(5)).unwrap(), 42);

        shutdown();
    }

    #[test]
    fn test_one_shot_task_runs() {
        let scheduler = TaskScheduler::new(Config::default()).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let counted = runs.clone();
        scheduler
            .build_task("once", move |_ctx| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .delay(Duration::from_millis(10))
            .schedule()
            .unwrap();

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(scheduler.shutdown());
    }
}
