pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::executor::{Executor, WorkerPool};
pub use crate::promise::{submit, submit_on, CompletionCell, ListenerFuture, Outcome, Promise};
pub use crate::scheduler::{ScheduledTask, TaskBuilder, TaskContext, TaskScheduler, TaskStatus};
pub use crate::{init, init_with_config, shutdown};

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};
