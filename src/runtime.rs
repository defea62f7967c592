//! Process-wide default runtime behind the zero-executor helpers.
//!
//! `Promise::fulfill_in_async` and `submit` need an executor without the
//! caller managing one. The runtime holds that pool: created lazily on first
//! use (or eagerly via [`init`]), torn down by [`shutdown`]. Callers that need
//! bounded or isolated concurrency supply their own executor instead.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::WorkerPool;
use parking_lot::RwLock;
use std::sync::Arc;

pub struct Runtime {
    pub(crate) pool: Arc<WorkerPool>,
    config: Config,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(&config)?);

        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> Arc<WorkerPool> {
        self.pool.clone()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("pool", &self.pool).finish()
    }
}

// Global runtime for the zero-executor API
static GLOBAL_RUNTIME: RwLock<Option<Arc<Runtime>>> = RwLock::new(None);

pub fn init() -> Result<()> {
    init_with_config(Config::default())
}

pub fn init_with_config(config: Config) -> Result<()> {
    let mut runtime = GLOBAL_RUNTIME.write();

    if runtime.is_some() {
        return Err(Error::AlreadyInitialized);
    }

    let rt = Runtime::new(config)?;
    *runtime = Some(Arc::new(rt));

    Ok(())
}

/// The default pool, creating the runtime on first use.
pub(crate) fn default_executor() -> Arc<WorkerPool> {
    if let Some(rt) = GLOBAL_RUNTIME.read().as_ref() {
        return rt.pool.clone();
    }

    let mut runtime = GLOBAL_RUNTIME.write();
    // racing initializer may have won between the read and write locks
    if let Some(rt) = runtime.as_ref() {
        return rt.pool.clone();
    }

    let rt = Runtime::new(Config::default()).expect("default runtime construction failed");
    let pool = rt.pool.clone();
    *runtime = Some(Arc::new(rt));
    pool
}

/// Tear down the global runtime, draining its pool within the configured
/// grace period. Returns whether all in-flight work finished in time; `true`
/// when no runtime was running.
pub fn shutdown() -> bool {
    let runtime = GLOBAL_RUNTIME.write().take();

    match runtime {
        Some(rt) => rt.pool.shutdown_graceful(rt.config.shutdown_grace),
        None => true,
    }
}

/// Serializes tests that touch the global runtime; the test harness runs
/// tests in parallel threads and the runtime is process-wide.
#[cfg(test)]
pub(crate) static TEST_RUNTIME_LOCK: RwLock<()> = RwLock::new(());
