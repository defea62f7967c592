pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("task `{0}` is already scheduled")]
    TaskExists(String),

    #[error("a continuation is already registered on this promise")]
    ContinuationRegistered,

    #[error("an error handler is already registered on this promise")]
    HandlerRegistered,

    #[error("cancelled")]
    Cancelled,

    #[error("timed out waiting for result")]
    Timeout,
}

impl Error {
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Error::Scheduler(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn task_failed<S: Into<String>>(msg: S) -> Self {
        Error::TaskFailed(msg.into())
    }

    /// Whether this error marks a deliberate cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
