//! Scheduling entry point for callback-driven work.

use super::listener::ListenerFuture;
use crate::error::{Error, Result};
use crate::executor::panic_handler::run_caught;
use crate::executor::Executor;
use crate::runtime;
use std::sync::Arc;

/// Run `work` on `executor` and deliver its outcome to a [`ListenerFuture`]
/// bound to `on_success`/`on_failure`.
///
/// Both the work and the success listener dispatch through `executor`; the
/// outcome always travels through the future's own settle path, so the
/// returned handle and the callbacks observe the same settled state.
pub fn submit_on<T, W, S, F>(
    executor: Arc<dyn Executor>,
    work: W,
    on_success: S,
    on_failure: F,
) -> ListenerFuture<T>
where
    T: Clone + Send + 'static,
    W: FnOnce() -> Result<T> + Send + 'static,
    S: FnOnce(T) + Send + 'static,
    F: FnOnce(Arc<Error>) + Send + 'static,
{
    let future = ListenerFuture::with_executor(on_success, on_failure, executor.clone());
    let settler = future.clone();

    executor.execute(Box::new(move || match run_caught(work) {
        Ok(Ok(value)) => {
            settler.settle_value(value);
        }
        Ok(Err(error)) => {
            settler.settle_err(error);
        }
        Err(message) => {
            settler.settle_err(Error::TaskFailed(message));
        }
    }));

    future
}

/// [`submit_on`] against the process-wide runtime executor.
pub fn submit<T, W, S, F>(work: W, on_success: S, on_failure: F) -> ListenerFuture<T>
where
    T: Clone + Send + 'static,
    W: FnOnce() -> Result<T> + Send + 'static,
    S: FnOnce(T) + Send + 'static,
    F: FnOnce(Arc<Error>) + Send + 'static,
{
    submit_on(runtime::default_executor(), work, on_success, on_failure)
}
