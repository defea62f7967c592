//! Callback-driven future bound to its listeners at construction.

use super::cell::{CompletionCell, Outcome};
use crate::error::Error;
use crate::executor::panic_handler::run_caught;
use crate::executor::Executor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

type SuccessListener<T> = Box<dyn FnOnce(T) + Send + 'static>;
type FailureListener = Box<dyn FnOnce(Arc<Error>) + Send + 'static>;

/// A minimal future that drains straight into its listeners.
///
/// Construction binds a success listener and a failure listener; settling the
/// future fires exactly one of them, exactly once. Success dispatch goes
/// through the bound executor when one was supplied, inline on the settling
/// thread otherwise. Failure dispatch is always inline.
pub struct ListenerFuture<T> {
    inner: Arc<ListenerInner<T>>,
}

struct ListenerInner<T> {
    cell: CompletionCell<T>,
    on_success: Mutex<Option<SuccessListener<T>>>,
    on_failure: Mutex<Option<FailureListener>>,
    executor: Option<Arc<dyn Executor>>,
    cancelled: AtomicBool,
}

impl<T> Clone for ListenerFuture<T> {
    fn clone(&self) -> Self {
        ListenerFuture {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ListenerFuture<T> {
    /// Bind both listeners; success dispatch runs inline on the settling
    /// thread.
    pub fn new<S, F>(on_success: S, on_failure: F) -> Self
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(Arc<Error>) + Send + 'static,
    {
        Self::build(on_success, on_failure, None)
    }

    /// Bind both listeners, dispatching the success listener through
    /// `executor` instead of the settling thread.
    pub fn with_executor<S, F>(on_success: S, on_failure: F, executor: Arc<dyn Executor>) -> Self
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(Arc<Error>) + Send + 'static,
    {
        Self::build(on_success, on_failure, Some(executor))
    }

    fn build<S, F>(on_success: S, on_failure: F, executor: Option<Arc<dyn Executor>>) -> Self
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(Arc<Error>) + Send + 'static,
    {
        ListenerFuture {
            inner: Arc::new(ListenerInner {
                cell: CompletionCell::new(),
                on_success: Mutex::new(Some(Box::new(on_success))),
                on_failure: Mutex::new(Some(Box::new(on_failure))),
                executor,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Settle failed and fire the failure listener inline. Returns whether
    /// this call settled the future.
    pub fn settle_err(&self, error: Error) -> bool {
        let error = Arc::new(error);
        if !self.inner.cell.fail(error.clone()) {
            return false;
        }
        self.fire_failure(error);
        true
    }

    fn fire_failure(&self, error: Arc<Error>) {
        let listener = self.inner.on_failure.lock().take();
        if let Some(listener) = listener {
            if let Err(message) = run_caught(|| listener(error)) {
                eprintln!("failure listener panicked: {}", message);
            }
        }
    }

    /// Settle the future failed with [`Error::Cancelled`]; the failure
    /// listener observes the cancellation. A no-op on a settled future.
    pub fn cancel(&self) -> bool {
        let error = Arc::new(Error::Cancelled);
        if !self.inner.cell.fail(error.clone()) {
            return false;
        }
        // flag is visible before the listener observes the cancellation
        self.inner.cancelled.store(true, Ordering::Release);
        self.fire_failure(error);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.inner.cell.is_done()
    }
}

impl<T: Clone + Send + 'static> ListenerFuture<T> {
    /// Settle fulfilled and dispatch the success listener. Returns whether
    /// this call settled the future.
    pub fn settle_value(&self, value: T) -> bool {
        if !self.inner.cell.fulfill(value) {
            return false;
        }
        let listener = self.inner.on_success.lock().take();
        let Some(listener) = listener else {
            return true;
        };
        let Some(Ok(value)) = self.inner.cell.try_get() else {
            return true;
        };

        let invoke = move || {
            if let Err(message) = run_caught(move || listener(value)) {
                eprintln!("success listener panicked: {}", message);
            }
        };
        match &self.inner.executor {
            Some(executor) => executor.execute(Box::new(invoke)),
            None => invoke(),
        }
        true
    }

    /// Non-blocking read: `None` while the future is unsettled.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.inner.cell.try_get()
    }

    /// Bounded blocking read; `Err(Error::Timeout)` if the future does not
    /// settle in time. Waiters park on the cell's condvar.
    pub fn get(&self, timeout: Duration) -> Outcome<T> {
        match self.inner.cell.wait(timeout) {
            Some(outcome) => outcome,
            None => Err(Arc::new(Error::Timeout)),
        }
    }
}

impl<T> std::fmt::Debug for ListenerFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerFuture")
            .field("cell", &self.inner.cell)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
