//! Single-assignment promise with chained continuations.

use super::cell::{CompletionCell, Outcome};
use crate::error::{Error, Result};
use crate::executor::panic_handler::run_caught;
use crate::executor::Executor;
use crate::runtime;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;
type ErrorHandler = Box<dyn FnOnce(Arc<Error>) + Send + 'static>;

/// A single-assignment completion handle with chained continuations.
///
/// A `Promise` is a cheap clone over shared state, so the producer side can
/// settle it from a worker thread while consumers register continuations from
/// the caller's thread. At most one continuation and one error handler may be
/// registered per promise; a second registration is a usage error, not a
/// silent overwrite.
///
/// ```no_run
/// use mesh_futures::Promise;
///
/// let promise: Promise<i32> = Promise::new();
/// let doubled = promise.then_apply(|n| n * 2).unwrap();
/// promise.fulfill_in_async(|| Ok(21));
/// ```
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    cell: CompletionCell<T>,
    continuation: Mutex<Option<Continuation<T>>>,
    error_handler: Mutex<Option<ErrorHandler>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Promise {
            inner: Arc::new(Inner {
                cell: CompletionCell::new(),
                continuation: Mutex::new(None),
                error_handler: Mutex::new(None),
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        self.inner.cell.is_done()
    }

    pub fn is_failed(&self) -> bool {
        self.inner.cell.is_failed()
    }

    /// Settle failed. The error handler (if any) runs first, then the
    /// continuation, which observes the failure and propagates it downstream.
    /// A no-op on an already-settled promise.
    pub fn fulfill_err(&self, error: Error) {
        self.fail_with(Arc::new(error));
    }

    pub(crate) fn fail_with(&self, error: Arc<Error>) {
        if !self.inner.cell.fail(error.clone()) {
            return;
        }
        let handler = self.inner.error_handler.lock().take();
        if let Some(handler) = handler {
            if let Err(message) = run_caught(|| handler(error.clone())) {
                eprintln!("error handler panicked: {}", message);
            }
        }
        self.run_continuation(Err(error));
    }

    /// Register a handler invoked once, only on failure, before the
    /// continuation runs. If the promise already settled failed, the handler
    /// runs immediately on the calling thread.
    pub fn on_error<F>(&self, handler: F) -> Result<Promise<T>>
    where
        F: FnOnce(Arc<Error>) + Send + 'static,
    {
        let mut slot = self.inner.error_handler.lock();
        if slot.is_some() {
            return Err(Error::HandlerRegistered);
        }
        if let Some(error) = self.inner.cell.error() {
            drop(slot);
            if let Err(message) = run_caught(|| handler(error)) {
                eprintln!("error handler panicked: {}", message);
            }
            return Ok(self.clone());
        }
        *slot = Some(Box::new(handler));
        Ok(self.clone())
    }

    /// Install the continuation, or run it at once when the promise has
    /// already settled. Holding the slot lock across the settled check keeps a
    /// racing settle from slipping between the check and the store.
    fn register(&self, action: Continuation<T>) -> Result<()>
    where
        T: Clone,
    {
        let mut slot = self.inner.continuation.lock();
        if slot.is_some() {
            return Err(Error::ContinuationRegistered);
        }
        if let Some(outcome) = self.inner.cell.try_get() {
            drop(slot);
            action(outcome);
            return Ok(());
        }
        *slot = Some(action);
        Ok(())
    }

    fn run_continuation(&self, outcome: Outcome<T>) {
        let action = self.inner.continuation.lock().take();
        if let Some(action) = action {
            action(outcome);
        }
    }
}

impl<T: Clone> Promise<T> {
    /// Settle fulfilled and run the registered continuation synchronously on
    /// the calling thread. A no-op on an already-settled promise.
    pub fn fulfill(&self, value: T) {
        if !self.inner.cell.fulfill(value) {
            return;
        }
        // the winning transition's value, read back for the continuation
        if let Some(outcome) = self.inner.cell.try_get() {
            self.run_continuation(outcome);
        }
    }

    /// Non-blocking read of the settled outcome.
    pub fn try_get(&self) -> Option<Outcome<T>> {
        self.inner.cell.try_get()
    }

    /// Bounded blocking read; `Err(Error::Timeout)` if the promise does not
    /// settle in time.
    pub fn get(&self, timeout: Duration) -> Outcome<T> {
        match self.inner.cell.wait(timeout) {
            Some(outcome) => outcome,
            None => Err(Arc::new(Error::Timeout)),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Chain a transformation: the child promise settles with `func(value)`
    /// once this promise fulfills, or with this promise's failure untouched.
    ///
    /// A panic inside `func` fails the child with the panic message; an
    /// upstream failure propagates as the same error value, never re-wrapped.
    pub fn then_apply<R, F>(&self, func: F) -> Result<Promise<R>>
    where
        R: Clone + Send + 'static,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let child = Promise::new();
        let downstream = child.clone();
        self.register(Box::new(move |outcome: Outcome<T>| match outcome {
            Ok(value) => match run_caught(move || func(value)) {
                Ok(result) => downstream.fulfill(result),
                Err(message) => downstream.fulfill_err(Error::TaskFailed(message)),
            },
            Err(error) => downstream.fail_with(error),
        }))?;
        Ok(child)
    }

    /// Chain a consumer: the child settles with unit once the consumer ran
    /// without panicking. Failure propagation matches [`then_apply`].
    ///
    /// [`then_apply`]: Promise::then_apply
    pub fn then_accept<F>(&self, func: F) -> Result<Promise<()>>
    where
        F: FnOnce(T) + Send + 'static,
    {
        let child = Promise::new();
        let downstream = child.clone();
        self.register(Box::new(move |outcome: Outcome<T>| match outcome {
            Ok(value) => match run_caught(move || func(value)) {
                Ok(()) => downstream.fulfill(()),
                Err(message) => downstream.fulfill_err(Error::TaskFailed(message)),
            },
            Err(error) => downstream.fail_with(error),
        }))?;
        Ok(child)
    }

    /// Run `work` on `executor` and route its outcome into this promise:
    /// `Ok` fulfills, `Err` fails, and a panic fails with the panic message.
    /// Returns the promise handle for fluent chaining.
    pub fn fulfill_in_async_on<F>(&self, work: F, executor: &dyn Executor) -> Promise<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let promise = self.clone();
        executor.execute(Box::new(move || match run_caught(work) {
            Ok(Ok(value)) => promise.fulfill(value),
            Ok(Err(error)) => promise.fulfill_err(error),
            Err(message) => promise.fulfill_err(Error::TaskFailed(message)),
        }));
        self.clone()
    }

    /// [`fulfill_in_async_on`] against the process-wide runtime, which is
    /// lazily created on first use and torn down by [`runtime::shutdown`].
    ///
    /// [`fulfill_in_async_on`]: Promise::fulfill_in_async_on
    /// [`runtime::shutdown`]: crate::runtime::shutdown
    pub fn fulfill_in_async<F>(&self, work: F) -> Promise<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.fulfill_in_async_on(work, runtime::default_executor().as_ref())
    }

    /// Schedule a pre-computed value to settle this promise from `executor`.
    pub fn fulfill_value_in_async_on(&self, value: T, executor: &dyn Executor) -> Promise<T> {
        self.fulfill_in_async_on(move || Ok(value), executor)
    }

    /// [`fulfill_value_in_async_on`] against the process-wide runtime.
    ///
    /// [`fulfill_value_in_async_on`]: Promise::fulfill_value_in_async_on
    pub fn fulfill_value_in_async(&self, value: T) -> Promise<T> {
        self.fulfill_in_async(move || Ok(value))
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("cell", &self.inner.cell)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_then_apply_after_fulfill_runs_immediately() {
        let promise = Promise::new();
        promise.fulfill(4);

        let child = promise.then_apply(|n| n + 1).unwrap();
        assert_eq!(child.try_get().unwrap().unwrap(), 5);
    }

    #[test]
    fn test_second_continuation_is_usage_error() {
        let promise: Promise<i32> = Promise::new();
        let _first = promise.then_apply(|n| n).unwrap();

        let second = promise.then_apply(|n| n);
        assert!(matches!(second, Err(Error::ContinuationRegistered)));
    }

    #[test]
    fn test_second_error_handler_is_usage_error() {
        let promise: Promise<i32> = Promise::new();
        promise.on_error(|_| {}).unwrap();
        assert!(matches!(promise.on_error(|_| {}), Err(Error::HandlerRegistered)));
    }

    #[test]
    fn test_failure_propagates_same_error_value() {
        let promise: Promise<i32> = Promise::new();
        let child = promise.then_apply(|n| n * 2).unwrap();
        let grandchild = child.then_apply(|n| n + 1).unwrap();

        promise.fulfill_err(Error::task_failed("root cause"));

        let seen = grandchild.try_get().unwrap().unwrap_err();
        let original = promise.try_get().unwrap().unwrap_err();
        assert!(Arc::ptr_eq(&seen, &original));
    }

    #[test]
    fn test_continuation_runs_exactly_once() {
        let promise = Promise::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counted = runs.clone();

        promise
            .then_accept(move |_: i32| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        promise.fulfill(1);
        promise.fulfill(2);
        promise.fulfill_err(Error::task_failed("late"));

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_in_continuation_fails_child() {
        let promise = Promise::new();
        let child = promise
            .then_apply(|_: i32| -> i32 { panic!("transform blew up") })
            .unwrap();

        promise.fulfill(1);

        let error = child.try_get().unwrap().unwrap_err();
        assert!(matches!(*error, Error::TaskFailed(ref m) if m == "transform blew up"));
    }

    #[test]
    fn test_on_error_runs_before_continuation() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let promise: Promise<i32> = Promise::new();
        let handler_order = order.clone();
        let promise = promise
            .on_error(move |_| handler_order.lock().push("handler"))
            .unwrap();

        let continuation_order = order.clone();
        promise
            .then_apply(move |n| {
                continuation_order.lock().push("continuation");
                n
            })
            .unwrap();

        promise.fulfill_err(Error::task_failed("x"));

        assert_eq!(*order.lock(), vec!["handler"]);
    }

    #[test]
    fn test_on_error_after_failure_runs_immediately() {
        let promise: Promise<i32> = Promise::new();
        promise.fulfill_err(Error::Cancelled);

        let seen = Arc::new(AtomicUsize::new(0));
        let counted = seen.clone();
        promise
            .on_error(move |error| {
                assert!(error.is_cancelled());
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
