use mesh_futures::prelude::*;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Tests that touch the process-wide runtime take this lock; the harness runs
// tests in parallel and a shutdown would strand another test's in-flight work.
static RUNTIME_LOCK: Mutex<()> = Mutex::new(());

fn test_scheduler() -> TaskScheduler {
    let config = Config::builder()
        .worker_threads(4)
        .thread_name_prefix("itest")
        .build()
        .unwrap();
    TaskScheduler::new(config).unwrap()
}

#[test]
fn test_promise_settles_across_threads() {
    let _rt = RUNTIME_LOCK.lock();
    mesh_futures::shutdown();

    let promise: Promise<String> = Promise::new();
    let upper = promise.then_apply(|s| s.to_uppercase()).unwrap();

    promise.fulfill_in_async(|| Ok("hello".to_string()));

    assert_eq!(upper.get(Duration::from_secs(5)).unwrap(), "HELLO");

    mesh_futures::shutdown();
}

#[test]
fn test_promise_chain_propagates_failure_untouched() {
    let promise: Promise<i32> = Promise::new();
    let child = promise.then_apply(|n| n * 2).unwrap();
    let grandchild = child.then_accept(|_| {}).unwrap();

    promise.fulfill_err(Error::task_failed("root"));

    let original = promise.try_get().unwrap().unwrap_err();
    let propagated = grandchild.try_get().unwrap().unwrap_err();
    assert!(Arc::ptr_eq(&original, &propagated));
}

#[test]
fn test_promise_failed_work_triggers_on_error() {
    let _rt = RUNTIME_LOCK.lock();
    mesh_futures::shutdown();

    let (tx, rx) = mpsc::channel();

    let promise: Promise<i32> = Promise::new();
    promise
        .on_error(move |error| {
            tx.send(error.to_string()).unwrap();
        })
        .unwrap()
        .fulfill_in_async(|| Err(Error::task_failed("no luck")));

    let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(message, "task failed: no luck");

    mesh_futures::shutdown();
}

#[test]
fn test_promise_panicking_work_fails_promise() {
    let _rt = RUNTIME_LOCK.lock();
    mesh_futures::shutdown();

    let promise: Promise<i32> = Promise::new();
    promise.fulfill_in_async(|| panic!("worker exploded"));

    let error = promise.get(Duration::from_secs(5)).unwrap_err();
    assert!(matches!(*error, Error::TaskFailed(ref m) if m == "worker exploded"));

    mesh_futures::shutdown();
}

#[test]
fn test_promise_value_overload() {
    let _rt = RUNTIME_LOCK.lock();
    mesh_futures::shutdown();

    let promise: Promise<i32> = Promise::new();
    promise.fulfill_value_in_async(5);

    assert_eq!(promise.get(Duration::from_secs(5)).unwrap(), 5);

    mesh_futures::shutdown();
}

#[test]
fn test_submit_delivers_success_through_future() {
    let _rt = RUNTIME_LOCK.lock();
    mesh_futures::shutdown();

    let (tx, rx) = mpsc::channel();

    let future = submit(
        || Ok(6 * 7),
        move |value| tx.send(value).unwrap(),
        |_| panic!("failure listener must not fire"),
    );

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    assert_eq!(future.get(Duration::from_secs(5)).unwrap(), 42);
    assert!(future.is_done());

    mesh_futures::shutdown();
}

#[test]
fn test_submit_delivers_failure_inline() {
    let _rt = RUNTIME_LOCK.lock();
    mesh_futures::shutdown();

    let (tx, rx) = mpsc::channel();

    let future: ListenerFuture<i32> = submit(
        || Err(Error::task_failed("bad input")),
        |_| {},
        move |error| tx.send(error.to_string()).unwrap(),
    );

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        "task failed: bad input"
    );
    assert!(future.is_done());
    assert!(!future.is_cancelled());

    mesh_futures::shutdown();
}

#[test]
fn test_submit_on_scheduler_pool() {
    let scheduler = test_scheduler();
    let (tx, rx) = mpsc::channel();

    submit_on(
        scheduler.executor(),
        || Ok("pooled"),
        move |value| tx.send(value).unwrap(),
        |_| {},
    );

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "pooled");
    assert!(scheduler.shutdown());
}

#[test]
fn test_one_shot_task_finishes_and_unregisters() {
    let scheduler = test_scheduler();
    let runs = Arc::new(AtomicUsize::new(0));

    let counted = runs.clone();
    let task = scheduler
        .build_task("one-shot", move |_ctx| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .delay(Duration::from_millis(20))
        .schedule()
        .unwrap();

    assert_eq!(task.status(), TaskStatus::Scheduled);

    let deadline = Instant::now() + Duration::from_secs(5);
    while task.status() != TaskStatus::Finished && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(task.status(), TaskStatus::Finished);

    // finished tasks are gone from the registry
    assert!(scheduler.task("one-shot").is_none());
    assert!(!scheduler.cancel("one-shot"));

    assert!(scheduler.shutdown());
}

#[test]
fn test_repeating_task_fires_then_cancel_stops_it() {
    let scheduler = test_scheduler();
    let fires = Arc::new(AtomicUsize::new(0));

    let counted = fires.clone();
    let task = scheduler
        .build_task("ticker", move |_ctx| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .delay(Duration::from_millis(10))
        .repeat(Duration::from_millis(10))
        .schedule()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while fires.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(fires.load(Ordering::SeqCst) >= 3);

    assert!(task.cancel());
    assert_eq!(task.status(), TaskStatus::Cancelled);
    assert!(scheduler.task("ticker").is_none());

    // settle, then confirm no further firings arrive
    std::thread::sleep(Duration::from_millis(50));
    let after_cancel = fires.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fires.load(Ordering::SeqCst), after_cancel);

    // cancelling again is a no-op
    assert!(!task.cancel());

    assert!(scheduler.shutdown());
}

#[test]
fn test_cancel_interrupts_sleeping_body() {
    let scheduler = test_scheduler();
    let started = Arc::new(AtomicBool::new(false));
    let interrupted = Arc::new(AtomicBool::new(false));
    let slept_fully = Arc::new(AtomicBool::new(true));

    let started_flag = started.clone();
    let interrupted_flag = interrupted.clone();
    let slept_flag = slept_fully.clone();
    let task = scheduler
        .build_task("sleeper", move |ctx| {
            started_flag.store(true, Ordering::SeqCst);
            slept_flag.store(ctx.sleep(Duration::from_secs(30)), Ordering::SeqCst);
            interrupted_flag.store(ctx.is_interrupted(), Ordering::SeqCst);
        })
        .schedule()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !started.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(started.load(Ordering::SeqCst));

    let cancel_start = Instant::now();
    assert!(task.cancel());
    assert_eq!(task.status(), TaskStatus::Cancelled);

    // the body wakes promptly instead of sleeping out its 30 seconds
    let deadline = Instant::now() + Duration::from_secs(5);
    while slept_fully.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!slept_fully.load(Ordering::SeqCst));
    assert!(interrupted.load(Ordering::SeqCst));
    assert!(cancel_start.elapsed() < Duration::from_secs(10));

    scheduler.shutdown();
}

#[test]
fn test_duplicate_name_is_usage_error_until_finished() {
    let scheduler = test_scheduler();

    let task = scheduler
        .build_task("unique", |_ctx| {})
        .delay(Duration::from_millis(10))
        .repeat(Duration::from_millis(10))
        .schedule()
        .unwrap();

    let second = scheduler.build_task("unique", |_ctx| {}).schedule();
    assert!(matches!(second, Err(Error::TaskExists(ref name)) if name == "unique"));

    task.cancel();

    // name is free again once the task is gone
    let third = scheduler.build_task("unique", |_ctx| {}).schedule();
    assert!(third.is_ok());

    assert!(scheduler.shutdown());
}

#[test]
fn test_panicking_body_keeps_repeating() {
    let scheduler = test_scheduler();
    let fires = Arc::new(AtomicUsize::new(0));

    let counted = fires.clone();
    scheduler
        .build_task("faulty", move |_ctx| {
            counted.fetch_add(1, Ordering::SeqCst);
            panic!("body failure");
        })
        .repeat(Duration::from_millis(10))
        .schedule()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while fires.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(fires.load(Ordering::SeqCst) >= 3);

    scheduler.shutdown();
}

#[test]
fn test_builder_clear_methods() {
    let scheduler = test_scheduler();
    let runs = Arc::new(AtomicUsize::new(0));

    // repeat is cleared, so this is a one-shot again
    let counted = runs.clone();
    let task = scheduler
        .build_task("cleared", move |_ctx| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .delay(Duration::from_secs(30))
        .repeat(Duration::from_secs(30))
        .clear_delay()
        .clear_repeat()
        .schedule()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while task.status() != TaskStatus::Finished && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert!(scheduler.shutdown());
}

#[test]
fn test_shutdown_stops_firings_and_drains() {
    let scheduler = test_scheduler();
    let fires = Arc::new(AtomicUsize::new(0));

    let counted = fires.clone();
    scheduler
        .build_task("until-shutdown", move |_ctx| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .repeat(Duration::from_millis(10))
        .schedule()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while fires.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(scheduler.shutdown());
    assert_eq!(scheduler.active_tasks(), 0);

    let after_shutdown = fires.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fires.load(Ordering::SeqCst), after_shutdown);
}

#[test]
fn test_listener_future_cancel_observed() {
    let cancelled = Arc::new(AtomicBool::new(false));

    let seen = cancelled.clone();
    let future: ListenerFuture<i32> = ListenerFuture::new(
        |_| {},
        move |error| seen.store(error.is_cancelled(), Ordering::SeqCst),
    );

    assert!(future.cancel());
    assert!(future.is_cancelled());
    assert!(cancelled.load(Ordering::SeqCst));

    let outcome = future.get(Duration::from_millis(10));
    assert!(outcome.unwrap_err().is_cancelled());
}

#[cfg(feature = "telemetry")]
#[test]
fn test_scheduler_metrics_record_activity() {
    let scheduler = test_scheduler();
    let observed = Arc::new(Mutex::new(Vec::new()));

    let sink = observed.clone();
    let task = scheduler
        .build_task("observed", move |_ctx| {
            sink.lock().push(());
        })
        .repeat(Duration::from_millis(10))
        .schedule()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while observed.lock().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    task.cancel();

    let snapshot = scheduler.metrics().snapshot();
    assert!(snapshot.tasks_fired >= 2);
    assert!(snapshot.jobs_executed >= 2);
    assert_eq!(snapshot.tasks_cancelled, 1);

    scheduler.shutdown();
}
