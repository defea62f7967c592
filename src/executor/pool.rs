use super::job::Job;
use super::worker::{Worker, WorkerId};
use super::Executor;
use crate::config::Config;
use crate::error::{Error, Result};
use crossbeam_deque::{Injector, Stealer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(feature = "telemetry")]
use crate::telemetry::Metrics;

/// Worker-dispatch facility: a fixed pool of work-stealing worker threads.
///
/// Jobs submitted after shutdown began are dropped, never queued.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    injector: Arc<Injector<Job>>,
    stealers: Vec<Stealer<Job>>,
    shutdown: Arc<AtomicBool>,
    accepting: AtomicBool,
    num_threads: usize,
    pending_jobs: Arc<AtomicUsize>,
    #[cfg(feature = "telemetry")]
    pub(crate) metrics: Arc<Metrics>,
}

struct WorkerHandle {
    id: WorkerId,
    thread: Mutex<Option<JoinHandle<()>>>,
    unparker: thread::Thread,
}

impl WorkerPool {
    pub fn new(config: &Config) -> Result<Self> {
        let num_threads = config.worker_count();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let injector = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending_jobs = Arc::new(AtomicUsize::new(0));

        #[cfg(feature = "telemetry")]
        let metrics = Arc::new(Metrics::new());

        let mut workers = Vec::with_capacity(num_threads);
        let mut stealers = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let worker = Worker::new(id);
            stealers.push(worker.local_queue.stealer());
            workers.push(worker);
        }

        let mut handles = Vec::with_capacity(num_threads);

        for worker in workers {
            let id = worker.id;
            let stealers_clone = stealers.clone();
            let injector_clone = injector.clone();
            let shutdown_clone = shutdown.clone();
            let pending_clone = pending_jobs.clone();
            let name = format!("{}-{}", config.thread_name_prefix, id);

            #[cfg(feature = "telemetry")]
            let worker = worker.with_metrics(metrics.clone());

            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let thread = builder
                .spawn(move || {
                    worker.run(stealers_clone, injector_clone, shutdown_clone, pending_clone);
                })
                .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

            let unparker = thread.thread().clone();

            handles.push(WorkerHandle {
                id,
                thread: Mutex::new(Some(thread)),
                unparker,
            });
        }

        Ok(Self {
            workers: handles,
            injector,
            stealers,
            shutdown,
            accepting: AtomicBool::new(true),
            num_threads,
            pending_jobs,
            #[cfg(feature = "telemetry")]
            metrics,
        })
    }

    pub(crate) fn submit(&self, job: Job) {
        if !self.accepting.load(Ordering::Acquire) {
            // Pool is draining, job rejected
            if cfg!(debug_assertions) {
                eprintln!("[MESH] Job {:?} rejected, pool is shut down", job.id);
            }
            return;
        }

        self.pending_jobs.fetch_add(1, Ordering::Release);
        self.injector.push(job);

        // Wake up a worker
        if let Some(worker) = self.workers.get(self.num_threads / 2) {
            worker.unparker.unpark();
        }
    }

    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Job::new(f));
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs.load(Ordering::Acquire)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    #[cfg(feature = "telemetry")]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Stop accepting work and wait up to `grace` for queued and in-flight
    /// jobs to drain, then stop the workers.
    ///
    /// Returns whether everything drained within the grace period. Workers
    /// still stuck in a job past the grace period are detached rather than
    /// joined; they exit on their own once the job returns.
    pub fn shutdown_graceful(&self, grace: Duration) -> bool {
        self.accepting.store(false, Ordering::Release);

        let deadline = Instant::now() + grace;
        while self.pending_jobs.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let drained = self.pending_jobs.load(Ordering::Acquire) == 0;

        self.shutdown.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.unparker.unpark();
        }

        for worker in &self.workers {
            if let Some(thread) = worker.thread.lock().take() {
                if drained {
                    let _ = thread.join();
                }
            }
        }

        drained
    }

    fn stop_and_join(&self) {
        self.accepting.store(false, Ordering::Release);
        self.shutdown.store(true, Ordering::Release);

        // wake everyone up to check shutdown flag
        for worker in &self.workers {
            worker.unparker.unpark();
        }

        for worker in &self.workers {
            if let Some(thread) = worker.thread.lock().take() {
                let _ = thread.join();
            }
        }
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.submit(Job::new(job));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn small_pool() -> WorkerPool {
        let config = Config::builder().worker_threads(2).build().unwrap();
        WorkerPool::new(&config).unwrap()
    }

    #[test]
    fn test_executes_submitted_work() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();

        pool.execute(move || {
            tx.send(41 + 1).unwrap();
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_panicking_job_does_not_kill_workers() {
        let pool = small_pool();
        pool.execute(|| panic!("deliberate"));

        let (tx, rx) = mpsc::channel();
        pool.execute(move || {
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_graceful_shutdown_drains() {
        let pool = small_pool();
        let (tx, rx) = mpsc::channel();

        for _ in 0..16 {
            let tx = tx.clone();
            pool.execute(move || {
                thread::sleep(Duration::from_millis(5));
                tx.send(()).unwrap();
            });
        }

        assert!(pool.shutdown_graceful(Duration::from_secs(5)));
        drop(tx);
        assert_eq!(rx.iter().count(), 16);
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = small_pool();
        assert!(pool.shutdown_graceful(Duration::from_secs(1)));

        let (tx, rx) = mpsc::channel::<()>();
        pool.execute(move || {
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
