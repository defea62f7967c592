//! Timer facility: decides *when* a task fires, never runs body code.
//!
//! One dedicated thread owns a deadline heap and sleeps until the earliest
//! deadline or the next command. Fire actions are expected to be cheap
//! dispatches onto the worker pool.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

static ENTRY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

// Sleep this long when the heap is empty; commands wake the thread earlier.
const IDLE_WAIT: Duration = Duration::from_secs(1);

struct TimerEntry {
    id: u64,
    deadline: Instant,
    /// `None` for one-shot entries; fixed-period entries re-arm from the
    /// previous *scheduled* deadline, not the actual fire time.
    period: Option<Duration>,
    cancelled: Arc<AtomicBool>,
    action: Box<dyn Fn() + Send>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.id.cmp(&other.id))
    }
}

enum TimerCmd {
    Register(TimerEntry),
    Shutdown,
}

/// Cancellation handle for one timer registration.
///
/// Cancelling flips a shared flag; the entry is dropped at its next pop and
/// never fires again.
#[derive(Debug, Clone)]
pub(crate) struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[allow(unused)]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

pub(crate) struct Timer {
    tx: Sender<TimerCmd>,
    accepting: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn spawn(thread_name: String) -> Result<Self> {
        let (tx, rx) = bounded(64);
        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || timer_loop(rx))
            .map_err(|e| Error::scheduler(format!("timer spawn failed: {}", e)))?;

        Ok(Self {
            tx,
            accepting: AtomicBool::new(true),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Arm one registration: one-shot after `delay` when `period` is `None`,
    /// else first after `delay` then every `period`.
    pub fn register(
        &self,
        delay: Duration,
        period: Option<Duration>,
        action: Box<dyn Fn() + Send>,
    ) -> Result<TimerHandle> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::scheduler("timer is shut down"));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = TimerEntry {
            id: ENTRY_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            deadline: Instant::now() + delay,
            period,
            cancelled: cancelled.clone(),
            action,
        };

        self.tx
            .send(TimerCmd::Register(entry))
            .map_err(|_| Error::scheduler("timer is shut down"))?;

        Ok(TimerHandle { cancelled })
    }

    /// Stop accepting registrations and join the timer thread. Armed entries
    /// that have not fired are discarded.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        let _ = self.tx.send(TimerCmd::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("accepting", &self.accepting.load(Ordering::Acquire))
            .finish()
    }
}

fn timer_loop(rx: Receiver<TimerCmd>) {
    let mut heap: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();

    loop {
        let now = Instant::now();

        while heap
            .peek()
            .map_or(false, |Reverse(entry)| entry.deadline <= now)
        {
            let Reverse(mut entry) = heap.pop().expect("peeked entry");
            if entry.cancelled.load(Ordering::Acquire) {
                continue;
            }

            (entry.action)();

            if let Some(period) = entry.period {
                entry.deadline += period;
                heap.push(Reverse(entry));
            }
        }

        let wait = heap
            .peek()
            .map(|Reverse(entry)| entry.deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(TimerCmd::Register(entry)) => {
                if !entry.cancelled.load(Ordering::Acquire) {
                    heap.push(Reverse(entry));
                }
            }
            Ok(TimerCmd::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn test_timer() -> Timer {
        Timer::spawn("test-timer".to_string()).unwrap()
    }

    #[test]
    fn test_one_shot_fires_once() {
        let timer = test_timer();
        let fired = Arc::new(AtomicUsize::new(0));

        let counted = fired.clone();
        timer
            .register(
                Duration::from_millis(10),
                None,
                Box::new(move || {
                    counted.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_periodic_fires_repeatedly() {
        let timer = test_timer();
        let fired = Arc::new(AtomicUsize::new(0));

        let counted = fired.clone();
        timer
            .register(
                Duration::from_millis(5),
                Some(Duration::from_millis(10)),
                Box::new(move || {
                    counted.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_cancelled_entry_never_fires() {
        let timer = test_timer();
        let fired = Arc::new(AtomicUsize::new(0));

        let counted = fired.clone();
        let handle = timer
            .register(
                Duration::from_millis(50),
                None,
                Box::new(move || {
                    counted.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        handle.cancel();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_register_after_shutdown_fails() {
        let timer = test_timer();
        timer.shutdown();

        let result = timer.register(Duration::from_millis(1), None, Box::new(|| {}));
        assert!(result.is_err());
    }
}
