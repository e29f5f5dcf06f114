//! Background task that runs execution cycles.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Shared between a worker task and its handle.
///
/// The task polls [`WorkerSignal::is_running`] between cycles and parks in
/// [`WorkerSignal::idle`] while there is nothing to do.
#[derive(Clone, Debug)]
pub(crate) struct WorkerSignal {
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
}

impl WorkerSignal {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notifier: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until woken or until `timeout` passes, whichever comes first.
    ///
    /// Returns `true` when woken.
    pub async fn idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notifier.notified())
            .await
            .is_ok()
    }

    fn wake(&self) {
        self.notifier.notify_one();
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
    }
}

/// Owns a spawned worker task and stops it on drop.
pub(crate) struct BatchWorkerHandle {
    signal: WorkerSignal,

    /// Becomes `None` once shutdown is initiated
    handle: Option<JoinHandle<()>>,
}

impl BatchWorkerHandle {
    /// Spawn the future `task` builds on the current tokio runtime.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(WorkerSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = WorkerSignal::new();
        let handle = tokio::spawn(task(signal.clone()));
        Self {
            signal,
            handle: Some(handle),
        }
    }

    /// Wake the worker to look for queued requests.
    pub fn notify(&self) {
        self.signal.wake();
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.signal.is_running()
    }

    /// Ask the worker to stop after its current cycle.
    ///
    /// The task is detached rather than awaited; a cycle that is already
    /// executing still delivers every outcome.
    pub fn shutdown(&mut self) {
        self.signal.stop();

        if let Some(handle) = self.handle.take() {
            tokio::spawn(async move {
                let _ = handle.await;
            });
        }
    }
}

impl Drop for BatchWorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time;

    const IDLE: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_worker_starts_running() {
        let worker = BatchWorkerHandle::spawn(|signal| async move {
            while signal.is_running() {
                signal.idle(IDLE).await;
            }
        });

        assert!(worker.is_running());
    }

    #[tokio::test]
    async fn test_worker_wakes_on_notify() {
        let wakeups = Arc::new(AtomicUsize::new(0));
        let counted = wakeups.clone();

        let worker = BatchWorkerHandle::spawn(|signal| async move {
            while signal.is_running() {
                if signal.idle(Duration::from_secs(60)).await && signal.is_running() {
                    counted.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        time::sleep(Duration::from_millis(50)).await;
        worker.notify();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);

        worker.notify();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(wakeups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_shutdown() {
        let stopped = Arc::new(AtomicBool::new(false));
        let observed = stopped.clone();

        let mut worker = BatchWorkerHandle::spawn(|signal| async move {
            while signal.is_running() {
                signal.idle(Duration::from_secs(60)).await;
            }
            observed.store(true, Ordering::SeqCst);
        });

        time::sleep(Duration::from_millis(50)).await;
        worker.shutdown();
        time::sleep(Duration::from_millis(100)).await;

        assert!(!worker.is_running());
        assert!(stopped.load(Ordering::SeqCst));
        assert!(worker.handle.is_none());
    }

    #[tokio::test]
    async fn test_drop_triggers_shutdown() {
        let stopped = Arc::new(AtomicBool::new(false));
        let observed = stopped.clone();

        {
            let _worker = BatchWorkerHandle::spawn(|signal| async move {
                while signal.is_running() {
                    signal.idle(Duration::from_secs(60)).await;
                }
                observed.store(true, Ordering::SeqCst);
            });
            time::sleep(Duration::from_millis(50)).await;
        }

        time::sleep(Duration::from_millis(100)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_multiple_shutdowns() {
        let mut worker = BatchWorkerHandle::spawn(|signal| async move {
            while signal.is_running() {
                signal.idle(IDLE).await;
            }
        });

        worker.shutdown();
        worker.shutdown();

        assert!(!worker.is_running());
    }
}
