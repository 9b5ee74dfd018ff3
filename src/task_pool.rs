//! Deferred job scheduling for the connection runtime
//!
//! The runtime drives its state machine through small jobs: sending queued
//! operations, firing publish retries, and keep-alive probes. Jobs are
//! plain async blocks spawned onto the tokio runtime, optionally deferred,
//! with best-effort cancellation. There is no event loop; each job runs to
//! completion independently.

use crate::error::{MqttError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

const STATE_SCHEDULED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_COMPLETED: u8 = 2;
const STATE_CANCELLED: u8 = 3;

/// Outcome of a cancellation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    /// The job was cancelled before it started running
    Cancelled,
    /// The job is currently executing and will run to completion
    InProgress,
    /// The job already ran to completion (or was cancelled earlier)
    Completed,
}

/// Schedules jobs onto the tokio runtime
///
/// Cloning is cheap; all clones share the same shutdown flag. Once the pool
/// is shut down, further scheduling fails with
/// [`MqttError::SchedulingError`]; jobs already scheduled run to
/// completion.
#[derive(Clone, Default)]
pub struct TaskPool {
    shutdown: Arc<AtomicBool>,
}

impl TaskPool {
    /// Creates a new task pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops admitting new jobs
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether the pool has been shut down
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Schedules a job to run after `delay` (immediately for a zero delay)
    ///
    /// # Errors
    ///
    /// Returns `MqttError::SchedulingError` if the pool has been shut down.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> Result<JobHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(MqttError::SchedulingError);
        }

        let state = Arc::new(AtomicU8::new(STATE_SCHEDULED));
        let job_state = Arc::clone(&state);

        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // A concurrent try_cancel may have won; the job must not run.
            if job_state
                .compare_exchange(
                    STATE_SCHEDULED,
                    STATE_RUNNING,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
            {
                return;
            }

            job.await;
            job_state.store(STATE_COMPLETED, Ordering::SeqCst);
        });

        Ok(JobHandle { state, task })
    }
}

/// Handle to a scheduled job
#[derive(Debug)]
pub struct JobHandle {
    state: Arc<AtomicU8>,
    task: tokio::task::JoinHandle<()>,
}

impl JobHandle {
    /// Attempts to cancel the job
    ///
    /// Cancellation is best-effort: a job that has already started running
    /// is reported as [`CancelResult::InProgress`] and runs to completion.
    pub fn try_cancel(&self) -> CancelResult {
        match self.state.compare_exchange(
            STATE_SCHEDULED,
            STATE_CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.task.abort();
                CancelResult::Cancelled
            }
            Err(STATE_RUNNING) => CancelResult::InProgress,
            Err(_) => CancelResult::Completed,
        }
    }

    /// Whether the job finished executing
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_COMPLETED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_immediate_job_runs() {
        let pool = TaskPool::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let handle = pool
            .schedule(Duration::ZERO, async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        // Yield until the job ran.
        for _ in 0..100 {
            if handle.is_completed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(handle.try_cancel(), CancelResult::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_job() {
        let pool = TaskPool::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let handle = pool
            .schedule(Duration::from_millis(500), async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(499)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(2)).await;
        for _ in 0..100 {
            if handle.is_completed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire() {
        let pool = TaskPool::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let handle = pool
            .schedule(Duration::from_secs(10), async move {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(handle.try_cancel(), CancelResult::Cancelled);

        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // A second cancel reports the job as already settled.
        assert_eq!(handle.try_cancel(), CancelResult::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_jobs() {
        let pool = TaskPool::new();
        pool.shutdown();

        let result = pool.schedule(Duration::ZERO, async {});
        assert_eq!(result.unwrap_err(), MqttError::SchedulingError);
    }
}
