//! Deadline timers for operations
//!
//! Each operation gets exactly one timer task. On expiry the task sends the
//! operation id into the dispatch loop's expiry channel; the loop then fails
//! whatever is still outstanding. Dropping the [`TimerHandle`] aborts the
//! task, which is how a completed operation releases its deadline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::operation::OperationId;

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    released: AtomicU64,
    fired: AtomicU64,
}

/// Timer accounting shared between the supervisor and its handles
#[derive(Debug, Clone, Default)]
pub struct SupervisorStats {
    inner: Arc<Counters>,
}

impl SupervisorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> u64 {
        self.inner.scheduled.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::SeqCst)
    }

    pub fn fired(&self) -> u64 {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Timers scheduled but not yet released
    pub fn outstanding(&self) -> u64 {
        self.scheduled().saturating_sub(self.released())
    }
}

/// Owned deadline of one operation
#[derive(Debug)]
pub struct TimerHandle {
    operation: OperationId,
    task: JoinHandle<()>,
    stats: SupervisorStats,
}

impl TimerHandle {
    pub fn operation(&self) -> OperationId {
        self.operation
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
        self.stats.inner.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Released deadline of {}", self.operation);
    }
}

/// Schedules deadline timers onto the current tokio runtime
#[derive(Debug, Clone)]
pub struct TimeoutSupervisor {
    expiry_tx: mpsc::UnboundedSender<OperationId>,
    stats: SupervisorStats,
}

impl TimeoutSupervisor {
    pub fn new(expiry_tx: mpsc::UnboundedSender<OperationId>) -> Self {
        Self::with_stats(expiry_tx, SupervisorStats::new())
    }

    pub fn with_stats(expiry_tx: mpsc::UnboundedSender<OperationId>, stats: SupervisorStats) -> Self {
        Self { expiry_tx, stats }
    }

    pub fn stats(&self) -> &SupervisorStats {
        &self.stats
    }

    /// Start the deadline for `operation`
    ///
    /// Returns `None` when called outside a tokio runtime; the operation
    /// then has no deadline and reports that when it is released.
    pub fn schedule(&self, operation: OperationId, deadline: Duration) -> Option<TimerHandle> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Cannot schedule deadline for {}: {}", operation, e);
                return None;
            }
        };

        let expiry_tx = self.expiry_tx.clone();
        let stats = self.stats.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(deadline).await;
            stats.inner.fired.fetch_add(1, Ordering::SeqCst);
            if expiry_tx.send(operation).is_err() {
                tracing::debug!("Expiry channel closed before {} fired", operation);
            }
        });

        self.stats.inner.scheduled.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Scheduled deadline of {} in {:?}", operation, deadline);

        Some(TimerHandle {
            operation,
            task,
            stats: self.stats.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_at_deadline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = TimeoutSupervisor::new(tx);
        let start = tokio::time::Instant::now();

        let handle = supervisor.schedule(OperationId::new(1), Duration::from_secs(2)).unwrap();
        assert_eq!(rx.recv().await, Some(OperationId::new(1)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2005));

        assert_eq!(supervisor.stats().fired(), 1);
        drop(handle);
        assert_eq!(supervisor.stats().released(), 1);
        assert_eq!(supervisor.stats().outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = TimeoutSupervisor::new(tx);

        let handle = supervisor.schedule(OperationId::new(2), Duration::from_millis(100)).unwrap();
        drop(handle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(supervisor.stats().scheduled(), 1);
        assert_eq!(supervisor.stats().released(), 1);
        assert_eq!(supervisor.stats().fired(), 0);
    }

    #[test]
    fn test_schedule_without_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let supervisor = TimeoutSupervisor::new(tx);
        assert!(supervisor.schedule(OperationId::new(3), Duration::from_secs(1)).is_none());
        assert_eq!(supervisor.stats().scheduled(), 0);
    }
}
