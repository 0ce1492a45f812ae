//! Bounded in-memory job queue with fail-fast enqueue.
//!
//! This module provides the buffer that decouples producers (the admission
//! path) from consumers (the worker pool):
//!
//! - Fixed capacity, set at construction and never resized
//! - `enqueue` never blocks; a full queue is reported as [`QueueError::QueueFull`]
//! - `dequeue` parks the caller until a job arrives, the cancellation token
//!   fires, or the queue is closed while empty
//! - Strict FIFO delivery
//!
//! # Synchronization
//!
//! The buffer and the closed flag live behind a single mutex, so "check
//! closed, check capacity, insert" is one atomic step and a concurrent
//! `close` can never drop a job whose enqueue reported success. Waiting
//! consumers park on a [`Notify`] that is armed before the buffer is
//! inspected, so a wakeup issued between the check and the wait is not lost.
//!
//! Jobs are not durable: dropping the queue drops whatever it buffers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::job::TranscriptionJob;

/// Errors that can occur during queue operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The buffer is at capacity; the caller should apply backpressure.
    #[error("Queue is full")]
    QueueFull,

    /// The queue has been closed and (for dequeue) fully drained.
    #[error("Queue is closed")]
    QueueClosed,

    /// Queue is empty (for non-blocking operations).
    #[error("Queue is empty")]
    QueueEmpty,

    /// The dequeue was cancelled before a job became available.
    #[error("Dequeue cancelled")]
    Cancelled,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<TranscriptionJob>,
    closed: bool,
}

/// Bounded multi-producer, multi-consumer transcription job queue.
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    available: Notify,
}

impl JobQueue {
    /// Creates an open, empty queue holding at most `capacity` jobs.
    ///
    /// A zero capacity is accepted and rejects every enqueue with
    /// [`QueueError::QueueFull`].
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            available: Notify::new(),
        }
    }

    /// Every critical section leaves the state consistent, so a panic in
    /// another holder does not invalidate it.
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a job to the back of the queue without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::QueueClosed`] once [`close`](Self::close) has been called
    /// - [`QueueError::QueueFull`] when the buffer is at capacity
    ///
    /// The queue is unchanged on error.
    pub fn enqueue(&self, job: TranscriptionJob) -> Result<(), QueueError> {
        {
            let mut state = self.lock_state();
            if state.closed {
                return Err(QueueError::QueueClosed);
            }
            if state.jobs.len() >= self.capacity {
                return Err(QueueError::QueueFull);
            }
            state.jobs.push_back(job);
        }

        self.available.notify_one();
        Ok(())
    }

    /// Removes the oldest job, waiting until one is available.
    ///
    /// Returns [`QueueError::Cancelled`] as soon as `cancel` fires (or
    /// immediately if it already has) without consuming a job, and
    /// [`QueueError::QueueClosed`] once the queue is closed and empty.
    pub async fn dequeue(
        &self,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionJob, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }

            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_dequeue() {
                Err(QueueError::QueueEmpty) => {}
                result => return result,
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`,
    /// reporting [`QueueError::Cancelled`].
    pub async fn dequeue_timeout(
        &self,
        timeout: Duration,
    ) -> Result<TranscriptionJob, QueueError> {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, self.dequeue(&cancel)).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Cancelled),
        }
    }

    /// Removes the oldest job without waiting.
    ///
    /// # Errors
    ///
    /// [`QueueError::QueueEmpty`] if nothing is buffered and the queue is
    /// open, [`QueueError::QueueClosed`] if nothing is buffered and it is closed.
    pub fn try_dequeue(&self) -> Result<TranscriptionJob, QueueError> {
        let mut state = self.lock_state();
        match state.jobs.pop_front() {
            Some(job) => Ok(job),
            None if state.closed => Err(QueueError::QueueClosed),
            None => Err(QueueError::QueueEmpty),
        }
    }

    /// Closes the queue. Idempotent.
    ///
    /// Subsequent enqueues fail; buffered jobs stay dequeueable and parked
    /// consumers are woken so they can drain or observe the closure.
    pub fn close(&self) {
        let pending = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.jobs.len()
        };

        debug!(pending_jobs = pending, "Job queue closed");
        self.available.notify_waiters();
    }

    /// Discards all buffered jobs and reopens the queue with the same capacity.
    ///
    /// Meant for controlled restarts; not for use while workers are dequeuing.
    pub fn reset(&self) {
        let discarded = {
            let mut state = self.lock_state();
            let discarded = state.jobs.len();
            state.jobs.clear();
            state.closed = false;
            discarded
        };

        debug!(discarded_jobs = discarded, "Job queue reset");
    }

    /// Returns the number of buffered jobs (advisory).
    pub fn len(&self) -> usize {
        self.lock_state().jobs.len()
    }

    /// Returns whether no jobs are buffered (advisory).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns whether [`close`](Self::close) has been called since the last reset.
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Returns a point-in-time snapshot of the queue.
    pub fn stats(&self) -> QueueStats {
        let state = self.lock_state();
        QueueStats {
            capacity: self.capacity,
            pending_jobs: state.jobs.len(),
            closed: state.closed,
        }
    }
}

/// Statistics about queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Maximum number of buffered jobs.
    pub capacity: usize,
    /// Number of jobs waiting to be processed.
    pub pending_jobs: usize,
    /// Whether the queue has been closed.
    pub closed: bool,
}

impl QueueStats {
    /// Returns how many more jobs fit before enqueue fails with `QueueFull`.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.pending_jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn create_test_job(n: usize) -> TranscriptionJob {
        TranscriptionJob::new(Uuid::new_v4(), format!("audio/{n}.wav"))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::new(10);
        let jobs: Vec<_> = (0..5).map(create_test_job).collect();
        for job in &jobs {
            queue.enqueue(job.clone()).expect("enqueue should succeed");
        }

        let cancel = CancellationToken::new();
        for expected in &jobs {
            let got = queue.dequeue(&cancel).await.expect("job available");
            assert_eq!(got.record_id(), expected.record_id());
        }
    }

    #[test]
    fn test_full_queue_rejects_and_keeps_length() {
        let queue = JobQueue::new(2);
        queue.enqueue(create_test_job(0)).expect("first fits");
        queue.enqueue(create_test_job(1)).expect("second fits");

        assert_eq!(queue.enqueue(create_test_job(2)), Err(QueueError::QueueFull));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_zero_capacity_always_full() {
        let queue = JobQueue::new(0);
        assert_eq!(queue.enqueue(create_test_job(0)), Err(QueueError::QueueFull));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_then_reports_closed() {
        let queue = JobQueue::new(4);
        queue.enqueue(create_test_job(0)).expect("enqueue");
        queue.enqueue(create_test_job(1)).expect("enqueue");
        queue.close();

        assert_eq!(queue.enqueue(create_test_job(2)), Err(QueueError::QueueClosed));

        let cancel = CancellationToken::new();
        assert!(queue.dequeue(&cancel).await.is_ok());
        assert!(queue.dequeue(&cancel).await.is_ok());
        assert_eq!(queue.dequeue(&cancel).await, Err(QueueError::QueueClosed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = JobQueue::new(1);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.try_dequeue(), Err(QueueError::QueueClosed));
    }

    #[tokio::test]
    async fn test_precancelled_dequeue_returns_immediately() {
        let queue = JobQueue::new(4);
        queue.enqueue(create_test_job(0)).expect("enqueue");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), queue.dequeue(&cancel))
            .await
            .expect("must not block");
        assert_eq!(result, Err(QueueError::Cancelled));
        // The buffered job was not consumed.
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_waiting_dequeue() {
        let queue = Arc::new(JobQueue::new(4));
        let cancel = CancellationToken::new();

        let waiter = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = waiter.await.expect("task should not panic");
        assert_eq!(result, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_close_unblocks_waiting_dequeue() {
        let queue = Arc::new(JobQueue::new(4));

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(&CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("close should wake the waiter")
            .expect("task should not panic");
        assert_eq!(result, Err(QueueError::QueueClosed));
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiting_dequeue() {
        let queue = Arc::new(JobQueue::new(4));
        let job = create_test_job(7);
        let expected = job.record_id();

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue(&CancellationToken::new()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(job).expect("enqueue");

        let got = waiter
            .await
            .expect("task should not panic")
            .expect("job delivered");
        assert_eq!(got.record_id(), expected);
    }

    #[tokio::test]
    async fn test_dequeue_timeout_reports_cancelled() {
        let queue = JobQueue::new(1);
        let result = queue.dequeue_timeout(Duration::from_millis(10)).await;
        assert_eq!(result, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_reset_restores_open_empty_queue() {
        let queue = JobQueue::new(3);
        for n in 0..3 {
            queue.enqueue(create_test_job(n)).expect("enqueue");
        }
        queue.close();

        queue.reset();

        assert!(!queue.is_closed());
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 3);
        for n in 0..3 {
            queue.enqueue(create_test_job(n)).expect("usable after reset");
        }
        assert_eq!(queue.enqueue(create_test_job(9)), Err(QueueError::QueueFull));
    }

    #[test]
    fn test_queue_stats() {
        let queue = JobQueue::new(5);
        queue.enqueue(create_test_job(0)).expect("enqueue");
        let stats = queue.stats();

        assert_eq!(stats.capacity, 5);
        assert_eq!(stats.pending_jobs, 1);
        assert!(!stats.closed);
        assert_eq!(stats.remaining_capacity(), 4);
    }

    #[test]
    fn test_queue_error_display() {
        assert!(QueueError::QueueFull.to_string().contains("full"));
        assert!(QueueError::QueueClosed.to_string().contains("closed"));
        assert!(QueueError::QueueEmpty.to_string().contains("empty"));
        assert!(QueueError::Cancelled.to_string().contains("cancelled"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_and_consumers() {
        const PRODUCERS: usize = 4;
        const JOBS_PER_PRODUCER: usize = 250;
        const CONSUMERS: usize = 3;

        let queue = Arc::new(JobQueue::new(64));
        let rejected = Arc::new(AtomicUsize::new(0));

        let mut producers = Vec::new();
        for p in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            let rejected = Arc::clone(&rejected);
            producers.push(tokio::spawn(async move {
                let mut accepted = Vec::new();
                for n in 0..JOBS_PER_PRODUCER {
                    let job = create_test_job(p * JOBS_PER_PRODUCER + n);
                    let id = job.record_id();
                    match queue.enqueue(job) {
                        Ok(()) => accepted.push(id),
                        Err(QueueError::QueueFull) => {
                            rejected.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected enqueue error: {e}"),
                    }
                    if n % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                accepted
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..CONSUMERS {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                let mut seen = Vec::new();
                while let Ok(job) = queue.dequeue(&cancel).await {
                    seen.push(job.record_id());
                }
                seen
            }));
        }

        let mut accepted = HashSet::new();
        for producer in producers {
            accepted.extend(producer.await.expect("producer should not panic"));
        }
        queue.close();

        let mut observed = Vec::new();
        for consumer in consumers {
            observed.extend(consumer.await.expect("consumer should not panic"));
        }

        let unique: HashSet<_> = observed.iter().copied().collect();
        assert_eq!(unique.len(), observed.len(), "no job delivered twice");
        assert_eq!(unique, accepted, "every accepted job delivered");
        assert_eq!(
            accepted.len() + rejected.load(Ordering::SeqCst),
            PRODUCERS * JOBS_PER_PRODUCER
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_enqueue_succeeds_after_close_returns() {
        let queue = Arc::new(JobQueue::new(100_000));
        let close_returned = Arc::new(AtomicBool::new(false));

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = Arc::clone(&queue);
            let close_returned = Arc::clone(&close_returned);
            producers.push(tokio::spawn(async move {
                let mut accepted = 0usize;
                let mut n = 0usize;
                loop {
                    let closed_before_call = close_returned.load(Ordering::SeqCst);
                    match queue.enqueue(create_test_job(p * 1_000_000 + n)) {
                        Ok(()) => {
                            assert!(!closed_before_call, "enqueue succeeded after close");
                            accepted += 1;
                        }
                        Err(QueueError::QueueClosed) => return accepted,
                        Err(QueueError::QueueFull) => tokio::task::yield_now().await,
                        Err(e) => panic!("unexpected enqueue error: {e}"),
                    }
                    n += 1;
                    if n % 32 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        queue.close();
        close_returned.store(true, Ordering::SeqCst);

        let mut accepted = 0;
        for producer in producers {
            accepted += producer.await.expect("producer should not panic");
        }

        let mut drained = 0;
        while queue.try_dequeue().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, accepted, "close must not drop accepted jobs");
    }
}
