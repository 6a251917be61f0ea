// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable FIFO print queue with bounded-retry delivery and dead-lettering.
//
// The engine owns the in-memory queue and is the only writer of the queue
// and dead-letter files.  `drain` is single-flight: a trigger that arrives
// while a pass is running returns immediately and is not remembered.  A job
// enqueued at the tail end of a pass is therefore picked up by the *next*
// trigger (the next enqueue, or the shutdown drain), never by a self-scheduled
// follow-up.
//
// Per job:  Pending -> Attempting(k) -> Delivered | Attempting(k+1) | DeadLettered
//
// The job being attempted is kept in an in-flight slot rather than dropped
// from view, so every persist (including the checkpoint taken before each
// backoff sleep) records it at the head of the list with its current
// `retry_count`.  A crash mid-job therefore resumes with the attempts it has
// left instead of a fresh budget.
//
// Store calls are synchronous file I/O and run on the blocking pool
// (`spawn_blocking`), never on the async workers that serve requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

use quittung_core::error::{QuittungError, Result};
use quittung_core::types::{JobId, PrintJob};

use crate::delivery::DeliveryPort;
use crate::retry::{RetryConfig, RetryDecision, should_retry};
use crate::store::JobStore;

/// Totals for one completed drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub dead_lettered: usize,
}

/// Result of a drain trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// This call ran the pass until the queue was empty.
    Completed(DrainReport),
    /// Another pass was in progress; nothing was done.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Delivered,
    DeadLettered,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<PrintJob>,
    in_flight: Option<PrintJob>,
    /// Exhausted jobs whose dead-letter write failed.  Never attempted
    /// again; they stay in the queue file until a later dead-letter write
    /// (end of a pass, or the next start) succeeds.
    held: Vec<PrintJob>,
    /// Bumped for every snapshot taken for persistence.
    snapshot_seq: u64,
}

impl QueueState {
    /// In-flight job first, then pending in order, then held jobs.
    fn snapshot(&self) -> Vec<PrintJob> {
        self.in_flight
            .iter()
            .chain(self.pending.iter())
            .chain(self.held.iter())
            .cloned()
            .collect()
    }
}

/// The print queue engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct QueueEngine {
    state: Mutex<QueueState>,
    /// Sequence number of the snapshot last written to the store.  Checked
    /// on the blocking thread so an older snapshot never lands on disk
    /// after a newer one.
    written_seq: Arc<Mutex<u64>>,
    processing: AtomicBool,
    /// Signalled whenever a drain pass finishes.
    idle: Notify,
    port: Arc<dyn DeliveryPort>,
    store: Arc<dyn JobStore>,
    retry: RetryConfig,
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("queue_length", &self.queue_length())
            .field("processing", &self.is_draining())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl QueueEngine {
    /// Create an engine with an empty queue.  Call [`rehydrate`] at startup
    /// to restore jobs left by a previous process.
    ///
    /// [`rehydrate`]: Self::rehydrate
    pub fn new(port: Arc<dyn DeliveryPort>, store: Arc<dyn JobStore>, retry: RetryConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            written_seq: Arc::new(Mutex::new(0)),
            processing: AtomicBool::new(false),
            idle: Notify::new(),
            port,
            store,
            retry,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a store operation on the blocking pool.
    async fn on_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn JobStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| QuittungError::Store(format!("store task failed: {e}")))?
    }

    /// Append each job to the dead-letter store.  Returns the jobs that could
    /// not be written.
    async fn dead_letter_all(&self, jobs: Vec<PrintJob>) -> Vec<PrintJob> {
        let fallback = jobs.clone();
        let written = self
            .on_store(move |store| {
                let mut failed = Vec::new();
                for job in jobs {
                    if let Err(e) = store.append_dead_letter(&job) {
                        error!(
                            job_id = %job.id,
                            error = %e,
                            job = %job.payload,
                            "error writing to dead letter file"
                        );
                        failed.push(job);
                    }
                }
                Ok(failed)
            })
            .await;
        written.unwrap_or_else(|e| {
            error!(error = %e, "dead-letter write did not complete");
            fallback
        })
    }

    /// Replace the in-memory queue with whatever the store holds.
    ///
    /// A missing file means a first run.  An unreadable file is logged and
    /// the engine starts empty; the file is left untouched until the next
    /// persist overwrites it.  Records whose attempts were already used up
    /// (the process died during their final attempt) go straight to the
    /// dead-letter store; if that write fails they are kept in the queue
    /// file but not attempted.  Returns the number of jobs restored.
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> usize {
        let jobs = match self.on_store(|store| store.load_queue()).await {
            Ok(Some(jobs)) => jobs,
            Ok(None) => {
                info!("persistent queue file not found, starting with empty queue");
                return 0;
            }
            Err(e) => {
                error!(error = %e, "persistent queue unreadable, starting with empty queue");
                return 0;
            }
        };

        let (live, exhausted): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .partition(|job| job.retry_count < self.retry.max_attempts);

        for job in &exhausted {
            warn!(job_id = %job.id, retry_count = job.retry_count, "restored job has no attempts left");
        }
        let exhausted_count = exhausted.len();
        let held = if exhausted.is_empty() {
            Vec::new()
        } else {
            self.dead_letter_all(exhausted).await
        };
        let held_count = held.len();

        let restored = live.len();
        {
            let mut state = self.state();
            state.pending = live.into();
            state.in_flight = None;
            state.held = held;
        }
        if exhausted_count > held_count {
            self.checkpoint().await;
        }

        info!(
            restored,
            dead_lettered = exhausted_count - held_count,
            held = held_count,
            "loaded jobs from persistent queue"
        );
        restored
    }

    /// Append a job to the tail of the queue.  Purely in-memory; call
    /// [`persist`](Self::persist) to make it durable.
    pub fn enqueue(&self, payload: serde_json::Value) -> JobId {
        let job = PrintJob::new(payload);
        let id = job.id;
        let queue_length = {
            let mut state = self.state();
            state.pending.push_back(job);
            state.pending.len()
        };
        debug!(job_id = %id, queue_length, "job enqueued");
        id
    }

    /// Jobs waiting for their first (or next) attempt.  The job currently
    /// being attempted is not counted.
    pub fn queue_length(&self) -> usize {
        self.state().pending.len()
    }

    /// Whether a drain pass is running right now.
    pub fn is_draining(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Number of jobs in the dead-letter store.
    pub async fn dead_letter_count(&self) -> Result<usize> {
        self.on_store(|store| Ok(store.dead_letters()?.len())).await
    }

    /// Write the current queue (in-flight job first) to the store, replacing
    /// what was there.
    pub async fn persist(&self) -> Result<()> {
        let (seq, snapshot) = {
            let mut state = self.state();
            state.snapshot_seq += 1;
            (state.snapshot_seq, state.snapshot())
        };
        let written_seq = Arc::clone(&self.written_seq);
        self.on_store(move |store| {
            let mut written = written_seq.lock().unwrap_or_else(PoisonError::into_inner);
            if *written >= seq {
                debug!(seq, "newer snapshot already persisted, skipping");
                return Ok(());
            }
            store.save_queue(&snapshot)?;
            *written = seq;
            debug!(count = snapshot.len(), "persisted jobs to disk");
            Ok(())
        })
        .await
    }

    /// Persist, logging instead of failing.  The in-memory queue stays
    /// authoritative and the next persist rewrites everything.
    async fn checkpoint(&self) {
        if let Err(e) = self.persist().await {
            error!(error = %e, "error persisting queue to disk");
        }
    }

    /// Deliver every queued job, oldest first, then persist.
    ///
    /// Returns [`DrainOutcome::AlreadyRunning`] without touching the queue if
    /// another pass holds the processing flag.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> DrainOutcome {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in progress, trigger ignored");
            return DrainOutcome::AlreadyRunning;
        }
        let _guard = ProcessingGuard { engine: self };

        let mut report = DrainReport::default();
        loop {
            let job = {
                let mut state = self.state();
                let Some(job) = state.pending.pop_front() else {
                    break;
                };
                state.in_flight = Some(job.clone());
                job
            };

            match self.deliver(job).await {
                JobOutcome::Delivered => report.delivered += 1,
                JobOutcome::DeadLettered => report.dead_lettered += 1,
            }
            self.checkpoint().await;
        }

        self.retry_held().await;
        self.checkpoint().await;
        if report != DrainReport::default() {
            info!(
                delivered = report.delivered,
                dead_lettered = report.dead_lettered,
                "drain pass finished"
            );
        }
        DrainOutcome::Completed(report)
    }

    /// Run one full pass even if another is in progress: wait for that pass
    /// to end, then drain whatever remains.  Used on shutdown.
    pub async fn drain_to_completion(&self) -> DrainReport {
        loop {
            let finished = self.idle.notified();
            tokio::pin!(finished);
            // Register before testing the flag so a pass ending in between
            // still wakes us.
            finished.as_mut().enable();

            match self.drain().await {
                DrainOutcome::Completed(report) => return report,
                DrainOutcome::AlreadyRunning => {
                    info!("waiting for the running drain pass to finish");
                    finished.await;
                }
            }
        }
    }

    /// Offer held jobs to the dead-letter store again.  They stay held until
    /// the write succeeds.
    async fn retry_held(&self) {
        let held = self.state().held.clone();
        if held.is_empty() {
            return;
        }
        let failed = self.dead_letter_all(held).await;
        let mut state = self.state();
        state.held.retain(|job| failed.iter().any(|f| f.id == job.id));
        if state.held.is_empty() {
            info!("held jobs written to dead-letter store");
        }
    }

    /// Attempt one job until it prints or its budget runs out.
    async fn deliver(&self, mut job: PrintJob) -> JobOutcome {
        loop {
            job.retry_count += 1;
            let attempt = job.retry_count;
            self.state().in_flight = Some(job.clone());

            match self.port.attempt_delivery(&job).await {
                Ok(()) => {
                    self.state().in_flight = None;
                    info!(job_id = %job.id, attempt, "print job delivered");
                    return JobOutcome::Delivered;
                }
                Err(e) => {
                    warn!(job_id = %job.id, attempt, error = %e, "print job attempt failed");
                    match should_retry(attempt, &self.retry) {
                        RetryDecision::RetryAfter(delay) => {
                            self.checkpoint().await;
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::Exhausted => {
                            error!(job_id = %job.id, attempts = attempt, "print job failed after maximum retries");
                            // The job stays in flight until the write settles.
                            let failed = self.dead_letter_all(vec![job]).await;
                            {
                                let mut state = self.state();
                                state.in_flight = None;
                                state.held.extend(failed);
                            }
                            return JobOutcome::DeadLettered;
                        }
                    }
                }
            }
        }
    }
}

/// Clears the processing flag when a pass ends, including when the drain
/// future is dropped mid-job.  An interrupted job with attempts left goes
/// back to the head of the queue; one interrupted during its final attempt
/// is dead-lettered.
struct ProcessingGuard<'a> {
    engine: &'a QueueEngine,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        let exhausted = {
            let mut state = self.engine.state();
            match state.in_flight.take() {
                Some(job) if job.retry_count < self.engine.retry.max_attempts => {
                    warn!(job_id = %job.id, "drain interrupted, returning job to queue head");
                    state.pending.push_front(job);
                    None
                }
                other => other,
            }
        };
        if let Some(job) = exhausted {
            warn!(
                job_id = %job.id,
                attempts = job.retry_count,
                "drain interrupted during final attempt, dead-lettering job"
            );
            if let Err(e) = self.engine.store.append_dead_letter(&job) {
                error!(job_id = %job.id, error = %e, job = %job.payload, "error writing to dead letter file");
                self.engine.state().held.push(job);
            }
        }
        self.engine.processing.store(false, Ordering::Release);
        self.engine.idle.notify_waiters();
    }
}
