// crates/litecache/src/writer.rs
// ============================================================================
// Module: Write Serializer
// Description: Single-consumer mutation queue drained by one writer thread.
// Purpose: Apply mutations one at a time, in acceptance order, atomically.
// Dependencies: tracing, crate::store
// ============================================================================

//! ## Overview
//! Every mutation enters one unbounded channel and is applied by one
//! long-lived thread, so ordering falls out of the queue itself. Sequence
//! numbers are assigned while holding the submit lock, which makes the
//! channel order and the sequence order identical across concurrent callers.
//!
//! Blocking submitters wait on a per-command response channel. Non-blocking
//! submitters return once the command is queued; their failures are logged
//! and the worker moves on to the next command.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::store::Store;
use crate::store::StoreError;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Types
// ============================================================================

/// How a submitter waits for its mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Wait until the mutation has committed.
    Blocking,
    /// Return once the mutation is queued.
    NonBlocking,
}

/// Acknowledgement of a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Acceptance sequence number.
    pub sequence: u64,
    /// Rows affected by the statement.
    pub rows_affected: usize,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Blocking submission that has committed.
    Applied(Ack),
    /// Non-blocking submission accepted into the queue.
    Queued {
        /// Acceptance sequence number.
        sequence: u64,
    },
}

/// Mutation waiting to be applied.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    /// Acceptance sequence number.
    pub sequence: u64,
    /// Mutating SQL statement.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<SqlValue>,
    /// Time the mutation was accepted.
    pub submitted_at: Instant,
}

/// Callback run on the writer thread after every successful commit.
pub type CommitHook = Box<dyn Fn(&Ack) + Send + 'static>;

/// Point-in-time writer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStatsSnapshot {
    /// Mutations accepted into the queue.
    pub enqueued: u64,
    /// Mutations refused because the serializer was shut down.
    pub rejected: u64,
    /// Mutations committed.
    pub applied: u64,
    /// Mutations the store rejected.
    pub failed: u64,
    /// Mutations accepted but not yet applied.
    pub pending: u64,
}

/// Queue command carrying a mutation and an optional reply channel.
struct WriterCommand {
    /// Mutation to apply.
    mutation: PendingMutation,
    /// Reply channel for blocking submitters.
    response: Option<mpsc::Sender<Result<Ack, StoreError>>>,
}

/// Submit-side state guarded by one lock.
struct SubmitState {
    /// Queue sender; `None` once shutdown has begun.
    sender: Option<mpsc::Sender<WriterCommand>>,
    /// Next sequence number to assign.
    next_sequence: u64,
}

/// Counters shared between submitters and the worker.
#[derive(Default)]
struct WriterDiagnostics {
    /// Accepted count.
    enqueued: AtomicU64,
    /// Refused count.
    rejected: AtomicU64,
    /// Committed count.
    applied: AtomicU64,
    /// Failed count.
    failed: AtomicU64,
}

/// Serialized single-writer gateway to the store.
pub struct WriteSerializer {
    /// Sender and sequence counter.
    submit: Mutex<SubmitState>,
    /// Worker thread handle; taken on shutdown.
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Shared counters.
    diagnostics: Arc<WriterDiagnostics>,
}

// ============================================================================
// SECTION: Implementation
// ============================================================================

impl WriteSerializer {
    /// Starts the writer thread over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the thread cannot be spawned.
    pub fn spawn(store: Arc<dyn Store>, on_commit: Option<CommitHook>) -> Result<Self, StoreError> {
        let (sender, receiver) = mpsc::channel();
        let diagnostics = Arc::new(WriterDiagnostics::default());
        let worker_diagnostics = Arc::clone(&diagnostics);
        let worker = thread::Builder::new()
            .name("litecache-writer".to_string())
            .spawn(move || {
                writer_loop(store.as_ref(), &receiver, &worker_diagnostics, on_commit.as_ref());
            })
            .map_err(|err| StoreError::Io(format!("failed to spawn writer thread: {err}")))?;
        Ok(Self {
            submit: Mutex::new(SubmitState {
                sender: Some(sender),
                next_sequence: 1,
            }),
            worker: Mutex::new(Some(worker)),
            diagnostics,
        })
    }

    /// Queues a mutation in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after shutdown, or the store's error for
    /// a failed blocking submission.
    pub fn submit(
        &self,
        sql: &str,
        params: &[SqlValue],
        mode: WriteMode,
    ) -> Result<Submission, StoreError> {
        match mode {
            WriteMode::Blocking => self.submit_blocking(sql, params).map(Submission::Applied),
            WriteMode::NonBlocking => self.submit_async(sql, params).map(|sequence| {
                Submission::Queued {
                    sequence,
                }
            }),
        }
    }

    /// Queues a mutation and waits until it has committed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after shutdown, or the store's error
    /// when the mutation fails.
    pub fn submit_blocking(&self, sql: &str, params: &[SqlValue]) -> Result<Ack, StoreError> {
        let (response, receiver) = mpsc::channel();
        self.enqueue(sql, params, Some(response))?;
        receiver.recv().map_err(|_| StoreError::Io("writer response channel closed".to_string()))?
    }

    /// Queues a mutation and returns its sequence number without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after shutdown.
    pub fn submit_async(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        self.enqueue(sql, params, None)
    }

    /// Stops accepting work, drains accepted mutations, and joins the worker.
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the worker thread panicked.
    pub fn shutdown(&self) -> Result<(), StoreError> {
        let sender = self.submit.lock().unwrap_or_else(PoisonError::into_inner).sender.take();
        drop(sender);
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            worker.join().map_err(|_| StoreError::Io("writer thread panicked".to_string()))?;
        }
        Ok(())
    }

    /// Returns true once shutdown has begun.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.submit.lock().unwrap_or_else(PoisonError::into_inner).sender.is_none()
    }

    /// Returns a snapshot of writer counters.
    #[must_use]
    pub fn stats(&self) -> WriterStatsSnapshot {
        let enqueued = self.diagnostics.enqueued.load(Ordering::Acquire);
        let applied = self.diagnostics.applied.load(Ordering::Acquire);
        let failed = self.diagnostics.failed.load(Ordering::Acquire);
        WriterStatsSnapshot {
            enqueued,
            rejected: self.diagnostics.rejected.load(Ordering::Relaxed),
            applied,
            failed,
            pending: enqueued.saturating_sub(applied.saturating_add(failed)),
        }
    }

    /// Assigns a sequence number and sends the command under the submit lock.
    fn enqueue(
        &self,
        sql: &str,
        params: &[SqlValue],
        response: Option<mpsc::Sender<Result<Ack, StoreError>>>,
    ) -> Result<u64, StoreError> {
        let mut state = self.submit.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = state.next_sequence;
        let Some(sender) = state.sender.as_ref() else {
            drop(state);
            self.diagnostics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Closed);
        };
        let command = WriterCommand {
            mutation: PendingMutation {
                sequence,
                sql: sql.to_string(),
                params: params.to_vec(),
                submitted_at: Instant::now(),
            },
            response,
        };
        if sender.send(command).is_err() {
            drop(state);
            self.diagnostics.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Io("writer thread unavailable".to_string()));
        }
        state.next_sequence = sequence.wrapping_add(1);
        drop(state);
        self.diagnostics.enqueued.fetch_add(1, Ordering::AcqRel);
        Ok(sequence)
    }
}

impl Drop for WriteSerializer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Applies queued mutations until every sender is gone and the queue is empty.
fn writer_loop(
    store: &dyn Store,
    receiver: &mpsc::Receiver<WriterCommand>,
    diagnostics: &WriterDiagnostics,
    on_commit: Option<&CommitHook>,
) {
    while let Ok(command) = receiver.recv() {
        let WriterCommand {
            mutation,
            response,
        } = command;
        let queued_us =
            u64::try_from(mutation.submitted_at.elapsed().as_micros()).unwrap_or(u64::MAX);
        tracing::debug!(
            sequence = mutation.sequence,
            queued_us,
            sql = %mutation.sql,
            "applying mutation"
        );
        let outcome = store.apply(&mutation.sql, &mutation.params).map(|rows_affected| Ack {
            sequence: mutation.sequence,
            rows_affected,
        });
        match &outcome {
            Ok(ack) => {
                if let Some(hook) = on_commit {
                    hook(ack);
                }
                diagnostics.applied.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) => {
                diagnostics.failed.fetch_add(1, Ordering::AcqRel);
                if response.is_none() {
                    tracing::warn!(
                        sequence = mutation.sequence,
                        sql = %mutation.sql,
                        error = %err,
                        "async mutation failed"
                    );
                }
            }
        }
        if let Some(response) = response {
            let _ = response.send(outcome);
        }
    }
    tracing::debug!("writer queue drained");
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::value::Row;
    use crate::value::RowSet;

    /// Store double recording applied statements.
    #[derive(Default)]
    struct RecordingStore {
        /// Applied SQL in order.
        applied: Mutex<Vec<String>>,
    }

    impl Store for RecordingStore {
        fn has_tables(&self) -> Result<bool, StoreError> {
            Ok(true)
        }

        fn execute_script(&self, _script: &str) -> Result<(), StoreError> {
            Ok(())
        }

        fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<RowSet, StoreError> {
            Ok(vec![Row::default()])
        }

        fn apply(&self, sql: &str, _params: &[SqlValue]) -> Result<usize, StoreError> {
            if sql.starts_with("BAD") {
                return Err(StoreError::Db("syntax error".to_string()));
            }
            self.applied.lock().unwrap().push(sql.to_string());
            Ok(1)
        }

        fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn async_failure_does_not_stop_worker() {
        let store = Arc::new(RecordingStore::default());
        let serializer = WriteSerializer::spawn(store.clone(), None).unwrap();
        serializer.submit("BAD one", &[], WriteMode::NonBlocking).unwrap();
        let submission = serializer.submit("GOOD two", &[], WriteMode::Blocking).unwrap();
        assert!(matches!(submission, Submission::Applied(Ack { sequence: 2, rows_affected: 1 })));
        serializer.shutdown().unwrap();
        assert_eq!(*store.applied.lock().unwrap(), vec!["GOOD two".to_string()]);
        let stats = serializer.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn blocking_failure_is_surfaced() {
        let store = Arc::new(RecordingStore::default());
        let serializer = WriteSerializer::spawn(store, None).unwrap();
        let err = serializer.submit("BAD", &[], WriteMode::Blocking).unwrap_err();
        assert_eq!(err, StoreError::Db("syntax error".to_string()));
    }

    #[test]
    fn shutdown_drains_and_refuses() {
        let store = Arc::new(RecordingStore::default());
        let serializer = WriteSerializer::spawn(store.clone(), None).unwrap();
        for index in 0 .. 50 {
            serializer.submit(&format!("M{index}"), &[], WriteMode::NonBlocking).unwrap();
        }
        serializer.shutdown().unwrap();
        assert_eq!(store.applied.lock().unwrap().len(), 50);
        assert!(serializer.is_shut_down());
        let err = serializer.submit("late", &[], WriteMode::NonBlocking).unwrap_err();
        assert_eq!(err, StoreError::Closed);
        assert_eq!(serializer.stats().rejected, 1);
        serializer.shutdown().unwrap();
    }

    #[test]
    fn commit_hook_runs_before_reply() {
        let store = Arc::new(RecordingStore::default());
        let commits = Arc::new(AtomicUsize::new(0));
        let hook_commits = Arc::clone(&commits);
        let hook: CommitHook = Box::new(move |_ack| {
            hook_commits.fetch_add(1, Ordering::SeqCst);
        });
        let serializer = WriteSerializer::spawn(store, Some(hook)).unwrap();
        serializer.submit("GOOD", &[], WriteMode::Blocking).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 1);
    }
}
