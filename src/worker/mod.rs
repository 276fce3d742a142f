//! Asynchronous inbox processing.
//!
//! The HTTP handler only verifies and persists; all processing happens here.
//! Keys arrive over an mpsc channel (fresh ingests from the handler, due
//! retries from the sweep loop). Each key is processed on its own task, so
//! distinct events proceed in parallel while the coordinator's claim step
//! keeps any single key exclusive.

pub mod processor;

pub use processor::OrderRefreshProcessor;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{IdempotencyKey, now_epoch};
use crate::webhook::coordinator::Coordinator;
use crate::webhook::inbox::InboxEntry;

/// How often the sweep loop checks for due retries.
pub const RETRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A processing failure. The coordinator decides whether it is retried.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProcessError {
    pub message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        ProcessError {
            message: message.into(),
        }
    }
}

/// Applies one inbox entry to the downstream system.
///
/// Implementations must be idempotent: the same entry may be processed more
/// than once across crashes and retries.
pub trait WebhookProcessor {
    fn process(
        &self,
        entry: &InboxEntry,
    ) -> impl Future<Output = Result<(), ProcessError>> + Send;
}

/// Claims `key` and runs it through `processor`, recording the outcome.
///
/// A key that cannot be claimed (in flight, not due, terminal) is skipped
/// silently; at-least-once delivery means spurious wakeups are normal.
pub async fn process_one<P: WebhookProcessor>(
    coordinator: &Coordinator,
    processor: &P,
    key: &IdempotencyKey,
) {
    let guard = match coordinator.claim(key, now_epoch()) {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            debug!(key = %key, "skipping unclaimable key");
            return;
        }
        Err(e) => {
            warn!(key = %key, error = %e, "claim failed");
            return;
        }
    };

    let outcome = processor.process(guard.entry()).await;
    let result = match outcome {
        Ok(()) => coordinator.complete(guard),
        Err(e) => coordinator.fail(guard, e.to_string(), now_epoch()),
    };
    if let Err(e) = result {
        warn!(key = %key, error = %e, "failed to record processing outcome");
    }
}

/// Drives processing of keys received on `rx` until cancellation.
///
/// Spawns one task per key; in-flight tasks are awaited before returning so
/// shutdown never abandons a claim mid-write.
pub async fn run_worker<P>(
    coordinator: Coordinator,
    processor: Arc<P>,
    mut rx: mpsc::Receiver<IdempotencyKey>,
    cancel: CancellationToken,
) where
    P: WebhookProcessor + Send + Sync + 'static,
{
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe_key = rx.recv() => {
                let Some(key) = maybe_key else { break };
                let coordinator = coordinator.clone();
                let processor = Arc::clone(&processor);
                tasks.spawn(async move {
                    process_one(&coordinator, processor.as_ref(), &key).await;
                });
            }
            // Reap finished tasks so the set does not grow unboundedly.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    info!(in_flight = tasks.len(), "worker shutting down; draining tasks");
    while tasks.join_next().await.is_some() {}
}

/// Periodically feeds due work (queued entries and due retries) back into
/// the processing channel.
pub async fn run_retry_sweep(
    coordinator: Coordinator,
    tx: mpsc::Sender<IdempotencyKey>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let due = match coordinator.due_work(now_epoch()) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "retry sweep failed to list due entries");
                continue;
            }
        };
        for key in due {
            debug!(key = %key, "requeueing due retry");
            if tx.send(key).await.is_err() {
                // Receiver gone; the worker is shutting down.
                return;
            }
        }
    }
}
