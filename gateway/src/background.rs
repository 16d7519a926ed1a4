//! Background submission discipline for the fire-and-forget writes
//! (`AppendUsage`, `TouchEndpoint`) (spec.md §5, §9 — C10 in SPEC_FULL.md).
//! A bounded channel decouples these writes from the reply path; a single
//! worker task drains it against the metadata store and stops cleanly on
//! shutdown instead of leaking in-flight work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gateway_core::types::UsageLogEntry;
use gateway_store::MetadataStore;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 1024;

pub enum BackgroundJob {
    AppendUsage(UsageLogEntry),
    TouchEndpoint { endpoint_id: String, now: DateTime<Utc> },
}

#[derive(Clone)]
pub struct BackgroundQueue {
    sender: mpsc::Sender<BackgroundJob>,
}

impl BackgroundQueue {
    /// Spawns the drain worker and returns a handle plus its join handle
    /// (the caller awaits the join handle during graceful shutdown).
    pub fn spawn(store: Arc<dyn MetadataStore>) -> (Self, tokio::task::JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel(QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                match job {
                    BackgroundJob::AppendUsage(entry) => {
                        if let Err(err) = store.append_usage(entry).await {
                            tracing::warn!(error = %err, "failed to append usage log entry");
                        }
                    }
                    BackgroundJob::TouchEndpoint { endpoint_id, now } => {
                        if let Err(err) = store.touch_endpoint(&endpoint_id, now).await {
                            tracing::warn!(error = %err, endpoint_id, "failed to touch endpoint");
                        }
                    }
                }
            }
        });

        (Self { sender }, handle)
    }

    /// Enqueues a job. Never blocks the caller on backpressure; a full
    /// queue drops the job with a warning rather than stalling the reply
    /// (these writes are advisory telemetry, not authoritative state).
    pub fn submit(&self, job: BackgroundJob) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.sender.try_send(job) {
            tracing::warn!("background queue full, dropping job");
        }
    }
}
