//! Per-session offline queue for generation requests that failed after the
//! retry budget (visual generation only).
//!
//! Each session has a FIFO of `QueuedGenerationRequest`. The TTL applies to
//! the queue as a whole, measured from when it was created: once it passes,
//! every entry is discarded without being replayed.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::QueueConfig;
use crate::db::models::StyleAttributes;
use crate::error::AppError;

// =============================================================================
// Queued requests
// =============================================================================

/// Everything needed to re-issue a visual generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualRequest {
    pub prompt: String,
    pub style: StyleAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedGenerationRequest {
    pub session_id: String,
    pub params: VisualRequest,
    pub requested_at: DateTime<Utc>,
    pub retry_count: u32,
}

struct SessionQueue {
    created_at: DateTime<Utc>,
    items: VecDeque<QueuedGenerationRequest>,
}

/// Outcome of one replay pass.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport<T> {
    pub results: Vec<T>,
    /// Requests still queued after the pass.
    pub remaining: usize,
    /// The queue had outlived its TTL and was dropped unreplayed.
    pub expired: bool,
    /// Message of the failure that stopped the pass early.
    pub stopped_on: Option<String>,
}

impl<T> ReplayReport<T> {
    fn empty(expired: bool) -> Self {
        Self {
            results: Vec::new(),
            remaining: 0,
            expired,
            stopped_on: None,
        }
    }
}

// =============================================================================
// OfflineGenerationQueue
// =============================================================================

pub struct OfflineGenerationQueue {
    queues: Mutex<HashMap<String, SessionQueue>>,
    ttl: Duration,
    replay_delay: StdDuration,
    clock: Arc<dyn Clock>,
}

impl OfflineGenerationQueue {
    pub fn new(config: &QueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            ttl: Duration::hours(config.ttl_hours),
            replay_delay: StdDuration::from_millis(config.replay_delay_ms),
            clock,
        }
    }

    /// Append a request to the session's queue. Returns the new depth.
    ///
    /// Every queue past its TTL is dropped first, including queues of
    /// sessions that are never replayed.
    pub fn enqueue(&self, session_id: &str, params: VisualRequest) -> usize {
        let now = self.clock.now();
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());

        let before = queues.len();
        queues.retain(|_, q| now - q.created_at < self.ttl);
        if queues.len() < before {
            tracing::info!(dropped = before - queues.len(), "discarded expired offline queues");
        }

        let queue = queues
            .entry(session_id.to_string())
            .or_insert_with(|| SessionQueue {
                created_at: now,
                items: VecDeque::new(),
            });
        queue.items.push_back(QueuedGenerationRequest {
            session_id: session_id.to_string(),
            params,
            requested_at: now,
            retry_count: 0,
        });
        tracing::info!(session_id, depth = queue.items.len(), "queued generation request for replay");
        queue.items.len()
    }

    /// Pending requests for a session; an expired queue counts as empty and
    /// is dropped.
    pub fn pending(&self, session_id: &str) -> usize {
        if self.drop_if_expired(session_id) {
            return 0;
        }
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(session_id).map(|q| q.items.len()).unwrap_or(0)
    }

    /// Snapshot of the session's queued requests in replay order.
    pub fn snapshot(&self, session_id: &str) -> Vec<QueuedGenerationRequest> {
        if self.drop_if_expired(session_id) {
            return Vec::new();
        }
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .get(session_id)
            .map(|q| q.items.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_queue(&self, session_id: &str) -> bool {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.contains_key(session_id)
    }

    /// Replay a session's queue in FIFO order through `generate`.
    ///
    /// Successes are collected. The first failure puts its request back at
    /// the front and ends the pass, since the provider is probably still
    /// degraded. `replay_delay` separates consecutive calls. A drained queue
    /// is removed from the registry.
    pub async fn replay<T, F, Fut>(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
        mut generate: F,
    ) -> Result<ReplayReport<T>, AppError>
    where
        F: FnMut(QueuedGenerationRequest) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if self.drop_if_expired(session_id) {
            return Ok(ReplayReport::empty(true));
        }

        let mut report = ReplayReport::empty(false);
        let mut first = true;

        while let Some(mut request) = self.pop_front(session_id) {
            if !first {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.push_front(request);
                        return Err(AppError::Cancelled);
                    }
                    _ = tokio::time::sleep(self.replay_delay) => {}
                }
            }
            first = false;

            match generate(request.clone()).await {
                Ok(result) => report.results.push(result),
                Err(AppError::Cancelled) => {
                    self.push_front(request);
                    return Err(AppError::Cancelled);
                }
                Err(e) => {
                    request.retry_count += 1;
                    tracing::warn!(
                        session_id,
                        retry_count = request.retry_count,
                        error = %e,
                        "replay failed, keeping request queued"
                    );
                    self.push_front(request);
                    report.stopped_on = Some(e.to_string());
                    break;
                }
            }
        }

        report.remaining = self.remove_if_drained(session_id);
        tracing::info!(
            session_id,
            replayed = report.results.len(),
            remaining = report.remaining,
            "offline queue replay finished"
        );
        Ok(report)
    }

    fn drop_if_expired(&self, session_id: &str) -> bool {
        let now = self.clock.now();
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let expired = queues
            .get(session_id)
            .is_some_and(|q| now - q.created_at >= self.ttl);
        if expired {
            if let Some(q) = queues.remove(session_id) {
                tracing::info!(session_id, dropped = q.items.len(), "offline queue expired");
            }
        }
        expired
    }

    fn pop_front(&self, session_id: &str) -> Option<QueuedGenerationRequest> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get_mut(session_id)?.items.pop_front()
    }

    fn push_front(&self, request: QueuedGenerationRequest) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let created_at = request.requested_at;
        queues
            .entry(request.session_id.clone())
            .or_insert_with(|| SessionQueue {
                created_at,
                items: VecDeque::new(),
            })
            .items
            .push_front(request);
    }

    fn remove_if_drained(&self, session_id: &str) -> usize {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let remaining = queues.get(session_id).map(|q| q.items.len()).unwrap_or(0);
        if remaining == 0 {
            queues.remove(session_id);
        }
        remaining
    }
}
