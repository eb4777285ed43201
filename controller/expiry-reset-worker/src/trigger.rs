//! Reset trigger - filters expiration events and fires the reset call
//!
//! Each matching event spawns one reset task, so a burst of expirations can
//! produce overlapping calls unless the trigger is built `serialized`.

use crate::notification::NotificationEvent;
use crate::reset::{ResetClient, ResetError};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Result of one reset attempt
pub type ResetOutcome = Result<StatusCode, ResetError>;

/// True when `event` reports the expiration of `counter_key`.
///
/// The key comparison is exact. `db_index` narrows the match to one database;
/// `None` accepts an expiration in any of them.
pub fn matches_counter_key(
    event: &NotificationEvent,
    counter_key: &str,
    db_index: Option<u32>,
) -> bool {
    let Some(db) = event.db_index() else {
        return false;
    };
    if db_index.is_some_and(|want| want != db) {
        return false;
    }
    event.payload == counter_key
}

#[derive(Debug, Default)]
pub struct TriggerStats {
    received: AtomicU64,
    matched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub matched: u64,
    pub succeeded: u64,
    pub failed: u64,
}

fn incr(a: &AtomicU64) {
    a.fetch_add(1, Ordering::Relaxed);
}

impl TriggerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct ResetTrigger<R: ResetClient> {
    client: Arc<R>,
    counter_key: String,
    db_index: Option<u32>,
    in_flight: Option<Arc<Mutex<()>>>,
    stats: Arc<TriggerStats>,
}

impl<R: ResetClient + 'static> ResetTrigger<R> {
    pub fn new(client: Arc<R>, counter_key: impl Into<String>) -> Self {
        Self {
            client,
            counter_key: counter_key.into(),
            db_index: None,
            in_flight: None,
            stats: Arc::new(TriggerStats::default()),
        }
    }

    /// Only react to expirations in `db_index` (`None` = every database)
    pub fn with_db_index(mut self, db_index: Option<u32>) -> Self {
        self.db_index = db_index;
        self
    }

    /// Run resets one at a time instead of letting them overlap
    pub fn serialized(mut self, serialize: bool) -> Self {
        self.in_flight = serialize.then(|| Arc::new(Mutex::new(())));
        self
    }

    pub fn counter_key(&self) -> &str {
        &self.counter_key
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counters, readable after the trigger has moved into a worker
    pub fn stats_handle(&self) -> Arc<TriggerStats> {
        self.stats.clone()
    }

    /// Filter `event` and, on a match, start exactly one reset call.
    ///
    /// Returns the handle of the spawned call, `None` when the event is ignored.
    pub fn dispatch(&self, event: NotificationEvent) -> Option<JoinHandle<ResetOutcome>> {
        incr(&self.stats.received);
        if !matches_counter_key(&event, &self.counter_key, self.db_index) {
            debug!(channel = %event.channel, key = %event.payload, "trigger: ignored");
            return None;
        }
        incr(&self.stats.matched);
        info!(
            channel = %event.channel,
            key = %event.payload,
            "trigger: counter expired, triggering backend reset"
        );

        let client = self.client.clone();
        let in_flight = self.in_flight.clone();
        let stats = self.stats.clone();
        Some(tokio::spawn(async move {
            let _slot = match in_flight.as_ref() {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };
            let outcome = client.reset().await;
            record(&stats, &outcome);
            outcome
        }))
    }
}

fn record(stats: &TriggerStats, outcome: &ResetOutcome) {
    match outcome {
        Ok(status) => {
            incr(&stats.succeeded);
            info!(status = %status, "trigger: reset called successfully");
        }
        Err(e) => {
            incr(&stats.failed);
            match e {
                ResetError::Endpoint { status, body } => error!(
                    kind = e.kind(),
                    status = %status,
                    body = %body,
                    "trigger: reset rejected by endpoint"
                ),
                ResetError::Transport { source } => error!(
                    kind = e.kind(),
                    error = %source,
                    "trigger: reset endpoint unreachable"
                ),
                ResetError::Client { message } => error!(
                    kind = e.kind(),
                    error = %message,
                    "trigger: reset request invalid"
                ),
            }
        }
    }
}
