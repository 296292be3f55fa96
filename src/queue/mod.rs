//! Offline action queue
//!
//! Mutations recorded while the backend is unreachable are kept in the
//! durable store and delivered in recording order on the next flush. A
//! failed delivery leaves the action queued for the next flush; an action
//! that keeps failing is moved to a dead-letter namespace once it reaches
//! the configured attempt ceiling.
//!
//! Flushing needs a connection: while the device is offline a flush delivers
//! nothing and attempt counts are left alone.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::QueueConfig;
use crate::connectivity::ConnectivityState;
use crate::error::{Error, Result, StoreError};
use crate::store::{LocalStore, StoredEntry};

/// Namespace holding queued actions
pub const ACTIONS_NAMESPACE: &str = "actions";
/// Namespace holding actions that reached the attempt ceiling
pub const DEAD_LETTER_NAMESPACE: &str = "actions/dead";

const SEQUENCE: &str = "actions";

/// What a queued action does once delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AddContact,
    UpdateContact,
    DeleteContact,
    SubmitReport,
    UpdateSettings,
    Custom(String),
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::AddContact => write!(f, "add_contact"),
            ActionKind::UpdateContact => write!(f, "update_contact"),
            ActionKind::DeleteContact => write!(f, "delete_contact"),
            ActionKind::SubmitReport => write!(f, "submit_report"),
            ActionKind::UpdateSettings => write!(f, "update_settings"),
            ActionKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A mutation waiting for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: u64,
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
}

/// Outcome of one flush
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    pub succeeded: Vec<u64>,
    /// Still queued after a failed delivery
    pub failed: Vec<u64>,
    /// Moved to the dead-letter namespace by this flush
    pub dead_lettered: Vec<u64>,
    /// Outcome reached the backend but could not be written back to the
    /// store; the action may be delivered again
    pub unrecorded: Vec<u64>,
    /// Another flush was already running; nothing was attempted
    pub coalesced: bool,
    /// The device was offline; actions from this point on were not attempted
    pub offline: bool,
}

impl FlushReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.dead_lettered.len()
    }
}

/// The backend that queued actions are delivered to
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Deliver one action. `Ok` is a positive acknowledgement; the action is
    /// removed from the queue only after it.
    async fn deliver(&self, action: &PendingAction) -> Result<()>;
}

/// Durable FIFO of pending actions
pub struct ActionQueue {
    store: Arc<dyn LocalStore>,
    backend: Arc<dyn SyncBackend>,
    config: QueueConfig,
    connectivity: ConnectivityState,
    flushing: Mutex<()>,
}

enum FailureOutcome {
    Retained,
    DeadLettered,
    /// Discarded while the delivery was in flight
    Gone,
}

fn unavailable(err: StoreError) -> Error {
    Error::StorageUnavailable(err.to_string())
}

fn action_key(id: u64) -> String {
    // Zero padding keeps key order equal to id order
    format!("{:020}", id)
}

fn decode(entry: &StoredEntry) -> Option<PendingAction> {
    match serde_json::from_slice(&entry.data) {
        Ok(action) => Some(action),
        Err(e) => {
            warn!("Skipping unreadable queued action {}: {}", entry.key, e);
            None
        }
    }
}

impl ActionQueue {
    /// Open the queue over `store`, failing if the store cannot be read
    pub fn open(
        store: Arc<dyn LocalStore>,
        backend: Arc<dyn SyncBackend>,
        config: QueueConfig,
        connectivity: ConnectivityState,
    ) -> Result<Self> {
        let queued = store.list(ACTIONS_NAMESPACE).map_err(unavailable)?;
        debug!("Opened action queue with {} pending actions", queued.len());

        Ok(Self {
            store,
            backend,
            config,
            connectivity,
            flushing: Mutex::new(()),
        })
    }

    /// Record an action durably and return its id
    pub fn enqueue(&self, kind: ActionKind, payload: serde_json::Value) -> Result<u64> {
        let id = self.store.next_sequence(SEQUENCE).map_err(unavailable)?;
        let action = PendingAction {
            id,
            kind,
            payload,
            recorded_at: Utc::now(),
            attempts: 0,
        };
        self.write(ACTIONS_NAMESPACE, &action)?;

        debug!("Queued action {} ({})", id, action.kind);
        Ok(id)
    }

    /// Queued actions in recording order
    pub fn pending(&self) -> Result<Vec<PendingAction>> {
        self.read_all(ACTIONS_NAMESPACE)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop a queued action without delivering it
    pub fn discard(&self, id: u64) -> Result<bool> {
        let removed = self
            .store
            .delete(ACTIONS_NAMESPACE, &action_key(id))
            .map_err(unavailable)?;
        if removed {
            info!("Discarded queued action {}", id);
        }
        Ok(removed)
    }

    /// Try to deliver every queued action, oldest first.
    ///
    /// Failures do not stop the batch, and neither does a store error while
    /// recording an outcome. If a flush is already running this call returns
    /// at once with `coalesced` set. While offline nothing is delivered and
    /// the report has `offline` set.
    pub async fn flush(&self) -> Result<FlushReport> {
        let Ok(_guard) = self.flushing.try_lock() else {
            debug!("Flush already in progress, coalescing");
            return Ok(FlushReport {
                coalesced: true,
                ..FlushReport::default()
            });
        };

        let mut report = FlushReport::default();
        if !self.connectivity.is_online() {
            debug!("Offline, deferring flush");
            report.offline = true;
            return Ok(report);
        }

        let batch = self.pending()?;
        if batch.is_empty() {
            return Ok(report);
        }
        debug!("Flushing {} queued actions", batch.len());

        for action in batch {
            if !self.connectivity.is_online() {
                info!("Connection lost, deferring remaining actions");
                report.offline = true;
                break;
            }

            match self.backend.deliver(&action).await {
                Ok(()) => {
                    report.succeeded.push(action.id);
                    if let Err(e) = self.store.delete(ACTIONS_NAMESPACE, &action_key(action.id)) {
                        warn!("Delivered action {} but could not dequeue it: {}", action.id, e);
                        report.unrecorded.push(action.id);
                    }
                }
                Err(err) => {
                    let id = action.id;
                    match self.record_failure(action, &err) {
                        Ok(FailureOutcome::Retained) => report.failed.push(id),
                        Ok(FailureOutcome::DeadLettered) => report.dead_lettered.push(id),
                        Ok(FailureOutcome::Gone) => {}
                        Err(e) => {
                            warn!("Could not record failed delivery of action {}: {}", id, e);
                            report.failed.push(id);
                            report.unrecorded.push(id);
                        }
                    }
                }
            }
        }

        info!(
            "Flush complete: {} delivered, {} failed, {} dead-lettered",
            report.succeeded.len(),
            report.failed.len(),
            report.dead_lettered.len()
        );
        Ok(report)
    }

    fn record_failure(&self, mut action: PendingAction, err: &Error) -> Result<FailureOutcome> {
        // A failure caused by losing the connection is not the action's fault
        if self.connectivity.is_online() {
            action.attempts += 1;
        }
        debug!(
            "Delivery of action {} failed (attempt {}): {}",
            action.id, action.attempts, err
        );

        let key = action_key(action.id);
        if self
            .store
            .get(ACTIONS_NAMESPACE, &key)
            .map_err(unavailable)?
            .is_none()
        {
            return Ok(FailureOutcome::Gone);
        }

        if self.config.max_attempts > 0 && action.attempts >= self.config.max_attempts {
            warn!(
                "Action {} ({}) failed {} times, moving to dead letters",
                action.id, action.kind, action.attempts
            );
            self.write(DEAD_LETTER_NAMESPACE, &action)?;
            self.store
                .delete(ACTIONS_NAMESPACE, &key)
                .map_err(unavailable)?;
            Ok(FailureOutcome::DeadLettered)
        } else {
            self.write(ACTIONS_NAMESPACE, &action)?;
            Ok(FailureOutcome::Retained)
        }
    }

    pub fn dead_letters(&self) -> Result<Vec<PendingAction>> {
        self.read_all(DEAD_LETTER_NAMESPACE)
    }

    /// Put a dead-lettered action back in the queue with a fresh attempt count.
    ///
    /// It keeps its original id, so it is delivered ahead of newer actions.
    pub fn requeue_dead_letter(&self, id: u64) -> Result<bool> {
        let key = action_key(id);
        let Some(entry) = self
            .store
            .get(DEAD_LETTER_NAMESPACE, &key)
            .map_err(unavailable)?
        else {
            return Ok(false);
        };
        let Some(mut action) = decode(&entry) else {
            return Ok(false);
        };

        action.attempts = 0;
        self.write(ACTIONS_NAMESPACE, &action)?;
        self.store
            .delete(DEAD_LETTER_NAMESPACE, &key)
            .map_err(unavailable)?;

        info!("Requeued dead-lettered action {}", id);
        Ok(true)
    }

    /// Drop every dead letter, returning how many were removed
    pub fn purge_dead_letters(&self) -> Result<usize> {
        let removed = self
            .store
            .clear_namespace(DEAD_LETTER_NAMESPACE)
            .map_err(unavailable)?;
        if removed > 0 {
            info!("Purged {} dead-lettered actions", removed);
        }
        Ok(removed)
    }

    fn write(&self, namespace: &str, action: &PendingAction) -> Result<()> {
        let data = serde_json::to_vec(action)?;
        self.store
            .put(namespace, &action_key(action.id), &data)
            .map_err(unavailable)
    }

    fn read_all(&self, namespace: &str) -> Result<Vec<PendingAction>> {
        let entries = self.store.list(namespace).map_err(unavailable)?;
        Ok(entries.iter().filter_map(decode).collect())
    }
}
