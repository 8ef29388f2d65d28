//! Out-of-band failure reporting for sync operations.
//!
//! Every failed write produces a [`SyncFailure`]. The reconciler hands it to
//! a [`FailureNotifier`], a bounded channel the UI layer drains to show a
//! non-blocking error notification. The call site that triggered the write
//! never sees the failure directly.
//!
//! Sending happens inside the spawned write, so a full channel only delays
//! that write's completion. No failure is dropped while a receiver exists.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use planverse_proto::{CollectionPath, Task, WriteKind};

use super::PassId;
use crate::store::StoreError;
use crate::tasks::WriteOp;

/// Default capacity of the failure channel.
pub const DEFAULT_FAILURE_BUFFER: usize = 64;

/// A single write the store did not accept.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    /// Reconciliation pass that issued the write.
    pub pass: PassId,
    /// Collection path for creates, document path otherwise.
    pub path: String,
    /// Kind of write that failed.
    pub kind: WriteKind,
    /// The data the write tried to store; `None` for deletes.
    pub attempted: Option<Task>,
    /// The underlying store error.
    pub error: Arc<StoreError>,
}

impl SyncFailure {
    /// Builds the failure record for `op` issued against `collection`.
    #[must_use]
    pub fn new(pass: PassId, collection: &CollectionPath, op: &WriteOp, error: StoreError) -> Self {
        let path = match op {
            WriteOp::Create(_) => collection.to_string(),
            WriteOp::Update { id, .. } | WriteOp::Delete(id) => collection.document(id),
        };
        Self {
            pass,
            path,
            kind: op.kind(),
            attempted: op.payload().cloned(),
            error: Arc::new(error),
        }
    }

    /// Returns `true` if the store's access rules refused the write.
    #[must_use]
    pub fn is_permission(&self) -> bool {
        self.error.is_permission()
    }

    /// Request context in the shape a rules debugger expects.
    #[must_use]
    pub fn context(&self) -> serde_json::Value {
        let mut context = serde_json::json!({
            "path": self.path,
            "operation": self.kind,
        });
        if let (Some(task), Some(map)) = (&self.attempted, context.as_object_mut()) {
            map.insert(
                "requestResourceData".to_string(),
                serde_json::to_value(task).unwrap_or(serde_json::Value::Null),
            );
        }
        context
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_permission() {
            write!(
                f,
                "Missing or insufficient permissions: the following request was denied: {}",
                self.context()
            )
        } else {
            write!(f, "{} on {} failed: {}", self.kind, self.path, self.error)
        }
    }
}

impl std::error::Error for SyncFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

/// Sending half of the failure channel.
///
/// Cheap to clone; every spawned operation holds its own copy.
#[derive(Debug, Clone)]
pub struct FailureNotifier {
    tx: mpsc::Sender<SyncFailure>,
}

impl FailureNotifier {
    /// Creates a notifier and the receiver the UI layer should drain.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncFailure>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Publishes a failure, waiting for room if the channel is full.
    ///
    /// Returns `false` if nobody is listening any more; the failure is then
    /// only logged.
    pub async fn notify(&self, failure: SyncFailure) -> bool {
        match self.tx.send(failure).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(failure)) => {
                tracing::debug!(
                    pass = %failure.pass,
                    path = %failure.path,
                    "failure receiver dropped"
                );
                false
            }
        }
    }
}
