//! Applies reconciliation plans against a task store.
//!
//! A [`Reconciler`] turns each [`ReconcilePlan`] into independent tokio
//! tasks, one per write, and returns immediately. There is no ordering
//! between writes, no rollback, and no retry. Failures are published on the
//! injected [`FailureNotifier`]; the returned [`PassHandle`] can be awaited
//! when the caller wants to observe completion.

pub mod notify;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::join_all;
use tokio::task::JoinHandle;

use planverse_proto::{CollectionPath, Task, TaskId};

pub use notify::{DEFAULT_FAILURE_BUFFER, FailureNotifier, SyncFailure};

use crate::store::{StoreError, TaskStore};
use crate::tasks::{ReconcilePlan, WriteOp, plan};

/// Identifies one reconciliation pass. Increases monotonically per
/// [`Reconciler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassId(u64);

impl PassId {
    /// Wraps a raw pass number.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw pass number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type OpResult = Result<Option<TaskId>, SyncFailure>;

/// Issues create, update and delete writes for one user's collection.
pub struct Reconciler<S: TaskStore> {
    store: Arc<S>,
    path: CollectionPath,
    notifier: Option<FailureNotifier>,
    next_pass: AtomicU64,
}

impl<S: TaskStore + 'static> Reconciler<S> {
    /// Creates a reconciler for the collection at `path`.
    ///
    /// Without a notifier, failures are only logged and reported through
    /// [`PassHandle::wait`].
    #[must_use]
    pub const fn new(store: Arc<S>, path: CollectionPath) -> Self {
        Self {
            store,
            path,
            notifier: None,
            next_pass: AtomicU64::new(0),
        }
    }

    /// Publishes every failed write on `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: FailureNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the collection this reconciler writes to.
    #[must_use]
    pub const fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Diffs `previous` against `desired` and starts every resulting write.
    ///
    /// Returns without waiting for any write. Must be called from within a
    /// tokio runtime.
    pub fn reconcile(&self, previous: &[Task], desired: &[Task]) -> PassHandle {
        self.apply(plan(previous, desired))
    }

    /// Starts every write in `plan` as its own task.
    pub fn apply(&self, plan: ReconcilePlan) -> PassHandle {
        let pass = PassId(self.next_pass.fetch_add(1, Ordering::Relaxed) + 1);
        if plan.is_empty() {
            tracing::trace!(%pass, path = %self.path, "nothing to reconcile");
        } else {
            tracing::debug!(
                %pass,
                path = %self.path,
                creates = plan.creates(),
                updates = plan.updates(),
                deletes = plan.deletes(),
                "starting reconciliation pass"
            );
        }

        let mut ops = Vec::with_capacity(plan.len());
        let mut handles = Vec::with_capacity(plan.len());
        for op in plan {
            handles.push(self.spawn_op(pass, op.clone()));
            ops.push(op);
        }

        PassHandle {
            pass,
            path: self.path.clone(),
            ops,
            handles,
        }
    }

    fn spawn_op(&self, pass: PassId, op: WriteOp) -> JoinHandle<OpResult> {
        let store = Arc::clone(&self.store);
        let path = self.path.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            match execute(store.as_ref(), &path, &op).await {
                Ok(assigned) => {
                    tracing::trace!(%pass, kind = %op.kind(), "write confirmed");
                    Ok(assigned)
                }
                Err(error) => {
                    let failure = SyncFailure::new(pass, &path, &op, error);
                    tracing::warn!(
                        %pass,
                        kind = %failure.kind,
                        path = %failure.path,
                        error = %failure.error,
                        "write failed"
                    );
                    if let Some(notifier) = &notifier {
                        notifier.notify(failure.clone()).await;
                    }
                    Err(failure)
                }
            }
        })
    }
}

impl<S: TaskStore> fmt::Debug for Reconciler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("path", &self.path)
            .field("notifier", &self.notifier.is_some())
            .field("next_pass", &self.next_pass.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

async fn execute<S: TaskStore>(
    store: &S,
    path: &CollectionPath,
    op: &WriteOp,
) -> Result<Option<TaskId>, StoreError> {
    match op {
        WriteOp::Create(task) => store.create(path, task).await.map(Some),
        WriteOp::Update { id, task } => store.update(path, id, task).await.map(|()| None),
        WriteOp::Delete(id) => store.delete(path, id).await.map(|()| None),
    }
}

/// The in-flight writes of one pass.
///
/// Dropping the handle detaches the writes; they still run to completion.
#[derive(Debug)]
pub struct PassHandle {
    pass: PassId,
    path: CollectionPath,
    ops: Vec<WriteOp>,
    handles: Vec<JoinHandle<OpResult>>,
}

impl PassHandle {
    /// Returns the pass id.
    #[must_use]
    pub const fn pass(&self) -> PassId {
        self.pass
    }

    /// Returns the writes issued by this pass.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Number of writes issued.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the pass issued no writes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns `true` once every write has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Waits for every write and collects their outcomes.
    ///
    /// A write whose task panicked is reported as
    /// [`StoreError::Unavailable`].
    pub async fn wait(self) -> PassReport {
        let Self {
            pass,
            path,
            ops,
            handles,
        } = self;

        let results = join_all(handles).await;
        let outcomes = ops
            .into_iter()
            .zip(results)
            .map(|(op, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    Err(SyncFailure::new(
                        pass,
                        &path,
                        &op,
                        StoreError::Unavailable(format!("write task failed: {e}")),
                    ))
                });
                OpOutcome { op, result }
            })
            .collect();

        PassReport { pass, outcomes }
    }
}

/// Result of one write.
#[derive(Debug, Clone)]
pub struct OpOutcome {
    /// The write that was issued.
    pub op: WriteOp,
    /// The store-assigned id for creates, `None` for other successes.
    pub result: Result<Option<TaskId>, SyncFailure>,
}

impl OpOutcome {
    /// Returns `true` if the store accepted the write.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns the id the store assigned, for successful creates.
    #[must_use]
    pub fn assigned_id(&self) -> Option<&TaskId> {
        self.result.as_ref().ok().and_then(Option::as_ref)
    }

    /// Returns the failure, if the write was not accepted.
    #[must_use]
    pub fn failure(&self) -> Option<&SyncFailure> {
        self.result.as_ref().err()
    }
}

/// Outcomes of every write in a finished pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Pass the outcomes belong to.
    pub pass: PassId,
    /// One outcome per issued write, in plan order.
    pub outcomes: Vec<OpOutcome>,
}

impl PassReport {
    /// Iterates over the failed writes.
    pub fn failures(&self) -> impl Iterator<Item = &SyncFailure> {
        self.outcomes.iter().filter_map(OpOutcome::failure)
    }

    /// Number of writes the store accepted.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Returns `true` if every write was accepted.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(OpOutcome::is_success)
    }
}
