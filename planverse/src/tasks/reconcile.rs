//! Pure diff between a persisted snapshot and a desired task list.
//!
//! [`plan`] decides which records to create, update, or delete. It does no
//! I/O; [`crate::sync::Reconciler`] turns the resulting [`ReconcilePlan`]
//! into independent store operations.
//!
//! Change detection is deep structural equality over the whole [`Task`],
//! so any attribute difference (including a cleared description) counts.

use std::collections::{HashMap, HashSet};

use planverse_proto::{Task, TaskId, WriteKind};

/// One write the reconciler must issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Persist a task the baseline does not know. The store assigns the id;
    /// any provisional id on the task only identifies it to the caller.
    Create(Task),
    /// Replace the stored fields of an existing document.
    Update {
        /// Identity of the document to update.
        id: TaskId,
        /// Desired state of the document.
        task: Task,
    },
    /// Remove a document.
    Delete(TaskId),
}

impl WriteOp {
    /// Returns the kind of write.
    #[must_use]
    pub const fn kind(&self) -> WriteKind {
        match self {
            Self::Create(_) => WriteKind::Create,
            Self::Update { .. } => WriteKind::Update,
            Self::Delete(_) => WriteKind::Delete,
        }
    }

    /// Returns the id the caller knows this record by.
    ///
    /// For creates this is the provisional id, if the task carried one.
    #[must_use]
    pub fn target(&self) -> Option<&TaskId> {
        match self {
            Self::Create(task) => task.persisted_id(),
            Self::Update { id, .. } | Self::Delete(id) => Some(id),
        }
    }

    /// Returns the payload sent to the store, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&Task> {
        match self {
            Self::Create(task) | Self::Update { task, .. } => Some(task),
            Self::Delete(_) => None,
        }
    }
}

/// The full set of writes for one reconciliation pass.
///
/// Operations are independent of each other; their order in the plan
/// carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    ops: Vec<WriteOp>,
}

impl ReconcilePlan {
    /// Returns `true` if the pass has nothing to do.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Total number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.ops.len()
    }

    /// Number of create operations.
    #[must_use]
    pub fn creates(&self) -> usize {
        self.count(WriteKind::Create)
    }

    /// Number of update operations.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.count(WriteKind::Update)
    }

    /// Number of delete operations.
    #[must_use]
    pub fn deletes(&self) -> usize {
        self.count(WriteKind::Delete)
    }

    /// Returns the operations.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Iterates over the operations.
    pub fn iter(&self) -> std::slice::Iter<'_, WriteOp> {
        self.ops.iter()
    }

    /// Keeps only the operations for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&WriteOp) -> bool) {
        self.ops.retain(keep);
    }

    fn count(&self, kind: WriteKind) -> usize {
        self.ops.iter().filter(|op| op.kind() == kind).count()
    }
}

impl IntoIterator for ReconcilePlan {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReconcilePlan {
    type Item = &'a WriteOp;
    type IntoIter = std::slice::Iter<'a, WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Computes the writes that turn `previous` into `desired`.
///
/// - A desired task with no id, an empty id, or an id unknown to `previous`
///   becomes a [`WriteOp::Create`].
/// - A task present in both with any differing field becomes a
///   [`WriteOp::Update`].
/// - A previous task whose id is missing from `desired` becomes a
///   [`WriteOp::Delete`].
///
/// Previous tasks without an id are ignored: there is nothing to address.
/// If an id repeats within one list, its first occurrence wins.
#[must_use]
pub fn plan(previous: &[Task], desired: &[Task]) -> ReconcilePlan {
    let mut known: HashMap<&TaskId, &Task> = HashMap::with_capacity(previous.len());
    for task in previous {
        if let Some(id) = task.persisted_id() {
            known.entry(id).or_insert(task);
        }
    }

    let mut ops = Vec::new();
    let mut wanted: HashSet<&TaskId> = HashSet::with_capacity(desired.len());

    for task in desired {
        let Some(id) = task.persisted_id() else {
            ops.push(WriteOp::Create(task.clone()));
            continue;
        };
        if !wanted.insert(id) {
            continue;
        }
        match known.get(id) {
            None => ops.push(WriteOp::Create(task.clone())),
            Some(prev) if *prev != task => ops.push(WriteOp::Update {
                id: id.clone(),
                task: task.clone(),
            }),
            Some(_) => {}
        }
    }

    let mut removed: HashSet<&TaskId> = HashSet::new();
    for task in previous {
        if let Some(id) = task.persisted_id()
            && !wanted.contains(id)
            && removed.insert(id)
        {
            ops.push(WriteOp::Delete(id.clone()));
        }
    }

    ReconcilePlan { ops }
}
