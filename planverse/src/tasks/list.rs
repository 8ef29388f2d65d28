//! Optimistic task list.
//!
//! [`TaskList`] holds what the user sees and, separately, the baseline it
//! last handed to the store. Edits change the visible list immediately;
//! [`TaskList::commit`] diffs it against the baseline and fires the writes.
//! Each task carries a [`SyncState`] so the UI can tell confirmed records
//! from ones still in flight or rejected.
//!
//! When a write fails, the baseline entry for that task is put back to what
//! it was before the pass. The next commit therefore issues the same write
//! again, which is how a user retries. Updates to a task whose create is
//! still in flight are held back until the store has assigned its id.

use std::collections::{HashMap, HashSet};

use planverse_proto::task::sort_by_due_date;
use planverse_proto::{Task, TaskDraft, TaskEdit, TaskId, WriteKind};

use super::{TaskError, WriteOp, plan};
use crate::store::TaskStore;
use crate::sync::{PassHandle, PassId, PassReport, Reconciler};

/// Persistence state of one task as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Changed locally; the write is not confirmed yet.
    Pending,
    /// The store accepted the latest write.
    Confirmed,
    /// The store rejected the latest write. Holds the reason.
    Failed(String),
}

/// A user's tasks with optimistic local state.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    /// Visible tasks, sorted by due date.
    tasks: Vec<Task>,
    /// Snapshot the next commit diffs against.
    baseline: Vec<Task>,
    states: HashMap<TaskId, SyncState>,
    /// Latest pass that touched each task.
    last_pass: HashMap<TaskId, PassId>,
    /// Baseline entries as they were before each in-flight pass.
    inflight: HashMap<PassId, HashMap<TaskId, Option<Task>>>,
    /// Provisional id -> store-assigned id.
    renamed: HashMap<TaskId, TaskId>,
    /// Provisional ids whose create has not reported back.
    creating: HashSet<TaskId>,
}

impl TaskList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from tasks read from the store.
    ///
    /// Tasks with an id are taken as confirmed. Tasks without one get a
    /// provisional id and are created by the next commit.
    #[must_use]
    pub fn from_snapshot(snapshot: Vec<Task>) -> Self {
        let mut list = Self::new();
        for task in snapshot {
            if let Some(id) = task.persisted_id().cloned() {
                list.states.insert(id, SyncState::Confirmed);
                list.baseline.push(task.clone());
                list.tasks.push(task);
            } else {
                let id = TaskId::provisional();
                list.states.insert(id.clone(), SyncState::Pending);
                list.tasks.push(task.with_id(id));
            }
        }
        sort_by_due_date(&mut list.tasks);
        list
    }

    /// Visible tasks, sorted by due date.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// The list the user wants persisted.
    #[must_use]
    pub fn desired(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    /// The snapshot the next commit diffs against.
    #[must_use]
    pub fn baseline(&self) -> &[Task] {
        &self.baseline
    }

    /// Looks up a visible task. Provisional ids keep working after the
    /// store has assigned a real one.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        let id = self.resolve(id);
        self.tasks.iter().find(|t| t.id.as_ref() == Some(&id))
    }

    /// Returns the sync state of a task, including removed tasks whose
    /// delete is still pending or failed.
    #[must_use]
    pub fn sync_state(&self, id: &TaskId) -> Option<&SyncState> {
        self.states.get(&self.resolve(id))
    }

    /// Number of tasks with unconfirmed changes.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == SyncState::Pending)
            .count()
    }

    /// Iterates over tasks whose latest write failed, with the reason.
    pub fn failed(&self) -> impl Iterator<Item = (&TaskId, &str)> {
        self.states.iter().filter_map(|(id, state)| match state {
            SyncState::Failed(reason) => Some((id, reason.as_str())),
            _ => None,
        })
    }

    /// Adds a task built from `draft` and returns its provisional id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] if the draft is invalid.
    pub fn add(&mut self, draft: TaskDraft) -> Result<TaskId, TaskError> {
        let id = TaskId::provisional();
        let task = draft.into_task()?.with_id(id.clone());
        self.tasks.push(task);
        sort_by_due_date(&mut self.tasks);
        self.states.insert(id.clone(), SyncState::Pending);
        Ok(id)
    }

    /// Applies a partial edit. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown id, or
    /// [`TaskError::Validation`] if the edit is invalid.
    pub fn edit(&mut self, id: &TaskId, edit: &TaskEdit) -> Result<bool, TaskError> {
        let id = self.resolve(id);
        let task = self.find_mut(&id)?;
        let changed = task.apply_edit(edit)?;
        if changed {
            self.states.insert(id, SyncState::Pending);
            sort_by_due_date(&mut self.tasks);
        }
        Ok(changed)
    }

    /// Flips the completion flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown id.
    pub fn toggle_complete(&mut self, id: &TaskId) -> Result<bool, TaskError> {
        let id = self.resolve(id);
        let task = self.find_mut(&id)?;
        task.completed = !task.completed;
        let completed = task.completed;
        self.states.insert(id, SyncState::Pending);
        Ok(completed)
    }

    /// Removes a task from the visible list and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] for an unknown id.
    pub fn remove(&mut self, id: &TaskId) -> Result<Task, TaskError> {
        let id = self.resolve(id);
        let index = self
            .tasks
            .iter()
            .position(|t| t.id.as_ref() == Some(&id))
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))?;
        let task = self.tasks.remove(index);
        if self.in_baseline(&id) {
            self.states.insert(id, SyncState::Pending);
        } else {
            self.states.remove(&id);
            self.last_pass.remove(&id);
        }
        Ok(task)
    }

    /// Starts writing every local change since the last commit.
    ///
    /// The baseline becomes the visible list straight away; the store
    /// catches up in the background. Feed the awaited report back through
    /// [`apply_report`](Self::apply_report).
    ///
    /// An update to a task whose create has not reported back is not
    /// issued. Its baseline entry is left as it was, so the commit after
    /// the create's report sends the update against the store's id.
    pub fn commit<S: TaskStore + 'static>(&mut self, reconciler: &Reconciler<S>) -> PassHandle {
        let mut writes = plan(&self.baseline, &self.tasks);
        let mut held = Vec::new();
        writes.retain(|op| match op {
            WriteOp::Update { id, .. } if self.creating.contains(id) => {
                held.extend(self.baseline.iter().find(|t| t.id.as_ref() == Some(id)).cloned());
                false
            }
            _ => true,
        });

        let handle = reconciler.apply(writes);
        let pass = handle.pass();

        let mut prior = HashMap::with_capacity(handle.len());
        for op in handle.ops() {
            let Some(id) = op.target() else {
                continue;
            };
            let before = self
                .baseline
                .iter()
                .find(|t| t.id.as_ref() == Some(id))
                .cloned();
            prior.insert(id.clone(), before);
            self.states.insert(id.clone(), SyncState::Pending);
            self.last_pass.insert(id.clone(), pass);
            if op.kind() == WriteKind::Create {
                self.creating.insert(id.clone());
            }
        }
        if !prior.is_empty() {
            self.inflight.insert(pass, prior);
        }

        // Edits that cancelled out leave nothing to write.
        for id in self.tasks.iter().filter_map(Task::persisted_id) {
            let settled = !self
                .last_pass
                .get(id)
                .is_some_and(|p| self.inflight.contains_key(p));
            if settled && self.states.get(id) == Some(&SyncState::Pending) {
                self.states.insert(id.clone(), SyncState::Confirmed);
            }
        }

        self.baseline.clone_from(&self.tasks);
        for task in held {
            if let Some(id) = task.id.clone() {
                tracing::debug!(%id, "update held until create is confirmed");
                self.restore_baseline(&id, Some(task));
            }
        }
        handle
    }

    /// Folds the outcome of a finished pass into the list.
    ///
    /// Successful creates swap the provisional id for the store's id
    /// everywhere. Sync states only change for tasks this pass was the
    /// latest to touch; older outcomes are overtaken by newer edits. A
    /// successful write leaves the task Pending if it still differs from
    /// the baseline, since that change has not been sent yet.
    pub fn apply_report(&mut self, report: &PassReport) {
        let mut prior = self.inflight.remove(&report.pass).unwrap_or_default();

        for outcome in &report.outcomes {
            let Some(target) = outcome.op.target() else {
                continue;
            };
            if outcome.op.kind() == WriteKind::Create {
                self.creating.remove(target);
            }
            if let Some(assigned) = outcome.assigned_id() {
                self.rename(target, assigned, outcome.op.payload());
            }

            let id = self.resolve(target);
            if self.last_pass.get(&id) != Some(&report.pass) {
                continue;
            }

            match &outcome.result {
                Ok(_) if outcome.op.kind() == WriteKind::Delete => {
                    self.states.remove(&id);
                    self.last_pass.remove(&id);
                }
                Ok(_) => {
                    let state = if self.matches_baseline(&id) {
                        SyncState::Confirmed
                    } else {
                        SyncState::Pending
                    };
                    self.states.insert(id, state);
                }
                Err(failure) => {
                    // An earlier create's report may have re-keyed the entry.
                    let before = prior
                        .remove(&id)
                        .or_else(|| prior.remove(target))
                        .flatten();
                    self.restore_baseline(&id, before);
                    self.states
                        .insert(id, SyncState::Failed(failure.to_string()));
                }
            }
        }
    }

    fn resolve(&self, id: &TaskId) -> TaskId {
        self.renamed.get(id).unwrap_or(id).clone()
    }

    fn in_baseline(&self, id: &TaskId) -> bool {
        self.baseline.iter().any(|t| t.id.as_ref() == Some(id))
    }

    fn matches_baseline(&self, id: &TaskId) -> bool {
        let visible = self.tasks.iter().find(|t| t.id.as_ref() == Some(id));
        let stored = self.baseline.iter().find(|t| t.id.as_ref() == Some(id));
        visible == stored
    }

    fn find_mut(&mut self, id: &TaskId) -> Result<&mut Task, TaskError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id.as_ref() == Some(id))
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))
    }

    /// Replaces a provisional id with the one the store assigned.
    ///
    /// If the user already removed the task and committed that, the created
    /// document is put back into the baseline so the next commit deletes it.
    fn rename(&mut self, provisional: &TaskId, assigned: &TaskId, payload: Option<&Task>) {
        self.renamed.insert(provisional.clone(), assigned.clone());

        for task in &mut self.tasks {
            if task.id.as_ref() == Some(provisional) {
                task.id = Some(assigned.clone());
            }
        }
        let mut in_baseline = false;
        for task in &mut self.baseline {
            if task.id.as_ref() == Some(provisional) {
                task.id = Some(assigned.clone());
                in_baseline = true;
            }
        }
        if !in_baseline
            && let Some(created) = payload
        {
            self.baseline.push(created.clone().with_id(assigned.clone()));
        }

        if let Some(state) = self.states.remove(provisional) {
            self.states.insert(assigned.clone(), state);
        }
        if let Some(pass) = self.last_pass.remove(provisional) {
            self.last_pass.insert(assigned.clone(), pass);
        }
        for entries in self.inflight.values_mut() {
            if let Some(before) = entries.remove(provisional) {
                entries.insert(
                    assigned.clone(),
                    before.map(|t| t.with_id(assigned.clone())),
                );
            }
        }
        tracing::trace!(%provisional, %assigned, "task id assigned by store");
    }

    fn restore_baseline(&mut self, id: &TaskId, before: Option<Task>) {
        let position = self.baseline.iter().position(|t| t.id.as_ref() == Some(id));
        match (position, before) {
            (Some(i), Some(task)) => self.baseline[i] = task.with_id(id.clone()),
            (Some(i), None) => {
                self.baseline.remove(i);
            }
            (None, Some(task)) => self.baseline.push(task.with_id(id.clone())),
            (None, None) => {}
        }
    }
}
