//! In-memory task store for tests and offline use.
//!
//! [`MemoryStore`] keeps every collection in a map behind a
//! [`tokio::sync::RwLock`]. An [`AccessPolicy`] can be swapped in at any time
//! to reject chosen writes the way a remote store's security rules would,
//! and per-kind latency makes concurrent operations interleave.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::RwLock;

use planverse_proto::task::sort_by_due_date;
use planverse_proto::{CollectionPath, Task, TaskId, WriteKind};

use super::{StoreError, TaskStore, new_document_id};

/// How a matching [`AccessRule`] makes a request fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reject as a security-rule violation.
    PermissionDenied,
    /// Fail as if the network dropped the request.
    Unavailable,
}

/// A single deny rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    /// Write kind the rule applies to.
    pub kind: WriteKind,
    /// Restrict the rule to one document; `None` matches every document.
    pub document: Option<TaskId>,
    /// Failure produced when the rule matches.
    pub fault: Fault,
}

impl AccessRule {
    /// Deny every write of `kind`.
    #[must_use]
    pub const fn deny(kind: WriteKind) -> Self {
        Self {
            kind,
            document: None,
            fault: Fault::PermissionDenied,
        }
    }

    /// Deny writes of `kind` against one document only.
    #[must_use]
    pub const fn deny_document(kind: WriteKind, id: TaskId) -> Self {
        Self {
            kind,
            document: Some(id),
            fault: Fault::PermissionDenied,
        }
    }

    /// Fail every write of `kind` as unavailable.
    #[must_use]
    pub const fn unavailable(kind: WriteKind) -> Self {
        Self {
            kind,
            document: None,
            fault: Fault::Unavailable,
        }
    }

    fn matches(&self, kind: WriteKind, id: Option<&TaskId>) -> bool {
        self.kind == kind
            && match &self.document {
                None => true,
                Some(doc) => id == Some(doc),
            }
    }
}

/// Ordered set of deny rules. An empty policy allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    /// A policy that allows every request.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule to the policy.
    #[must_use]
    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns the error for the first matching rule, if any.
    fn check(&self, kind: WriteKind, id: Option<&TaskId>, path: &str) -> Result<(), StoreError> {
        match self.rules.iter().find(|r| r.matches(kind, id)) {
            None => Ok(()),
            Some(rule) => match rule.fault {
                Fault::PermissionDenied => Err(StoreError::PermissionDenied {
                    path: path.to_string(),
                    kind,
                }),
                Fault::Unavailable => Err(StoreError::Unavailable(format!(
                    "{kind} on {path} did not complete"
                ))),
            },
        }
    }
}

/// In-memory task store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Collection path -> (document id -> task).
    collections: RwLock<HashMap<String, BTreeMap<TaskId, Task>>>,
    policy: parking_lot::Mutex<AccessPolicy>,
    latency: HashMap<WriteKind, Duration>,
}

impl MemoryStore {
    /// Creates an empty store that allows every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial access policy.
    #[must_use]
    pub fn with_policy(self, policy: AccessPolicy) -> Self {
        *self.policy.lock() = policy;
        self
    }

    /// Delays every write of `kind` by `delay` before it is applied.
    #[must_use]
    pub fn with_latency(mut self, kind: WriteKind, delay: Duration) -> Self {
        self.latency.insert(kind, delay);
        self
    }

    /// Replaces the access policy for all subsequent requests.
    pub fn set_policy(&self, policy: AccessPolicy) {
        *self.policy.lock() = policy;
    }

    /// Inserts documents directly, bypassing the access policy.
    ///
    /// Tasks without an id get a fresh one. Returns the ids in input order.
    pub async fn seed(
        &self,
        path: &CollectionPath,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Vec<TaskId> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(path.to_string()).or_default();
        tasks
            .into_iter()
            .map(|task| {
                let id = task.persisted_id().cloned().unwrap_or_else(new_document_id);
                docs.insert(id.clone(), task.with_id(id.clone()));
                id
            })
            .collect()
    }

    /// Reads one document, bypassing the access policy.
    pub async fn get(&self, path: &CollectionPath, id: &TaskId) -> Option<Task> {
        let collections = self.collections.read().await;
        collections.get(&path.to_string())?.get(id).cloned()
    }

    /// Returns the number of documents in a collection.
    pub async fn len(&self, path: &CollectionPath) -> usize {
        let collections = self.collections.read().await;
        collections.get(&path.to_string()).map_or(0, BTreeMap::len)
    }

    async fn admit(&self, kind: WriteKind, id: Option<&TaskId>, target: &str) -> Result<(), StoreError> {
        if let Some(delay) = self.latency.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        self.policy.lock().check(kind, id, target)
    }
}

impl TaskStore for MemoryStore {
    async fn create(&self, path: &CollectionPath, task: &Task) -> Result<TaskId, StoreError> {
        let collection = path.to_string();
        self.admit(WriteKind::Create, None, &collection).await?;
        task.validate()?;

        let id = new_document_id();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection)
            .or_default()
            .insert(id.clone(), task.clone().with_id(id.clone()));
        drop(collections);
        tracing::trace!(%path, %id, "memory store created document");
        Ok(id)
    }

    async fn update(&self, path: &CollectionPath, id: &TaskId, task: &Task) -> Result<(), StoreError> {
        let document = path.document(id);
        self.admit(WriteKind::Update, Some(id), &document).await?;
        task.validate()?;

        let mut collections = self.collections.write().await;
        let slot = collections
            .get_mut(&path.to_string())
            .and_then(|docs| docs.get_mut(id))
            .ok_or(StoreError::NotFound(document))?;
        *slot = task.clone().with_id(id.clone());
        Ok(())
    }

    async fn delete(&self, path: &CollectionPath, id: &TaskId) -> Result<(), StoreError> {
        let document = path.document(id);
        self.admit(WriteKind::Delete, Some(id), &document).await?;

        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(&path.to_string()) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<Task>, StoreError> {
        let collections = self.collections.read().await;
        let mut tasks: Vec<Task> = collections
            .get(&path.to_string())
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        drop(collections);
        sort_by_due_date(&mut tasks);
        Ok(tasks)
    }
}
