//! Remote task collection abstraction.
//!
//! Defines the [`TaskStore`] trait that every persistence backend satisfies.
//! Concrete implementations:
//! - [`memory::MemoryStore`]: in-process store with injectable access rules,
//!   used by tests and the offline demo
//! - [`file::JsonFileStore`]: one JSON document array per collection on disk
//!
//! A store only knows documents. Diffing, optimistic state and failure
//! reporting all live above it.

pub mod file;
pub mod memory;

use planverse_proto::{CollectionPath, Task, TaskId, ValidationError, WriteKind};

pub use file::JsonFileStore;
pub use memory::{AccessPolicy, AccessRule, Fault, MemoryStore};

/// Errors that can occur while talking to a task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store's access rules refused the operation.
    #[error("missing or insufficient permissions: {kind} on {path} was denied")]
    PermissionDenied {
        /// Document or collection path the request targeted.
        path: String,
        /// Kind of write that was refused.
        kind: WriteKind,
    },

    /// The targeted document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The store could not be reached or did not complete the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Local file I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("document encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A document failed validation before it was written.
    #[error("invalid document: {0}")]
    Invalid(#[from] ValidationError),
}

impl StoreError {
    /// Returns `true` if the error is a policy rejection rather than a
    /// transient fault.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Async persistence boundary for one user's task documents.
///
/// Every method is independent: implementations must not assume any
/// ordering between calls, and a failure of one call must not affect others.
pub trait TaskStore: Send + Sync {
    /// Append a new document and return the identity the store assigned.
    ///
    /// Any id already present on `task` is ignored.
    fn create(
        &self,
        path: &CollectionPath,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<TaskId, StoreError>> + Send;

    /// Replace the fields of an existing document.
    fn update(
        &self,
        path: &CollectionPath,
        id: &TaskId,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Remove a document. Removing a missing document is not an error.
    fn delete(
        &self,
        path: &CollectionPath,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Read every document in the collection, sorted by due date.
    fn list(
        &self,
        path: &CollectionPath,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;
}

/// Mints a store-side document id.
pub(crate) fn new_document_id() -> TaskId {
    TaskId::new(uuid::Uuid::now_v7().simple().to_string())
}
