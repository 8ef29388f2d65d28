//! Shared data model for `PlanVerse` task sync.
//!
//! Holds the [`task::Task`] record and its helpers, plus the
//! [`path::CollectionPath`] that scopes a user's task documents in the
//! remote store. Nothing here performs I/O.

pub mod path;
pub mod task;

pub use path::{CollectionPath, PathError, WriteKind};
pub use task::{Priority, Task, TaskDraft, TaskEdit, TaskId, ValidationError};
