//! Task records and the helpers that build and edit them.
//!
//! A [`Task`] is stored as one JSON document per record. Field names follow
//! the document layout (`dueDate`, not `due_date`), and an empty or missing
//! `id` means the record has not been persisted yet.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Errors produced when a task fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long ({len} characters, max {max})")]
    TitleTooLong {
        /// Length of the rejected title in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },
    /// Priority string did not name a known priority.
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
}

/// Opaque identifier of a persisted task document.
///
/// Ids are assigned by the store and are unique within one user's
/// collection. A client may mint a [`provisional`](Self::provisional) id for
/// a record it has not persisted yet; the store replaces it on create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a client-side, time-ordered identifier (UUID v7).
    #[must_use]
    pub fn provisional() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is the empty string.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default when nothing else is stated.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ValidationError::UnknownPriority(s.to_string())),
        }
    }
}

/// One actionable item in a user's task collection.
///
/// Equality is deep and structural over every attribute, including `id`.
/// The reconciler relies on this to decide whether a record needs an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identity; `None` until persisted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_id"
    )]
    pub id: Option<TaskId>,
    /// Short, required title.
    pub title: String,
    /// Optional longer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the task is due. Determines the default display order.
    pub due_date: DateTime<Utc>,
    /// Task priority.
    #[serde(default)]
    pub priority: Priority,
    /// Whether the task has been done.
    #[serde(default)]
    pub completed: bool,
}

/// An empty `id` string in a document is the same as no id at all.
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<TaskId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(TaskId))
}

impl Task {
    /// Creates an unpersisted, open task with the default priority.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the title is empty or too long.
    pub fn new(title: impl Into<String>, due_date: DateTime<Utc>) -> Result<Self, ValidationError> {
        let title = title.into();
        validate_title(&title)?;
        Ok(Self {
            id: None,
            title,
            description: None,
            due_date,
            priority: Priority::default(),
            completed: false,
        })
    }

    /// Returns the task with its id replaced.
    #[must_use]
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns the id if one is set and non-empty.
    #[must_use]
    pub fn persisted_id(&self) -> Option<&TaskId> {
        self.id.as_ref().filter(|id| !id.is_empty())
    }

    /// Checks the invariants a stored task must satisfy.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the title is empty or too long.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }

    /// Applies a partial edit in place, returning whether anything changed.
    ///
    /// The edit is validated before any field is touched, so a rejected
    /// edit leaves the task as it was.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the edit carries an invalid title.
    pub fn apply_edit(&mut self, edit: &TaskEdit) -> Result<bool, ValidationError> {
        if let Some(title) = &edit.title {
            validate_title(title)?;
        }
        let before = self.clone();
        if let Some(title) = &edit.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &edit.description {
            self.description.clone_from(description);
        }
        if let Some(due_date) = edit.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = edit.priority {
            self.priority = priority;
        }
        if let Some(completed) = edit.completed {
            self.completed = completed;
        }
        Ok(*self != before)
    }
}

/// The fields a user supplies when adding a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Task title.
    pub title: String,
    /// Optional longer text.
    #[serde(default)]
    pub description: Option<String>,
    /// When the task is due.
    pub due_date: DateTime<Utc>,
    /// Priority; `Medium` when not stated.
    #[serde(default)]
    pub priority: Priority,
}

impl TaskDraft {
    /// Creates a draft with no description and the default priority.
    pub fn new(title: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date,
            priority: Priority::default(),
        }
    }

    /// Turns the draft into an unpersisted, open task.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the title is empty or too long.
    pub fn into_task(self) -> Result<Task, ValidationError> {
        validate_title(&self.title)?;
        Ok(Task {
            id: None,
            title: self.title,
            description: self.description.filter(|d| !d.is_empty()),
            due_date: self.due_date,
            priority: self.priority,
            completed: false,
        })
    }
}

/// A partial update to a task. `None` leaves the field untouched.
///
/// `description` is doubly optional: `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    /// New title.
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear it.
    pub description: Option<Option<String>>,
    /// New due date.
    pub due_date: Option<DateTime<Utc>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New completion flag.
    pub completed: Option<bool>,
}

impl TaskEdit {
    /// Returns `true` if the edit would not touch any field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.completed.is_none()
    }
}

/// Validates a task title against the length rules.
///
/// Length is counted in characters, not bytes.
///
/// # Errors
///
/// Returns [`ValidationError::TitleEmpty`] or [`ValidationError::TitleTooLong`].
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    let len = title.chars().count();
    if len > MAX_TASK_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong {
            len,
            max: MAX_TASK_TITLE_LENGTH,
        });
    }
    Ok(())
}

/// Sorts tasks by ascending due date. Ties keep their relative order.
pub fn sort_by_due_date(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| t.due_date);
}
