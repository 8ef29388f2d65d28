//! Remote collection addressing.
//!
//! Every user owns exactly one task collection at `users/{uid}/tasks`.
//! Documents inside it live at `users/{uid}/tasks/{id}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Errors produced when building a [`CollectionPath`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The user id was empty.
    #[error("user id cannot be empty")]
    EmptyUserId,
    /// The user id contained a path separator or was a dot segment.
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
}

/// Path of one user's task collection in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    uid: String,
}

impl CollectionPath {
    /// Builds the task collection path for the given user.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::EmptyUserId`] for an empty uid, or
    /// [`PathError::InvalidUserId`] if it contains `/` or is `.` or `..`.
    pub fn tasks_for(uid: &str) -> Result<Self, PathError> {
        if uid.is_empty() {
            return Err(PathError::EmptyUserId);
        }
        if uid.contains('/') || uid == "." || uid == ".." {
            return Err(PathError::InvalidUserId(uid.to_string()));
        }
        Ok(Self {
            uid: uid.to_string(),
        })
    }

    /// Returns the user id that owns this collection.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.uid
    }

    /// Returns the full path of one document in this collection.
    #[must_use]
    pub fn document(&self, id: &TaskId) -> String {
        format!("{self}/{id}")
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "users/{}/tasks", self.uid)
    }
}

/// Kind of write issued against the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    /// Append a new document; the store assigns its id.
    Create,
    /// Replace the fields of an existing document.
    Update,
    /// Remove an existing document.
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}
