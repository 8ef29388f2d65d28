//! Task list editing and reconciliation planning.
//!
//! [`reconcile::plan`] diffs a persisted snapshot against a desired list.
//! [`list::TaskList`] is the optimistic, UI-facing model that feeds those
//! diffs to a [`crate::sync::Reconciler`] and tracks per-task confirmation.

pub mod list;
pub mod reconcile;

pub use list::{SyncState, TaskList};
pub use reconcile::{ReconcilePlan, WriteOp, plan};

use chrono::{DateTime, NaiveDate, Utc};
use planverse_proto::ValidationError;
use thiserror::Error;

/// Errors that can occur during task list edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The edit produced a task that fails validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// A due date could not be parsed.
    #[error("invalid due date '{0}': expected YYYY-MM-DD or RFC 3339")]
    InvalidDueDate(String),
}

/// Parses a user-supplied due date.
///
/// Accepts a full RFC 3339 timestamp, or a bare `YYYY-MM-DD` date which is
/// pinned to 12:00 UTC so it lands on the same calendar day in most zones.
///
/// # Errors
///
/// Returns [`TaskError::InvalidDueDate`] if neither format matches.
pub fn parse_due_date(input: &str) -> Result<DateTime<Utc>, TaskError> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TaskError::InvalidDueDate(input.to_string()))
}
