//! Error types shared by every layer.

use std::fmt;
use thiserror::Error;

/// Errors reported by the storage collaborator.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// A row that must exist does not.
    #[error("Row not found: {0}")]
    NotFound(String),

    /// The transaction could not be serialized against a concurrent one.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// A constraint was violated.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// Why an admission check rejected a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDenied {
    /// The current half hour is marked closed.
    QueueClosed,
    /// The queue only admits rostered students.
    NotInRoster,
    /// A teammate already holds an active entry.
    TeammateInQueue,
    /// A teammate already holds an upcoming appointment.
    TeammateHasAppointment,
}

impl fmt::Display for AdmissionDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::QueueClosed => "the queue is closed right now",
            Self::NotInRoster => "you are not on the roster for this queue",
            Self::TeammateInQueue => "a teammate is already in the queue",
            Self::TeammateHasAppointment => "a teammate already has an upcoming appointment",
        };
        f.write_str(reason)
    }
}

/// Errors returned by queue and appointment operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Malformed input, missing fields or out-of-range indexes.
    #[error("{0}")]
    Validation(String),

    /// The request is well formed but collides with current state.
    #[error("{0}")]
    Conflict(String),

    /// An admission rule rejected the requester.
    #[error("{0}")]
    Denied(AdmissionDenied),

    /// The addressed resource does not exist.
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// Kind of resource.
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The caller may not perform this operation.
    #[error("{0}")]
    Forbidden(String),

    /// The operation needs a signed-in caller.
    #[error("sign in to do that")]
    Unauthorized,

    /// Storage failed underneath the operation.
    #[error(transparent)]
    Storage(StoreError),

    /// Invariant broken inside the service itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Shorthand for [`QueueError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`QueueError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Shorthand for [`QueueError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Shorthand for [`QueueError::NotFound`].
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            // A concurrent writer won; the caller can resubmit.
            StoreError::SerializationFailure(_) => {
                Self::Conflict("the request collided with a concurrent change, try again".into())
            }
            StoreError::Integrity(reason) => Self::Conflict(reason),
            other => Self::Storage(other),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("event payload serialization failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_failures_become_conflicts() {
        let err = QueueError::from(StoreError::SerializationFailure("40001".into()));
        assert!(matches!(err, QueueError::Conflict(_)));
    }

    #[test]
    fn database_errors_stay_storage_errors() {
        let err = QueueError::from(StoreError::Database("connection reset".into()));
        assert!(matches!(err, QueueError::Storage(StoreError::Database(_))));
    }

    #[test]
    fn not_found_message_names_resource() {
        let err = QueueError::not_found("entry", "abc");
        assert_eq!(err.to_string(), "entry with id abc not found");
    }
}
