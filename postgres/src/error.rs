//! Mapping from `sqlx` failures to [`StoreError`].

use office_hours_core::StoreError;

/// SQLSTATE raised when a serializable transaction loses a conflict.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE raised when the deadlock detector picks this transaction.
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE of a unique index violation.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE of a check constraint violation.
const CHECK_VIOLATION: &str = "23514";
/// SQLSTATE of a foreign key violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Classify a database error.
///
/// Serialization failures and deadlocks become
/// [`StoreError::SerializationFailure`] so the caller can answer with a
/// retryable conflict. Constraint violations become
/// [`StoreError::Integrity`].
pub(crate) fn map_sqlx(error: sqlx::Error) -> StoreError {
    let code = match &error {
        sqlx::Error::RowNotFound => return StoreError::NotFound(error.to_string()),
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    };

    match code.as_deref() {
        Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
            metrics::counter!("office_hours.store.serialization_failures").increment(1);
            tracing::debug!(error = %error, "Transaction lost a serialization conflict");
            StoreError::SerializationFailure(error.to_string())
        }
        Some(UNIQUE_VIOLATION | CHECK_VIOLATION | FOREIGN_KEY_VIOLATION) => {
            StoreError::Integrity(error.to_string())
        }
        _ => StoreError::Database(error.to_string()),
    }
}

/// A stored value that does not fit its domain type.
pub(crate) fn corrupt(column: &str, error: impl std::fmt::Display) -> StoreError {
    StoreError::Integrity(format!("invalid value in column {column}: {error}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx(sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn test_pool_errors_are_database_errors() {
        assert!(matches!(
            map_sqlx(sqlx::Error::PoolTimedOut),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn test_corrupt_names_the_column() {
        let error = corrupt("priority", "priority must be 0 or 1, got 7");
        assert!(error.to_string().contains("priority"));
        assert!(matches!(error, StoreError::Integrity(_)));
    }
}
