//! Classification of pool and Diesel failures shared by the repositories.
//!
//! Each repository turns a [`Failure`] into its own port error, so the
//! Diesel-specific matching lives in one place.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Failure {
    Connection(String),
    Query(String),
    UniqueViolation { constraint: Option<String> },
    ForeignKeyViolation,
}

pub(super) fn pool_message(error: PoolError) -> String {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    }
}

pub(super) fn classify(error: DieselError) -> Failure {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => Failure::Query("record not found".to_owned()),
        DieselError::QueryBuilderError(_) => Failure::Query("database query error".to_owned()),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            Failure::Connection("database connection error".to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            Failure::UniqueViolation {
                constraint: info.constraint_name().map(str::to_owned),
            }
        }
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            Failure::ForeignKeyViolation
        }
        _ => Failure::Query("database error".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn not_found_is_a_query_failure() {
        assert_eq!(
            classify(DieselError::NotFound),
            Failure::Query("record not found".to_owned())
        );
    }

    #[rstest]
    fn pool_errors_keep_their_message() {
        assert_eq!(pool_message(PoolError::checkout("refused")), "refused");
    }
}
