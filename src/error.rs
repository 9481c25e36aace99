use diesel::r2d2::PoolError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the stores. The database cause is kept intact so the
/// caller can map it to a transport status or log it; nothing is retried or
/// recovered here.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A keyed lookup matched zero rows.
    #[error("record not found")]
    NotFound,

    /// A required argument was missing or not yet persisted (zero id).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A unique, foreign-key, not-null or check constraint was violated.
    #[error("constraint violation")]
    Constraint(#[source] DieselError),

    /// No connection could be checked out of the pool.
    #[error("database pool error")]
    Pool(#[from] PoolError),

    #[error("configuration error: {0}")]
    Config(String),

    /// Any other database error, including transport failures mid-statement.
    #[error(transparent)]
    Database(DieselError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::Constraint(_))
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> StoreError {
        match err {
            DieselError::NotFound => StoreError::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation => {
                    StoreError::Constraint(DieselError::DatabaseError(kind, info))
                }
                _ => StoreError::Database(DieselError::DatabaseError(kind, info)),
            },
            other => StoreError::Database(other),
        }
    }
}
