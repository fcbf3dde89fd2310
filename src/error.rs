use thiserror::Error;

/// Errors surfaced by the attendance store and report engine.
///
/// Validation and not-found errors reach the caller unmodified; persistence
/// failures roll back the enclosing transaction and are never retried here.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("student not found: {0}")]
    StudentNotFound(String),
    #[error("storage constraint violated: {0}")]
    Constraint(String),
    #[error("storage failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;
