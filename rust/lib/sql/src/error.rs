use thiserror::Error;

#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// A UNIQUE / CHECK / FOREIGN KEY constraint rejected the write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The database was busy or locked. Transient and retryable.
    #[error("database busy: {0}")]
    Busy(String),
}

impl SQLError {
    pub fn is_constraint(&self) -> bool {
        matches!(self, SQLError::Constraint(_))
    }
}
