use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Transaction conflict on {0}")]
    Conflict(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("You must sign in to enroll")]
    NotAuthenticated,

    #[error("Course not found: {0}")]
    CourseNotFound(String),

    #[error("Already enrolled in this course")]
    AlreadyEnrolled,

    #[error("No capacity available")]
    NoCapacity,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Rejections raised by the enrollment guard itself, as opposed to store failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::NotAuthenticated
                | AppError::CourseNotFound(_)
                | AppError::AlreadyEnrolled
                | AppError::NoCapacity
        )
    }
}
