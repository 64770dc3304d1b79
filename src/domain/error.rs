use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Parent task not found: {0}")]
    ParentNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingError(msg.into())
    }

    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound(id.into())
    }

    pub fn parent_not_found(id: impl Into<String>) -> Self {
        Self::ParentNotFound(id.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn deadline(msg: impl Into<String>) -> Self {
        Self::DeadlineExceeded(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::ParseError(_))
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::StorageError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound(_) | Self::ParentNotFound(_))
    }

    /// Errors the indexing pipeline recovers from locally (skip the file,
    /// keep going). Everything else is surfaced with a structured reason.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ParseError(_) | Self::UnsupportedLanguage(_) | Self::IoError(_)
        )
    }
}
