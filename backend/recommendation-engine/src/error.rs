use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Which identifier space an invalid id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    User,
    Item,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::User => f.write_str("user"),
            IdentifierKind::Item => f.write_str("item"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Invalid {kind} identifier: {id}")]
    InvalidIdentifier { kind: IdentifierKind, id: String },

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Training cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Interaction store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Training task failed: {0}")]
    TrainingTask(String),
}

impl RecommendError {
    pub fn invalid_user(id: impl ToString) -> Self {
        RecommendError::InvalidIdentifier {
            kind: IdentifierKind::User,
            id: id.to_string(),
        }
    }

    pub fn invalid_item(id: impl ToString) -> Self {
        RecommendError::InvalidIdentifier {
            kind: IdentifierKind::Item,
            id: id.to_string(),
        }
    }
}

impl From<config::ConfigError> for RecommendError {
    fn from(err: config::ConfigError) -> Self {
        RecommendError::Configuration(err.to_string())
    }
}

impl From<tokio::task::JoinError> for RecommendError {
    fn from(err: tokio::task::JoinError) -> Self {
        RecommendError::TrainingTask(err.to_string())
    }
}
