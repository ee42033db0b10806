use thiserror::Error;
use uuid::Uuid;

/// Failures of the room, presence and message operations.
///
/// The connection manager maps each variant to a short user-facing string;
/// the wrapped details are only ever logged.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("room already exists")]
    AlreadyExists,

    #[error("not found")]
    NotFound,

    #[error("credential does not match")]
    Unauthorized,

    #[error("unknown identity")]
    UnknownIdentity,

    #[error("storage: {0}")]
    Persistence(String),

    #[error("invalid identifier: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ChatError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChatError::Persistence(format!("blocking task failed: {err}"))
    }
}

impl From<bcrypt::BcryptError> for ChatError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ChatError::Persistence(format!("bcrypt: {err}"))
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Parses a client-supplied id.
pub fn parse_id(raw: &str) -> ChatResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ChatError::Validation(raw.to_owned()))
}

/// Unique-constraint violations are how the storage layer reports a lost
/// insert race.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
