//! Error types for the proactor runtime
//!
//! Runtime conditions (bad inbound data, broker trouble, ack timeouts) are
//! recoverable and handled on the dispatch loop. [`UsageError`]s indicate a
//! construction bug and are returned to the caller immediately.

use crate::codec::{CodecError, EncodeError, RegistryError};
use crate::config::ConfigError;
use crate::proactor::{LinkError, SubmitError};
use thiserror::Error;

/// Misuse of the runtime API. Never absorbed silently.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Proactor already started; start() may only be called once")]
    AlreadyStarted,

    #[error("Cannot encode unregistered type alias: {0}")]
    UnregisteredType(String),

    #[error("Unknown link: {0}")]
    UnknownLink(String),

    #[error("Link already added: {0}")]
    DuplicateLink(String),

    #[error("Links cannot be added after start()")]
    LinksFrozen,

    #[error("Acknowledged publishes must be framed")]
    AckRequiresFrame,
}

/// Top-level error for proactor operations
#[derive(Debug, Error)]
pub enum ProactorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Submit error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Actor error: {message}")]
    Actor { message: String },
}

impl From<EncodeError> for ProactorError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Usage(usage) => ProactorError::Usage(usage),
            EncodeError::Codec(codec) => ProactorError::Codec(codec),
        }
    }
}

impl ProactorError {
    /// Create an actor error
    pub fn actor<S: Into<String>>(message: S) -> Self {
        Self::Actor {
            message: message.into(),
        }
    }

    /// Whether the error indicates a programming mistake rather than a
    /// runtime condition
    pub fn is_usage(&self) -> bool {
        matches!(self, ProactorError::Usage(_) | ProactorError::Registry(_))
    }
}

/// Result type for proactor operations
pub type ProactorResult<T> = Result<T, ProactorError>;
