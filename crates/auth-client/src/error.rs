use serde::{Deserialize, Serialize};
use session_store::StorageError;
use thiserror::Error;

/// Errors that can occur during authentication operations.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No session exists at the provider; a normal "not signed in" outcome
    #[error("Login required")]
    LoginRequired,

    /// Provider-side failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// An operation that needs a stored user was called without one
    #[error("No authenticated user")]
    MissingUser,

    /// Token exchange endpoint returned a non-success status
    #[error("Token exchange failed with status {status}: {message}")]
    TokenExchange { status: u16, message: String },

    /// The provider rejected the redirect callback
    #[error("Callback rejected: {0}")]
    CallbackRejected(String),

    /// Attempted an invalid status transition
    #[error("Invalid state transition from {from} on {input}")]
    InvalidStateTransition { from: String, input: String },

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// A login-required failure is a normal no-session outcome, not an error
    /// the user needs to see.
    pub fn is_login_required(&self) -> bool {
        matches!(self, AuthError::LoginRequired)
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Classification of errors surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorKind {
    /// Session restore failed during initialization
    InitError,
    /// Login or callback rejected by the provider
    AuthError,
    /// Silent renewal failed
    AuthRefreshError,
    /// Profile fetch failed
    LoadError,
    /// Session disappeared without an explicit logout
    UnexpectedAuthChange,
}

/// The single surfaced error record. At most one is current at a time;
/// setting a new one replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientErrorObject {
    pub kind: ClientErrorKind,
    pub message: String,
}

impl ClientErrorObject {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ClientErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
