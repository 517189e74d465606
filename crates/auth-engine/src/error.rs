//! Authentication error types.

use crate::claims::DecodeError;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Identity provider rejected the request; carries the provider's message
    #[error("Provider rejected the request: {0}")]
    Provider(String),

    /// Identity token could not be decoded (terminal for that token)
    #[error("Malformed identity token: {0}")]
    Token(#[from] DecodeError),

    /// Operation called out of order (e.g. refresh without a refresh token)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] client_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    /// Returns true if this error is transient and the whole operation can
    /// be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP errors with 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
