//! Backend API error types.

use thiserror::Error;

/// Error type for backend API operations.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend declared the request unauthorized; local session state
    /// has been torn down
    #[error("Authentication required")]
    AuthenticationRequired,

    /// A chat message is already in flight for this conversation
    #[error("A message is already being sent")]
    MessageInFlight,

    /// Backend rejected the request; carries the error envelope message
    /// when one was present
    #[error("Backend error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A value could not be used as an HTTP header
    #[error("Invalid header value: {0}")]
    Header(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] client_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
