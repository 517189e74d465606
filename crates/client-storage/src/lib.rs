//! Durable key/value storage for the Kaiwa client.
//!
//! This crate provides:
//! - A [`KeyValueStorage`] trait for pluggable storage backends
//! - [`FileStorage`], a JSON-file-backed store that survives restarts
//! - [`CredentialStore`], a high-level API over the session token triple
//!   and the chat session identifier

mod credentials;
mod file;
mod keys;
mod traits;

pub use credentials::{CredentialSet, CredentialStore};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use traits::KeyValueStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
