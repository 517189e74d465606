//! High-level API for the persisted session state.

use crate::{KeyValueStorage, StorageKeys, StorageResult};

/// The three session tokens issued by the identity provider.
///
/// A credential set is only ever persisted or read back as a whole; a
/// partial triple on disk is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    /// Identity token, used for backend authorization.
    pub id_token: String,
    /// Access token, scoped to the identity provider's own APIs.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
}

/// High-level API for storing and retrieving session state
pub struct CredentialStore {
    storage: Box<dyn KeyValueStorage>,
}

impl CredentialStore {
    /// Create a new credential store with the given storage backend
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Credential Set
    // ==========================================

    /// Persist all three tokens.
    pub fn set_credential_set(&self, set: &CredentialSet) -> StorageResult<()> {
        self.storage.set(StorageKeys::ID_TOKEN, &set.id_token)?;
        self.storage
            .set(StorageKeys::ACCESS_TOKEN, &set.access_token)?;
        self.storage
            .set(StorageKeys::REFRESH_TOKEN, &set.refresh_token)?;
        Ok(())
    }

    /// Read back the credential set. Returns `None` unless all three
    /// tokens are present.
    pub fn get_credential_set(&self) -> StorageResult<Option<CredentialSet>> {
        let id_token = self.storage.get(StorageKeys::ID_TOKEN)?;
        let access_token = self.storage.get(StorageKeys::ACCESS_TOKEN)?;
        let refresh_token = self.storage.get(StorageKeys::REFRESH_TOKEN)?;

        match (id_token, access_token, refresh_token) {
            (Some(id_token), Some(access_token), Some(refresh_token)) => Ok(Some(CredentialSet {
                id_token,
                access_token,
                refresh_token,
            })),
            _ => Ok(None),
        }
    }

    /// Check whether a full credential set is present.
    pub fn has_credential_set(&self) -> StorageResult<bool> {
        Ok(self.get_credential_set()?.is_some())
    }

    /// Retrieve the identity token on its own.
    ///
    /// Used by the API gateway client, which attaches it as the bearer
    /// credential on every backend call.
    pub fn get_id_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ID_TOKEN)
    }

    /// Delete all three tokens.
    pub fn clear_credentials(&self) -> StorageResult<()> {
        let _ = self.storage.delete(StorageKeys::ID_TOKEN);
        let _ = self.storage.delete(StorageKeys::ACCESS_TOKEN);
        let _ = self.storage.delete(StorageKeys::REFRESH_TOKEN);
        Ok(())
    }

    // ==========================================
    // Chat session identifier
    // ==========================================

    /// Retrieve the current chat session identifier, if any.
    pub fn get_chat_session_id(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::CHAT_SESSION_ID)
    }

    /// Store the chat session identifier.
    pub fn set_chat_session_id(&self, session_id: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::CHAT_SESSION_ID, session_id)
    }

    /// Get the chat session identifier, generating and persisting one if
    /// none exists yet.
    pub fn ensure_chat_session_id(&self) -> StorageResult<String> {
        if let Some(session_id) = self.get_chat_session_id()? {
            return Ok(session_id);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        self.set_chat_session_id(&session_id)?;
        tracing::debug!(session_id = %session_id, "started new chat session");
        Ok(session_id)
    }

    /// Discard the current chat session identifier and mint a fresh one.
    pub fn rotate_chat_session_id(&self) -> StorageResult<String> {
        let _ = self.storage.delete(StorageKeys::CHAT_SESSION_ID);
        self.ensure_chat_session_id()
    }

    // ==========================================
    // Clear All
    // ==========================================

    /// Clear all persisted session state (tokens and chat session).
    pub fn clear_all(&self) -> StorageResult<()> {
        self.clear_credentials()?;
        let _ = self.storage.delete(StorageKeys::CHAT_SESSION_ID);
        Ok(())
    }
}
