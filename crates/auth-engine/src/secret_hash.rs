//! Secret hash computation for user pools configured with a client secret.

use crate::{AuthError, AuthResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the keyed signature the identity provider requires when the
/// app client has a secret: HMAC-SHA256 over `username + client_id`, keyed
/// by the client secret, standard-base64 encoded.
///
/// The signature binds the username, so it is recomputed per request and
/// never cached.
#[derive(Debug, Clone)]
pub struct SecretSigner {
    client_id: String,
    client_secret: Option<String>,
}

impl SecretSigner {
    /// Create a new signer for the given app client.
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Whether a client secret is configured.
    pub fn has_secret(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Compute the secret hash for a username.
    ///
    /// Returns `Ok(None)` when no client secret is configured; callers must
    /// then omit the field from the request entirely. An unusable secret is
    /// a configuration error, reported loudly and distinctly from the
    /// no-secret case.
    pub fn sign(&self, username: &str) -> AuthResult<Option<String>> {
        let Some(secret) = &self.client_secret else {
            return Ok(None);
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
            AuthError::Config(format!("client secret is unusable as an HMAC key: {e}"))
        })?;
        mac.update(username.as_bytes());
        mac.update(self.client_id.as_bytes());

        Ok(Some(BASE64.encode(mac.finalize().into_bytes())))
    }
}
