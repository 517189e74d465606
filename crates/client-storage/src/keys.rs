//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Identity token
    pub const ID_TOKEN: &'static str = "id_token";

    /// Access token
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Chat session identifier
    pub const CHAT_SESSION_ID: &'static str = "chat_session_id";
}
