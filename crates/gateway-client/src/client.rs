//! The backend API client.

use crate::{ApiError, ApiResult};
use client_storage::CredentialStore;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Callback invoked when the backend declares a request unauthorized.
///
/// Owned by the UI layer; typically navigates to the sign-in surface.
/// Storage has already been cleared by the time it fires.
pub type UnauthorizedHook = Box<dyn Fn() + Send + Sync>;

/// Backend error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Reply to a chat message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// Assistant response text.
    pub response: String,
    /// Session the turn was recorded under.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Authenticated JSON REST client for the Kaiwa backend.
///
/// Reads the identity token from the credential store on every call; holds
/// no token state of its own.
pub struct ApiClient {
    http_client: Client,
    base_url: String,
    store: Arc<CredentialStore>,
    unauthorized_hook: Mutex<Option<UnauthorizedHook>>,
    /// At most one chat message in flight per client. A second send is
    /// rejected immediately rather than queued, so rapid repeated input
    /// cannot produce duplicate submissions.
    message_in_flight: AtomicBool,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Arguments
    /// * `base_url` - The backend base URL (e.g. `https://api.kaiwa.chat/prod`)
    /// * `store` - Credential store the identity token is read from
    pub fn new(base_url: impl Into<String>, store: Arc<CredentialStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http_client: Client::new(),
            base_url,
            store,
            unauthorized_hook: Mutex::new(None),
            message_in_flight: AtomicBool::new(false),
        }
    }

    /// Install the unauthorized hook.
    pub fn set_unauthorized_hook(&self, hook: UnauthorizedHook) {
        let mut slot = self.unauthorized_hook.lock().unwrap();
        *slot = Some(hook);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Perform an authorized request.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ApiResult<Value> {
        self.request_with_headers(method, path, body, HeaderMap::new())
            .await
    }

    /// Perform an authorized request with caller-supplied headers.
    ///
    /// The mandatory `Authorization` and `Content-Type` headers are applied
    /// after the caller's and always win.
    pub async fn request_with_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        extra_headers: HeaderMap,
    ) -> ApiResult<Value> {
        let id_token = self
            .store
            .get_id_token()?
            .ok_or(ApiError::AuthenticationRequired)?;
        let headers = build_headers(&id_token, extra_headers)?;

        let url = self.url(path);
        debug!(method = %method, url = %url, "calling backend");

        let mut request = self.http_client.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %url, "backend declared request unauthorized, clearing session state");
            self.store.clear_all()?;
            self.fire_unauthorized_hook();
            return Err(ApiError::AuthenticationRequired);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            warn!(status = %status, message = %message, "backend request failed");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn fire_unauthorized_hook(&self) {
        let hook = self.unauthorized_hook.lock().unwrap();
        if let Some(hook) = hook.as_ref() {
            hook();
        }
    }

    /// GET a backend resource.
    pub async fn get(&self, path: &str) -> ApiResult<Value> {
        self.request(Method::GET, path, None).await
    }

    /// POST a JSON body to the backend.
    pub async fn post(&self, path: &str, body: &Value) -> ApiResult<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// DELETE a backend resource.
    pub async fn delete(&self, path: &str) -> ApiResult<Value> {
        self.request(Method::DELETE, path, None).await
    }

    // ==========================================
    // Chat
    // ==========================================

    /// Send a chat message under the current session identifier.
    ///
    /// Rejected immediately with [`ApiError::MessageInFlight`] if another
    /// send is outstanding.
    pub async fn send_message(&self, text: &str) -> ApiResult<ChatReply> {
        if self
            .message_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("rejecting chat send: another message is in flight");
            return Err(ApiError::MessageInFlight);
        }

        let result = self.send_message_inner(text).await;
        self.message_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn send_message_inner(&self, text: &str) -> ApiResult<ChatReply> {
        let session_id = self.store.ensure_chat_session_id()?;
        let body = serde_json::json!({
            "message": text,
            "sessionId": session_id,
        });

        let value = self.post("/chat", &body).await?;
        let reply: ChatReply = serde_json::from_value(value)?;

        // The backend normally echoes the identifier; adopt a replacement
        // if it ever assigns one.
        if let Some(returned) = &reply.session_id {
            if *returned != session_id {
                self.store.set_chat_session_id(returned)?;
            }
        }

        Ok(reply)
    }

    /// Start a fresh chat session; subsequent sends use the new identifier.
    pub fn new_session(&self) -> ApiResult<String> {
        let session_id = self.store.rotate_chat_session_id()?;
        info!(session_id = %session_id, "rotated chat session");
        Ok(session_id)
    }

    // ==========================================
    // History and profile
    // ==========================================

    /// Fetch the user's chat history.
    pub async fn history(&self) -> ApiResult<Value> {
        self.get("/history").await
    }

    /// Delete one chat session from the history.
    pub async fn delete_session(&self, session_id: &str) -> ApiResult<Value> {
        self.delete(&format!("/history?sessionId={session_id}")).await
    }

    /// Fetch the user's profile.
    pub async fn get_profile(&self) -> ApiResult<Value> {
        self.get("/profile").await
    }

    /// Save the user's profile.
    pub async fn save_profile(&self, profile: &Value) -> ApiResult<Value> {
        self.post("/profile", profile).await
    }
}

/// Merge caller headers with the two mandatory ones. The mandatory headers
/// are inserted last so a conflicting caller header never silently wins.
fn build_headers(id_token: &str, extra: HeaderMap) -> ApiResult<HeaderMap> {
    let mut headers = extra;

    let bearer = HeaderValue::from_str(&format!("Bearer {id_token}"))
        .map_err(|e| ApiError::Header(e.to_string()))?;
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_storage::{CredentialSet, KeyValueStorage, StorageResult};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// In-memory storage for testing.
    struct MemoryStorage {
        data: Mutex<HashMap<String, String>>,
    }

    impl MemoryStorage {
        fn new() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
            }
        }
    }

    impl KeyValueStorage for MemoryStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn delete(&self, key: &str) -> StorageResult<bool> {
            Ok(self.data.lock().unwrap().remove(key).is_some())
        }
    }

    fn seeded_store() -> Arc<CredentialStore> {
        let store = CredentialStore::new(Box::new(MemoryStorage::new()));
        store
            .set_credential_set(&CredentialSet {
                id_token: "id-token".to_string(),
                access_token: "access-token".to_string(),
                refresh_token: "refresh-token".to_string(),
            })
            .unwrap();
        Arc::new(store)
    }

    /// Serve the given responses in order on a fresh port, one connection
    /// each, and return the base URL.
    async fn spawn_backend_stub(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut head = Vec::new();
                let mut byte = [0u8; 1];
                while !head.ends_with(b"\r\n\r\n") {
                    if socket.read_exact(&mut byte).await.is_err() {
                        return;
                    }
                    head.push(byte[0]);
                }
                let head_text = String::from_utf8_lossy(&head).to_string();
                let content_length = head_text
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if content_length > 0 {
                    let mut request_body = vec![0u8; content_length];
                    let _ = socket.read_exact(&mut request_body).await;
                }

                let reason = if status < 400 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_mandatory_headers_override_caller_headers() {
        let mut extra = HeaderMap::new();
        extra.insert(AUTHORIZATION, HeaderValue::from_static("Bearer forged"));
        extra.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        extra.insert("x-custom", HeaderValue::from_static("kept"));

        let headers = build_headers("real-token", extra).unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer real-token");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        // Non-conflicting caller headers pass through.
        assert_eq!(headers.get("x-custom").unwrap(), "kept");
        // No duplicate values survive the merge.
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("https://api.example.com/prod/", seeded_store());
        assert_eq!(client.url("/chat"), "https://api.example.com/prod/chat");
    }

    #[tokio::test]
    async fn test_401_clears_storage_and_fires_hook_once() {
        let base_url =
            spawn_backend_stub(vec![(401, r#"{"error": "Unauthorized"}"#.to_string())]).await;
        let store = seeded_store();
        let client = ApiClient::new(base_url, store.clone());

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        client.set_unauthorized_hook(Box::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let err = client.get("/history").await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRequired));

        // Persisted credential and session state is gone, and the hook
        // fired exactly once.
        assert!(store.get_credential_set().unwrap().is_none());
        assert!(store.get_chat_session_id().unwrap().is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_envelope_message_is_surfaced() {
        let base_url = spawn_backend_stub(vec![(
            500,
            r#"{"error": "AI response generation failed"}"#.to_string(),
        )])
        .await;
        let client = ApiClient::new(base_url, seeded_store());

        let err = client.get("/history").await.unwrap_err();
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "AI response generation failed");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_error_body_falls_back_to_status() {
        let base_url = spawn_backend_stub(vec![(502, "Bad Gateway".to_string())]).await;
        let client = ApiClient::new(base_url, seeded_store());

        let err = client.get("/history").await.unwrap_err();
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "HTTP 502");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_id_token_requires_authentication() {
        let store = Arc::new(CredentialStore::new(Box::new(MemoryStorage::new())));
        let client = ApiClient::new("http://127.0.0.1:9", store);

        // Fails before any network is touched.
        let err = client.get("/history").await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_send_message_attaches_and_keeps_session_id() {
        let body = serde_json::json!({
            "response": "こんにちは！",
            "sessionId": "session-abc",
            "timestamp": "2024-01-01T00:00:00Z"
        })
        .to_string();
        let base_url = spawn_backend_stub(vec![(200, body)]).await;
        let store = seeded_store();
        store.set_chat_session_id("session-abc").unwrap();
        let client = ApiClient::new(base_url, store.clone());

        let reply = client.send_message("こんにちは").await.unwrap();
        assert_eq!(reply.response, "こんにちは！");
        assert_eq!(reply.session_id.as_deref(), Some("session-abc"));
        assert_eq!(
            store.get_chat_session_id().unwrap().as_deref(),
            Some("session-abc")
        );
    }

    #[tokio::test]
    async fn test_send_message_rejected_while_in_flight() {
        let store = seeded_store();
        let client = ApiClient::new("http://127.0.0.1:9", store);

        // Simulate an outstanding send.
        client.message_in_flight.store(true, Ordering::SeqCst);

        let err = client.send_message("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::MessageInFlight));

        // The rejected attempt must not clear the flag the outstanding
        // send still owns.
        assert!(client.message_in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_message_releases_flag_after_failure() {
        let base_url = spawn_backend_stub(vec![(500, r#"{"error": "boom"}"#.to_string())]).await;
        let store = seeded_store();
        let client = ApiClient::new(base_url, store);

        let err = client.send_message("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::Api { .. }));
        assert!(!client.message_in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_new_session_rotates_identifier() {
        let store = seeded_store();
        store.set_chat_session_id("old-session").unwrap();
        let client = ApiClient::new("http://127.0.0.1:9", store.clone());

        let new_id = client.new_session().unwrap();
        assert_ne!(new_id, "old-session");
        assert_eq!(store.get_chat_session_id().unwrap(), Some(new_id));
    }
}
