//! Session lifecycle management with FSM-based state tracking.
//!
//! [`SessionManager`] owns the in-memory credential set and is the only
//! writer of the persisted one. It drives sign-up, confirmation, sign-in,
//! sign-out, restore, and refresh against the identity provider, tracking
//! transitions with an internal finite state machine.

use crate::claims::{decode_id_token, token_is_live, ClaimSet};
use crate::protocol::{
    AttributeType, CodeDeliveryDetails, ConfirmSignUpRequest, GlobalSignOutRequest,
    InitiateAuthRequest, InitiateAuthResponse, ProviderErrorBody, SignUpRequest, SignUpResponse,
    AMZ_JSON_CONTENT_TYPE, AUTH_FLOW_REFRESH_TOKEN, AUTH_FLOW_USER_PASSWORD, TARGET_CONFIRM_SIGN_UP,
    TARGET_GLOBAL_SIGN_OUT, TARGET_HEADER, TARGET_INITIATE_AUTH, TARGET_SIGN_UP,
};
use crate::secret_hash::SecretSigner;
use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionState};
use crate::{AuthError, AuthResult};
use chrono::Utc;
use client_storage::{CredentialSet, CredentialStore};
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Identity provider connection settings.
///
/// Supplied once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// User pool region.
    pub region: String,
    /// App client identifier.
    pub client_id: String,
    /// App client secret, when the pool is configured with one.
    pub client_secret: Option<String>,
    /// User pool identifier.
    pub user_pool_id: String,
    /// Endpoint override. When absent, the regional endpoint is used.
    pub endpoint: Option<String>,
}

impl ProviderConfig {
    /// The endpoint all provider operations are POSTed to.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://cognito-idp.{}.amazonaws.com/", self.region),
        }
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// Provider-assigned subject identifier for the new user.
    pub user_sub: String,
    /// Where the confirmation code was sent.
    pub code_delivery: Option<CodeDeliveryDetails>,
}

/// Session manager for authentication state.
///
/// The FSM tracks transient states (registering, authenticating,
/// refreshing, signing out) that are never persisted; the credential set
/// itself lives in memory and in the [`CredentialStore`]. Whether the user
/// counts as authenticated is always re-derived from the identity token's
/// expiry, never from a cached flag.
pub struct SessionManager {
    config: ProviderConfig,
    signer: SecretSigner,
    store: Arc<CredentialStore>,
    http_client: Client,
    /// Internal FSM for tracking session state transitions.
    fsm: Mutex<SessionMachine>,
    /// In-memory credential set; the single live instance.
    tokens: Mutex<Option<CredentialSet>>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(config: ProviderConfig, store: Arc<CredentialStore>) -> Self {
        let signer = SecretSigner::new(config.client_id.clone(), config.client_secret.clone());
        Self {
            config,
            signer,
            store,
            http_client: Client::new(),
            fsm: Mutex::new(SessionMachine::new()),
            tokens: Mutex::new(None),
        }
    }

    /// Get the current FSM state.
    pub fn state(&self) -> SessionState {
        let fsm = self.fsm.lock().unwrap();
        SessionState::from(fsm.state())
    }

    /// Transition the FSM, rejecting inputs that are illegal in the
    /// current state.
    fn transition(&self, input: &SessionMachineInput) -> AuthResult<SessionState> {
        let mut fsm = self.fsm.lock().unwrap();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "session state transition"
            );
        }

        Ok(new_state)
    }

    /// POST one provider operation to the shared endpoint.
    async fn provider_call<B: serde::Serialize>(
        &self,
        target: &str,
        body: &B,
    ) -> AuthResult<reqwest::Response> {
        let endpoint = self.config.endpoint_url();
        debug!(endpoint = %endpoint, operation = target, "calling identity provider");

        let response = self
            .http_client
            .post(&endpoint)
            .header("Content-Type", AMZ_JSON_CONTENT_TYPE)
            .header(TARGET_HEADER, target)
            .json(body)
            .send()
            .await?;

        Ok(response)
    }

    /// Turn a non-2xx provider response into an error carrying the
    /// provider's own message where one exists.
    async fn provider_error(response: reqwest::Response) -> AuthError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        warn!(status = %status, message = %message, "identity provider rejected request");
        AuthError::Provider(message)
    }

    /// Register a new user.
    ///
    /// On success the session is awaiting the emailed confirmation code; no
    /// token state is created.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: &[(String, String)],
    ) -> AuthResult<SignUpOutcome> {
        let secret_hash = self.signer.sign(email)?;
        self.transition(&SessionMachineInput::SignUpRequested)?;

        let request = SignUpRequest {
            client_id: self.config.client_id.clone(),
            username: email.to_string(),
            password: password.to_string(),
            user_attributes: attributes
                .iter()
                .map(|(name, value)| AttributeType {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            secret_hash,
        };

        let response = match self.provider_call(TARGET_SIGN_UP, &request).await {
            Ok(response) => response,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::SignUpRejected);
                return Err(e);
            }
        };

        if !response.status().is_success() {
            let err = Self::provider_error(response).await;
            let _ = self.transition(&SessionMachineInput::SignUpRejected);
            return Err(err);
        }

        let data: SignUpResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::SignUpRejected);
                return Err(AuthError::Http(e));
            }
        };

        self.transition(&SessionMachineInput::SignUpAccepted)?;
        info!(user_sub = %data.user_sub, "sign-up accepted, awaiting confirmation");

        Ok(SignUpOutcome {
            user_sub: data.user_sub,
            code_delivery: data.code_delivery_details,
        })
    }

    /// Submit the emailed confirmation code.
    pub async fn confirm_sign_up(&self, email: &str, code: &str) -> AuthResult<()> {
        let secret_hash = self.signer.sign(email)?;
        self.transition(&SessionMachineInput::ConfirmRequested)?;

        let request = ConfirmSignUpRequest {
            client_id: self.config.client_id.clone(),
            username: email.to_string(),
            confirmation_code: code.to_string(),
            secret_hash,
        };

        let response = match self.provider_call(TARGET_CONFIRM_SIGN_UP, &request).await {
            Ok(response) => response,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::ConfirmRejected);
                return Err(e);
            }
        };

        if !response.status().is_success() {
            let err = Self::provider_error(response).await;
            let _ = self.transition(&SessionMachineInput::ConfirmRejected);
            return Err(err);
        }

        self.transition(&SessionMachineInput::ConfirmAccepted)?;
        info!("sign-up confirmed, ready to sign in");
        Ok(())
    }

    /// Sign in with email and password.
    ///
    /// On success all three tokens are committed to memory and storage
    /// together; on any failure the credential set is left untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<()> {
        let mut params = BTreeMap::new();
        params.insert("USERNAME".to_string(), email.to_string());
        params.insert("PASSWORD".to_string(), password.to_string());
        if let Some(hash) = self.signer.sign(email)? {
            params.insert("SECRET_HASH".to_string(), hash);
        }

        self.transition(&SessionMachineInput::SignInRequested)?;

        let request = InitiateAuthRequest {
            client_id: self.config.client_id.clone(),
            auth_flow: AUTH_FLOW_USER_PASSWORD.to_string(),
            auth_parameters: params,
        };

        let response = match self.provider_call(TARGET_INITIATE_AUTH, &request).await {
            Ok(response) => response,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::SignInRejected);
                return Err(e);
            }
        };

        if !response.status().is_success() {
            let err = Self::provider_error(response).await;
            let _ = self.transition(&SessionMachineInput::SignInRejected);
            return Err(err);
        }

        let data: InitiateAuthResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::SignInRejected);
                return Err(AuthError::Http(e));
            }
        };

        let result = data.authentication_result;
        let (Some(id_token), Some(access_token), Some(refresh_token)) =
            (result.id_token, result.access_token, result.refresh_token)
        else {
            let _ = self.transition(&SessionMachineInput::SignInRejected);
            return Err(AuthError::Provider(
                "authentication result is missing tokens".to_string(),
            ));
        };

        // Decoding validates the identity token before anything is committed.
        let claims = match decode_id_token(&id_token) {
            Ok(claims) => claims,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::SignInRejected);
                return Err(AuthError::Token(e));
            }
        };

        let set = CredentialSet {
            id_token,
            access_token,
            refresh_token,
        };

        if let Err(e) = self.store.set_credential_set(&set) {
            let _ = self.transition(&SessionMachineInput::SignInRejected);
            return Err(AuthError::Storage(e));
        }
        *self.tokens.lock().unwrap() = Some(set);

        self.transition(&SessionMachineInput::SignInAccepted)?;
        info!(sub = claims.sub.as_deref().unwrap_or("unknown"), "signed in");

        Ok(())
    }

    /// Sign out.
    ///
    /// Remote invalidation is best-effort and non-propagating; local and
    /// persisted teardown always proceed, so this operation succeeds
    /// regardless of network conditions.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let _ = self.transition(&SessionMachineInput::SignOutRequested);

        let access_token = self
            .tokens
            .lock()
            .unwrap()
            .as_ref()
            .map(|set| set.access_token.clone());

        if let Some(access_token) = access_token {
            let request = GlobalSignOutRequest { access_token };
            match self.provider_call(TARGET_GLOBAL_SIGN_OUT, &request).await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "global sign-out rejected by provider");
                }
                Err(e) => {
                    warn!(error = %e, "global sign-out failed");
                }
                Ok(_) => {}
            }
        }

        *self.tokens.lock().unwrap() = None;
        self.store.clear_all()?;

        let _ = self.transition(&SessionMachineInput::SignOutComplete);
        info!("signed out");
        Ok(())
    }

    /// Restore a persisted session.
    ///
    /// Pure read-then-validate; never calls the network. Returns `false`
    /// when there is nothing to restore: an absent or partial credential
    /// set, or an identity token that is malformed or already expired
    /// (stale tokens are not resurrected).
    pub fn restore_session(&self) -> AuthResult<bool> {
        self.transition(&SessionMachineInput::RestoreRequested)?;

        let set = match self.store.get_credential_set() {
            Ok(Some(set)) => set,
            Ok(None) => {
                debug!("no stored credential set to restore");
                let _ = self.transition(&SessionMachineInput::RestoreMiss);
                return Ok(false);
            }
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::RestoreMiss);
                return Err(AuthError::Storage(e));
            }
        };

        let claims = match decode_id_token(&set.id_token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "stored identity token is malformed, clearing credentials");
                let _ = self.store.clear_credentials();
                let _ = self.transition(&SessionMachineInput::RestoreMiss);
                return Ok(false);
            }
        };

        let now = Utc::now().timestamp();
        if !token_is_live(&claims, now) {
            debug!(exp = claims.exp, now, "stored identity token has expired");
            let _ = self.transition(&SessionMachineInput::RestoreMiss);
            return Ok(false);
        }

        *self.tokens.lock().unwrap() = Some(set);
        self.transition(&SessionMachineInput::RestoreHit)?;
        info!(sub = claims.sub.as_deref().unwrap_or("unknown"), "session restored");

        Ok(true)
    }

    /// Refresh the identity and access tokens.
    ///
    /// Requires a live refresh token and, when a client secret is
    /// configured, an email identity in the current claim set to sign the
    /// request with; missing either is a caller-ordering bug reported as a
    /// precondition failure. On provider or transport failure the existing
    /// tokens are left in place.
    pub async fn refresh_tokens(&self) -> AuthResult<()> {
        let (refresh_token, id_token) = {
            let tokens = self.tokens.lock().unwrap();
            match tokens.as_ref() {
                Some(set) => (set.refresh_token.clone(), set.id_token.clone()),
                None => {
                    return Err(AuthError::Precondition(
                        "no refresh token available".to_string(),
                    ))
                }
            }
        };

        let mut params = BTreeMap::new();
        params.insert("REFRESH_TOKEN".to_string(), refresh_token.clone());
        if self.signer.has_secret() {
            let claims = decode_id_token(&id_token)?;
            let email = claims.email.as_deref().ok_or_else(|| {
                AuthError::Precondition(
                    "current claim set has no email to sign the refresh request with".to_string(),
                )
            })?;
            if let Some(hash) = self.signer.sign(email)? {
                params.insert("SECRET_HASH".to_string(), hash);
            }
        }

        self.transition(&SessionMachineInput::RefreshRequested)?;

        let request = InitiateAuthRequest {
            client_id: self.config.client_id.clone(),
            auth_flow: AUTH_FLOW_REFRESH_TOKEN.to_string(),
            auth_parameters: params,
        };

        let response = match self.provider_call(TARGET_INITIATE_AUTH, &request).await {
            Ok(response) => response,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::RefreshRejected);
                return Err(e);
            }
        };

        if !response.status().is_success() {
            let err = Self::provider_error(response).await;
            let _ = self.transition(&SessionMachineInput::RefreshRejected);
            return Err(err);
        }

        let data: InitiateAuthResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                let _ = self.transition(&SessionMachineInput::RefreshRejected);
                return Err(AuthError::Http(e));
            }
        };

        let result = data.authentication_result;
        let (Some(new_id_token), Some(new_access_token)) = (result.id_token, result.access_token)
        else {
            let _ = self.transition(&SessionMachineInput::RefreshRejected);
            return Err(AuthError::Provider(
                "refresh result is missing tokens".to_string(),
            ));
        };

        // This flow does not rotate the refresh token, so the current one
        // is carried forward unless the provider sends a replacement.
        let set = CredentialSet {
            id_token: new_id_token,
            access_token: new_access_token,
            refresh_token: result.refresh_token.unwrap_or(refresh_token),
        };

        if let Err(e) = self.store.set_credential_set(&set) {
            let _ = self.transition(&SessionMachineInput::RefreshRejected);
            return Err(AuthError::Storage(e));
        }
        *self.tokens.lock().unwrap() = Some(set);

        self.transition(&SessionMachineInput::RefreshAccepted)?;
        info!("tokens refreshed");
        Ok(())
    }

    /// Whether the session currently holds a live identity token.
    ///
    /// Decodes and compares expiry against the wall clock on every call;
    /// no cached answer outlives a single check.
    pub fn is_authenticated(&self) -> bool {
        let tokens = self.tokens.lock().unwrap();
        let Some(set) = tokens.as_ref() else {
            return false;
        };

        match decode_id_token(&set.id_token) {
            Ok(claims) => token_is_live(&claims, Utc::now().timestamp()),
            Err(_) => false,
        }
    }

    /// The current user's claim set, recomputed from the identity token.
    pub fn current_user(&self) -> Option<ClaimSet> {
        let tokens = self.tokens.lock().unwrap();
        decode_id_token(&tokens.as_ref()?.id_token).ok()
    }

    /// The current identity token.
    pub fn id_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .unwrap()
            .as_ref()
            .map(|set| set.id_token.clone())
    }
}
