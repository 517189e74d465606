//! Identity provider wire protocol.
//!
//! The provider exposes a single JSON-over-POST endpoint; the operation is
//! selected by the `X-Amz-Target` header. Field names and nesting are part
//! of the compatibility surface and are reproduced exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content type for provider requests.
pub const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Header naming the target operation.
pub const TARGET_HEADER: &str = "X-Amz-Target";

pub const TARGET_SIGN_UP: &str = "AWSCognitoIdentityProviderService.SignUp";
pub const TARGET_CONFIRM_SIGN_UP: &str = "AWSCognitoIdentityProviderService.ConfirmSignUp";
pub const TARGET_INITIATE_AUTH: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
pub const TARGET_GLOBAL_SIGN_OUT: &str = "AWSCognitoIdentityProviderService.GlobalSignOut";

/// Password sign-in flow.
pub const AUTH_FLOW_USER_PASSWORD: &str = "USER_PASSWORD_AUTH";
/// Token refresh flow.
pub const AUTH_FLOW_REFRESH_TOKEN: &str = "REFRESH_TOKEN_AUTH";

/// A user attribute supplied at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeType {
    pub name: String,
    pub value: String,
}

/// Registration request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignUpRequest {
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub user_attributes: Vec<AttributeType>,
    /// Omitted (not null) when no client secret is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,
}

/// Registration response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignUpResponse {
    pub user_sub: String,
    #[serde(default)]
    pub code_delivery_details: Option<CodeDeliveryDetails>,
}

/// Where and how the confirmation code was delivered.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeDeliveryDetails {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub delivery_medium: Option<String>,
    #[serde(default)]
    pub attribute_name: Option<String>,
}

/// Confirmation code submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfirmSignUpRequest {
    pub client_id: String,
    pub username: String,
    pub confirmation_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,
}

/// Authentication request for both the password and refresh flows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateAuthRequest {
    pub client_id: String,
    pub auth_flow: String,
    /// Flow parameters (`USERNAME`, `PASSWORD`, `REFRESH_TOKEN`,
    /// `SECRET_HASH`); keys are serialized verbatim.
    pub auth_parameters: BTreeMap<String, String>,
}

/// Authentication response envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateAuthResponse {
    pub authentication_result: AuthenticationResult,
}

/// Issued tokens. The refresh flow returns only identity and access
/// tokens; the refresh token itself is not rotated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResult {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Remote sign-out request, authorized by the access token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalSignOutRequest {
    pub access_token: String,
}

/// Provider error body.
#[derive(Debug, Deserialize)]
pub struct ProviderErrorBody {
    #[serde(rename = "__type", default)]
    pub kind: Option<String>,
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
}
