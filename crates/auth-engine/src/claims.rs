//! Identity token decoding.
//!
//! Tokens are compact, dot-delimited, base64url-encoded credentials. The
//! client decodes the payload segment into a claim set without verifying
//! the signature; cryptographic validity is the provider's job, and the
//! client only trusts transport TLS plus the expiry claim.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

/// Error decoding an identity token.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Token does not have the header.payload.signature shape
    #[error("token does not have three segments")]
    Structure,

    /// Payload segment is not valid base64
    #[error("payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Payload bytes are not valid UTF-8
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Payload is not valid JSON
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// Payload object is missing the numeric `exp` claim
    #[error("payload is missing the exp claim")]
    MissingExp,
}

/// Decoded claim set of an identity token.
///
/// Derived and read-only: always recomputed from the token, never stored,
/// so it cannot go stale against the credential it came from.
#[derive(Debug, Clone)]
pub struct ClaimSet {
    /// Subject identifier.
    pub sub: Option<String>,
    /// Email address, when the pool includes it.
    pub email: Option<String>,
    /// Expiry as epoch seconds.
    pub exp: i64,
    /// The full claim object, including the fields above.
    claims: serde_json::Map<String, serde_json::Value>,
}

impl ClaimSet {
    /// Look up an arbitrary claim by name.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }
}

/// Decode the payload segment of an identity token into a [`ClaimSet`].
///
/// Pure function: no I/O, no clock reads, fully deterministic.
pub fn decode_id_token(token: &str) -> Result<ClaimSet, DecodeError> {
    let mut segments = token.split('.');
    let payload = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_header), Some(payload), Some(_signature), None) => payload,
        _ => return Err(DecodeError::Structure),
    };

    // The payload uses the url-safe alphabet without padding; remap to the
    // standard alphabet and re-pad before decoding.
    let standard = payload.replace('-', "+").replace('_', "/");
    let padded = match standard.len() % 4 {
        2 => format!("{standard}=="),
        3 => format!("{standard}="),
        _ => standard,
    };

    let bytes = BASE64.decode(padded)?;
    let text = String::from_utf8(bytes)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;

    let claims = match value {
        serde_json::Value::Object(map) => map,
        _ => return Err(DecodeError::NotAnObject),
    };

    let exp = claims
        .get("exp")
        .and_then(|v| v.as_i64())
        .ok_or(DecodeError::MissingExp)?;

    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(String::from);
    let email = claims
        .get("email")
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(ClaimSet {
        sub,
        email,
        exp,
        claims,
    })
}

/// Whether a claim set is still live at the given wall-clock time.
///
/// The comparison is strict: a token expiring exactly now is treated as
/// expired, erring toward forcing a refresh.
pub fn token_is_live(claims: &ClaimSet, now_epoch_seconds: i64) -> bool {
    claims.exp > now_epoch_seconds
}

/// Build a well-formed (unsigned) token around the given claim object.
#[cfg(test)]
pub(crate) fn encode_token(payload: &serde_json::Value) -> String {
    fn segment(bytes: &[u8]) -> String {
        BASE64
            .encode(bytes)
            .replace('+', "-")
            .replace('/', "_")
            .replace('=', "")
    }

    let header = serde_json::json!({"alg": "RS256", "typ": "JWT"});
    format!(
        "{}.{}.{}",
        segment(header.to_string().as_bytes()),
        segment(payload.to_string().as_bytes()),
        segment(b"test-signature")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_recovers_claims() {
        let token = encode_token(&serde_json::json!({
            "sub": "user-123",
            "email": "a@b.com",
            "exp": 4_102_444_800i64,
            "custom:plan": "premium",
        }));

        let claims = decode_id_token(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user-123"));
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.exp, 4_102_444_800);
        assert_eq!(
            claims.claim("custom:plan"),
            Some(&serde_json::json!("premium"))
        );
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        assert!(matches!(
            decode_id_token("only-one-segment"),
            Err(DecodeError::Structure)
        ));
        assert!(matches!(
            decode_id_token("two.segments"),
            Err(DecodeError::Structure)
        ));
        assert!(matches!(
            decode_id_token("a.b.c.d"),
            Err(DecodeError::Structure)
        ));
    }

    #[test]
    fn test_rejects_bad_base64_payload() {
        let result = decode_id_token("aGVhZGVy.!!!not-base64!!!.c2ln");
        assert!(matches!(result, Err(DecodeError::Encoding(_))));
    }

    #[test]
    fn test_rejects_non_json_payload() {
        fn segment(bytes: &[u8]) -> String {
            BASE64
                .encode(bytes)
                .replace('+', "-")
                .replace('/', "_")
                .replace('=', "")
        }
        let token = format!("{}.{}.{}", segment(b"h"), segment(b"plain text"), segment(b"s"));
        assert!(matches!(decode_id_token(&token), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_rejects_non_object_payload() {
        fn segment(bytes: &[u8]) -> String {
            BASE64
                .encode(bytes)
                .replace('+', "-")
                .replace('/', "_")
                .replace('=', "")
        }
        let token = format!("{}.{}.{}", segment(b"h"), segment(b"[1,2,3]"), segment(b"s"));
        assert!(matches!(
            decode_id_token(&token),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn test_rejects_missing_exp() {
        let token = encode_token(&serde_json::json!({"sub": "user-123"}));
        assert!(matches!(
            decode_id_token(&token),
            Err(DecodeError::MissingExp)
        ));
    }

    #[test]
    fn test_roundtrip_exercises_padding_branches() {
        // Varying payload lengths walk the segment length through every
        // residue mod 4, covering both re-padding branches.
        for filler in ["x", "xx", "xxx", "xxxx"] {
            let token = encode_token(&serde_json::json!({"exp": 1000, "f": filler}));
            let claims = decode_id_token(&token).unwrap();
            assert_eq!(claims.claim("f"), Some(&serde_json::json!(filler)));
        }
    }

    #[test]
    fn test_expiry_comparison_is_strict() {
        let token = encode_token(&serde_json::json!({"exp": 1000}));
        let claims = decode_id_token(&token).unwrap();

        assert!(token_is_live(&claims, 999));
        // A token expiring exactly "now" is already expired.
        assert!(!token_is_live(&claims, 1000));
        assert!(!token_is_live(&claims, 1001));
    }
}
