use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// User id
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Reads the claims without checking the signature. Clients use this to
/// learn who they are logged in as; the server must never trust it.
pub fn decode_unverified(token: &str) -> Result<JwtClaims, JwtError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 {
        return Err(JwtError::Decode("invalid JWT format".into()));
    }
    let payload_b64 = parts[1];
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| JwtError::Decode(format!("invalid base64 payload: {e}")))?;
    serde_json::from_slice::<JwtClaims>(&payload_bytes)
        .map_err(|e| JwtError::Decode(format!("invalid json payload: {e}")))
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(token: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        token,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}

pub fn user_id_from_token(token: &str) -> Result<String, JwtError> {
    let claims = decode_unverified(token)?;
    Ok(claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> JwtClaims {
        JwtClaims {
            sub: "alex".into(),
            jti: "jti-1".into(),
            exp: chrono::Utc::now().timestamp() + 3600,
            role: Role::Child,
        }
    }

    #[test]
    fn verified_decode_rejects_wrong_secret() {
        let token = encode(&claims(), b"right-secret").unwrap();
        assert_eq!(decode_and_verify(&token, b"right-secret").unwrap().sub, "alex");
        assert!(decode_and_verify(&token, b"wrong-secret").is_err());
    }

    #[test]
    fn unverified_decode_reads_subject() {
        let token = encode(&claims(), b"whatever").unwrap();
        assert_eq!(user_id_from_token(&token).unwrap(), "alex");
        assert!(decode_unverified("garbage").is_err());
    }

    #[test]
    fn expired_tokens_fail_verification() {
        let mut c = claims();
        c.exp = chrono::Utc::now().timestamp() - 3600;
        let token = encode(&c, b"s").unwrap();
        assert!(decode_and_verify(&token, b"s").is_err());
    }
}
