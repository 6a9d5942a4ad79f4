//! Token issuance and verification.

use crate::error::{TokenError, TokenResult};
use crate::key::{PublicKey, SecretKey};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signature, Signer as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Current token format version.
const TOKEN_VERSION: &str = "v1";

/// Identity carried inside a signed token. Never persisted server-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Random identifier, used for log correlation only.
    pub id: Uuid,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Payload {
    fn new(username: &str, issued_at: OffsetDateTime, duration: Duration) -> TokenResult<Self> {
        let ttl = time::Duration::try_from(duration)
            .map_err(|e| TokenError::Encoding(format!("token duration out of range: {e}")))?;
        let expires_at = issued_at
            .checked_add(ttl)
            .ok_or_else(|| TokenError::Encoding("token expiry out of range".to_string()))?;

        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Whether the payload has expired at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}

/// Issues and verifies signed, time-bounded identity tokens.
pub trait TokenMaker: Send + Sync {
    /// Issue a token for `username` valid for `duration`.
    fn create_token(&self, username: &str, duration: Duration) -> TokenResult<(String, Payload)>;

    /// Verify a token and return its payload.
    ///
    /// Every failure is [`TokenError::Invalid`].
    fn verify_token(&self, token: &str) -> TokenResult<Payload>;
}

/// Ed25519-signed tokens of the form `v1.<payload>.<signature>`.
///
/// Both segments are unpadded base64url. The signature covers `v1.<payload>`.
pub struct Ed25519TokenMaker {
    secret: SecretKey,
    public: PublicKey,
}

impl Ed25519TokenMaker {
    pub fn new(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Create a maker with a freshly generated key.
    pub fn generate() -> Self {
        Self::new(SecretKey::generate())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    fn create_token_at(
        &self,
        username: &str,
        duration: Duration,
        now: OffsetDateTime,
    ) -> TokenResult<(String, Payload)> {
        if username.is_empty() {
            return Err(TokenError::Encoding("username must not be empty".to_string()));
        }

        let payload = Payload::new(username, now, duration)?;
        let json = serde_json::to_vec(&payload)
            .map_err(|e| TokenError::Encoding(format!("failed to encode payload: {e}")))?;

        let signed_part = format!("{TOKEN_VERSION}.{}", URL_SAFE_NO_PAD.encode(json));
        let signature = self.secret.signing_key().sign(signed_part.as_bytes());
        let token = format!(
            "{signed_part}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );

        Ok((token, payload))
    }

    fn verify_token_at(&self, token: &str, now: OffsetDateTime) -> TokenResult<Payload> {
        let reject = |reason: &str| {
            tracing::debug!(reason, "token rejected");
            TokenError::Invalid
        };

        let (signed_part, signature_b64) = token
            .rsplit_once('.')
            .ok_or_else(|| reject("malformed token"))?;
        let (version, payload_b64) = signed_part
            .split_once('.')
            .ok_or_else(|| reject("malformed token"))?;
        if version != TOKEN_VERSION {
            return Err(reject("unsupported token version"));
        }

        let signature_bytes: [u8; 64] = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| reject("malformed signature"))?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.public
            .verifying_key()
            .verify_strict(signed_part.as_bytes(), &signature)
            .map_err(|_| reject("signature mismatch"))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| reject("malformed payload encoding"))?;
        let payload: Payload =
            serde_json::from_slice(&json).map_err(|_| reject("malformed payload"))?;

        if payload.is_expired_at(now) {
            tracing::debug!(token_id = %payload.id, "token rejected: expired");
            return Err(TokenError::Invalid);
        }

        Ok(payload)
    }
}

impl TokenMaker for Ed25519TokenMaker {
    fn create_token(&self, username: &str, duration: Duration) -> TokenResult<(String, Payload)> {
        self.create_token_at(username, duration, OffsetDateTime::now_utc())
    }

    fn verify_token(&self, token: &str) -> TokenResult<Payload> {
        self.verify_token_at(token, OffsetDateTime::now_utc())
    }
}

impl std::fmt::Debug for Ed25519TokenMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519TokenMaker")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
