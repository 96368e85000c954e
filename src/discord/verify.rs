//! Ed25519 verification of inbound interaction requests.
//!
//! Discord signs `timestamp || body` with the application's key. Anything
//! that fails here is answered with 401 and never reaches dispatch.

use std::time::Duration;

use ed25519_dalek::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH, Signature, VerifyingKey};

use crate::discord::types::Interaction;
use crate::error::{ConfigError, VerificationError};

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Why a request was turned away.
#[derive(Debug, thiserror::Error)]
pub enum InteractionRejection {
    /// Authentication failed; respond 401.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] VerificationError),

    /// Correctly signed but not an interaction we can parse; respond 400.
    #[error("malformed interaction body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Checks request signatures against the application's public key.
#[derive(Debug, Clone)]
pub struct InteractionVerifier {
    key: VerifyingKey,
    max_skew: Duration,
}

impl InteractionVerifier {
    pub fn new(key: VerifyingKey, max_skew: Duration) -> Self {
        Self { key, max_skew }
    }

    /// Build from the hex key in configuration.
    pub fn from_hex(public_key: &str, max_skew: Duration) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "DISCORD_PUBLIC_KEY".to_string(),
            message,
        };
        let bytes: [u8; PUBLIC_KEY_LENGTH] = hex::decode(public_key.trim())
            .map_err(|e| invalid(format!("must be hex: {e}")))?
            .try_into()
            .map_err(|raw: Vec<u8>| {
                invalid(format!(
                    "expected {PUBLIC_KEY_LENGTH} bytes, got {}",
                    raw.len()
                ))
            })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| invalid(format!("not a valid Ed25519 key: {e}")))?;
        Ok(Self::new(key, max_skew))
    }

    /// Verify the signature headers against the raw body.
    pub fn verify(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<(), VerificationError> {
        self.verify_at(signature, timestamp, body, chrono::Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
        now_unix: i64,
    ) -> Result<(), VerificationError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(VerificationError::MissingSignature)?;
        let timestamp = timestamp
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(VerificationError::MissingTimestamp)?;

        let sig_bytes: [u8; SIGNATURE_LENGTH] = hex::decode(signature)
            .map_err(|e| VerificationError::MalformedSignature(e.to_string()))?
            .try_into()
            .map_err(|raw: Vec<u8>| {
                VerificationError::MalformedSignature(format!(
                    "expected {SIGNATURE_LENGTH} bytes, got {}",
                    raw.len()
                ))
            })?;

        let signed_at: i64 = timestamp
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                VerificationError::MalformedTimestamp(e.to_string())
            })?;
        let skew_secs = now_unix.saturating_sub(signed_at).saturating_abs();
        if skew_secs.unsigned_abs() > self.max_skew.as_secs() {
            return Err(VerificationError::StaleTimestamp { skew_secs });
        }

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify_strict(&message, &Signature::from_bytes(&sig_bytes))
            .map_err(|_| VerificationError::BadSignature)
    }

    /// Verify, then parse the body into an [`Interaction`].
    pub fn verify_interaction(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<Interaction, InteractionRejection> {
        self.verify(signature, timestamp, body)?;
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ed25519_dalek::{Signer, SigningKey};

    pub(crate) fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    pub(crate) fn sign(key: &SigningKey, timestamp: &str, body: &[u8]) -> String {
        let mut message = timestamp.as_bytes().to_vec();
        message.extend_from_slice(body);
        hex::encode(key.sign(&message).to_bytes())
    }
}
