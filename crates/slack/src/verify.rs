use std::sync::Arc;
use std::time::Duration;

use hitter_core::signing::{constant_time_eq, verify_hmac_sha256_hex};
use hitter_core::time::{Clock, SystemClock};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const MAX_TIMESTAMP_SKEW: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("request signature headers are missing")]
    MissingSignature,
    #[error("request timestamp is not a unix timestamp")]
    InvalidTimestamp,
    #[error("request timestamp is outside the allowed window")]
    StaleTimestamp,
    #[error("request signature does not match")]
    SignatureMismatch,
    #[error("verification token does not match")]
    TokenMismatch,
}

/// Signature headers as received, before any parsing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureHeaders<'a> {
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

pub struct RequestVerifier {
    verification_token: SecretString,
    signing_secret: Option<SecretString>,
    clock: Arc<dyn Clock>,
    max_skew: Duration,
}

impl std::fmt::Debug for RequestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestVerifier")
            .field("verification_token", &"[redacted]")
            .field("signs_requests", &self.signing_secret.is_some())
            .field("max_skew", &self.max_skew)
            .finish()
    }
}

impl RequestVerifier {
    pub fn new(verification_token: SecretString, signing_secret: Option<SecretString>) -> Self {
        Self {
            verification_token,
            signing_secret,
            clock: Arc::new(SystemClock),
            max_skew: MAX_TIMESTAMP_SKEW,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn requires_signature(&self) -> bool {
        self.signing_secret.is_some()
    }

    /// Checks `v0={hex}` over `v0:{timestamp}:{body}`. A no-op without a signing secret.
    pub fn verify_signature(
        &self,
        headers: SignatureHeaders<'_>,
        body: &[u8],
    ) -> Result<(), VerificationError> {
        let Some(secret) = self.signing_secret.as_ref() else {
            return Ok(());
        };
        let (Some(timestamp), Some(signature)) = (headers.timestamp, headers.signature) else {
            return Err(VerificationError::MissingSignature);
        };

        let sent_at: i64 =
            timestamp.trim().parse().map_err(|_| VerificationError::InvalidTimestamp)?;
        let skew = self.clock.now().timestamp().abs_diff(sent_at);
        if skew > self.max_skew.as_secs() {
            return Err(VerificationError::StaleTimestamp);
        }

        let Some(signature_hex) = signature.trim().strip_prefix("v0=") else {
            return Err(VerificationError::SignatureMismatch);
        };
        let mut message = Vec::with_capacity(body.len() + timestamp.len() + 4);
        message.extend_from_slice(b"v0:");
        message.extend_from_slice(timestamp.trim().as_bytes());
        message.push(b':');
        message.extend_from_slice(body);

        if verify_hmac_sha256_hex(secret.expose_secret().as_bytes(), &message, signature_hex) {
            Ok(())
        } else {
            Err(VerificationError::SignatureMismatch)
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<(), VerificationError> {
        let expected = self.verification_token.expose_secret();
        if !token.is_empty() && constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(VerificationError::TokenMismatch)
        }
    }
}
