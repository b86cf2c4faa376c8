use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::object::{ObjectKey, StagedObject, StagedObjectGrant};
use crate::signing::{hmac_sha256_hex, verify_hmac_sha256_hex};
use crate::store::{ObjectStore, PutOutcome, StoreError};
use crate::time::{add_duration, Clock, SystemClock};

/// Staged objects are kept for two days, then become unreachable.
pub const OBJECT_RETENTION: Duration = Duration::from_secs(2 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("attachment is empty")]
    Empty,
    #[error("attachment is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("invalid link lifetime: {0}")]
    InvalidLifetime(String),
    #[error("generated object key already exists")]
    KeyConflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("signature does not match")]
    InvalidSignature,
    #[error("link expired")]
    LinkExpired,
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Signs read-only retrieval links as `HMAC(GET \n bucket \n key \n expires)`.
#[derive(Clone)]
pub struct UrlSigner {
    secret: SecretString,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Random per-process secret. Links stop verifying after a restart.
    pub fn ephemeral() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { secret: hex::encode(bytes).into() }
    }

    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> String {
        hmac_sha256_hex(
            self.secret.expose_secret().as_bytes(),
            canonical_request(bucket, key, expires).as_bytes(),
        )
    }

    pub fn verify(&self, bucket: &str, key: &str, expires: i64, signature: &str) -> bool {
        verify_hmac_sha256_hex(
            self.secret.expose_secret().as_bytes(),
            canonical_request(bucket, key, expires).as_bytes(),
            signature,
        )
    }
}

fn canonical_request(bucket: &str, key: &str, expires: i64) -> String {
    format!("GET\n{bucket}\n{key}\n{expires}")
}

pub struct ObjectStaging {
    store: Arc<dyn ObjectStore>,
    signer: UrlSigner,
    clock: Arc<dyn Clock>,
    bucket: String,
    public_base_url: String,
    max_object_bytes: u64,
}

impl ObjectStaging {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        signer: UrlSigner,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            signer,
            clock: Arc::new(SystemClock),
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_object_bytes: 50 * 1024 * 1024,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_object_bytes(mut self, max_object_bytes: u64) -> Self {
        self.max_object_bytes = max_object_bytes;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn stage(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
        url_lifetime: Duration,
    ) -> Result<StagedObjectGrant, StagingError> {
        let size = bytes.len() as u64;
        if size == 0 {
            return Err(StagingError::Empty);
        }
        if size > self.max_object_bytes {
            return Err(StagingError::TooLarge { size, limit: self.max_object_bytes });
        }
        if url_lifetime.is_zero() {
            return Err(StagingError::InvalidLifetime("must be greater than zero".to_string()));
        }

        let now = self.clock.now();
        let object_expires_at = add_duration(now, OBJECT_RETENTION);
        let key = ObjectKey(Uuid::new_v4().simple().to_string());
        let file_name = sanitize_file_name(file_name);
        let object = StagedObject {
            bucket: self.bucket.clone(),
            key: key.clone(),
            file_name: file_name.clone(),
            content_type: normalize_content_type(content_type),
            content_digest: blake3::hash(&bytes).to_hex().to_string(),
            size_bytes: size,
            bytes,
            created_at: now,
            expires_at: object_expires_at,
        };

        if self.store.put_if_absent(object).await? == PutOutcome::AlreadyExists {
            return Err(StagingError::KeyConflict);
        }

        // Whole seconds, rounded down, so the link never outlives the object.
        let requested = add_duration(now, url_lifetime).min(object_expires_at);
        let expires = requested.timestamp();
        let url_expires_at = Utc.timestamp_opt(expires, 0).single().unwrap_or(requested);
        let signature = self.signer.sign(&self.bucket, &key.0, expires);
        let url = format!(
            "{}/objects/{}?expires={expires}&signature={signature}",
            self.public_base_url, key.0
        );

        info!(
            event_name = "staging.object_staged",
            bucket = %self.bucket,
            object_key = %key,
            size_bytes = size,
            url_expires_at = %url_expires_at,
            "object staged"
        );

        Ok(StagedObjectGrant {
            bucket: self.bucket.clone(),
            key,
            file_name,
            size_bytes: size,
            object_expires_at,
            url,
            url_expires_at,
        })
    }

    pub async fn retrieve(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<StagedObject, RetrievalError> {
        if !self.signer.verify(&self.bucket, key, expires, signature) {
            debug!(event_name = "staging.signature_rejected", object_key = %key, "bad signature");
            return Err(RetrievalError::InvalidSignature);
        }
        if self.clock.now().timestamp() >= expires {
            return Err(RetrievalError::LinkExpired);
        }
        self.store.get(&self.bucket, key).await?.ok_or(RetrievalError::NotFound)
    }

    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.store.purge_expired().await
    }
}

fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|ch| !ch.is_control() && !matches!(ch, '"' | ';'))
        .collect::<String>()
        .trim()
        .to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "attachment".to_string()
    } else {
        cleaned
    }
}

fn normalize_content_type(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(['\r', '\n']) {
        "application/octet-stream".to_string()
    } else {
        trimmed.to_string()
    }
}
