use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::domain::short_url::{ShortLink, ShortUrlId, ShortUrlRecord};
use crate::store::{ExpiringStore, PutOutcome, StoreError};
use crate::time::{add_duration, Clock, SystemClock};

/// Short id alphabet. Leaves out `0 O o 1 l I` so links survive being read aloud.
pub const DEFAULT_ALPHABET: &str = "23456789abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";
pub const DEFAULT_ID_LENGTH: usize = 8;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ShortUrlError {
    #[error("not a shortenable URL: {0}")]
    InvalidUrl(String),
    #[error("invalid expiry: {0}")]
    InvalidTtl(String),
    #[error("no free short id after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(ShortUrlRecord),
    NotFound,
}

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Clone, Debug)]
pub struct RandomIdGenerator {
    length: usize,
    alphabet: Vec<char>,
}

impl RandomIdGenerator {
    pub fn new(length: usize) -> Self {
        Self { length, alphabet: DEFAULT_ALPHABET.chars().collect() }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length).filter_map(|_| self.alphabet.choose(&mut rng)).collect()
    }
}

pub struct ShortUrlService {
    store: Arc<dyn ExpiringStore>,
    generator: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    base_url: String,
    max_attempts: u32,
    max_ttl: Duration,
}

impl ShortUrlService {
    pub fn new(store: Arc<dyn ExpiringStore>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            generator: Arc::new(RandomIdGenerator::default()),
            clock: Arc::new(SystemClock),
            base_url,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = max_ttl;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn short_url_for(&self, id: &ShortUrlId) -> String {
        format!("{}/{}", self.base_url, id.0)
    }

    pub async fn shorten(&self, long_url: &str, ttl: Duration) -> Result<ShortLink, ShortUrlError> {
        let long_url = normalize_long_url(long_url)?;
        if ttl.is_zero() {
            return Err(ShortUrlError::InvalidTtl("expiry must be greater than zero".to_string()));
        }
        if ttl > self.max_ttl {
            return Err(ShortUrlError::InvalidTtl(format!(
                "expiry may be at most {} days",
                self.max_ttl.as_secs() / 86_400
            )));
        }

        let expires_at = add_duration(self.clock.now(), ttl);
        for attempt in 1..=self.max_attempts {
            let id = ShortUrlId(self.generator.generate());
            match self.store.put_if_absent(&id.0, &long_url, expires_at).await? {
                PutOutcome::Created => {
                    debug!(
                        event_name = "short_url.created",
                        short_id = %id,
                        attempt,
                        expires_at = %expires_at,
                        "short link stored"
                    );
                    let short_url = self.short_url_for(&id);
                    return Ok(ShortLink { id, long_url, short_url, expires_at });
                }
                PutOutcome::AlreadyExists => {
                    debug!(event_name = "short_url.collision", short_id = %id, attempt, "retrying");
                }
            }
        }

        warn!(
            event_name = "short_url.collision_exhausted",
            attempts = self.max_attempts,
            namespace = %self.store.namespace(),
            "could not find a free short id"
        );
        Err(ShortUrlError::CollisionExhausted { attempts: self.max_attempts })
    }

    pub async fn resolve(&self, id: &str) -> Result<Resolution, StoreError> {
        if id.trim().is_empty() {
            return Ok(Resolution::NotFound);
        }
        Ok(match self.store.get(id).await? {
            Some(record) => Resolution::Found(ShortUrlRecord::from(record)),
            None => Resolution::NotFound,
        })
    }
}

fn normalize_long_url(raw: &str) -> Result<String, ShortUrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShortUrlError::InvalidUrl("a URL is required".to_string()));
    }
    let parsed =
        Url::parse(trimmed).map_err(|err| ShortUrlError::InvalidUrl(format!("{trimmed}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
        return Err(ShortUrlError::InvalidUrl(format!(
            "{trimmed}: only absolute http and https URLs can be shortened"
        )));
    }
    Ok(trimmed.to_string())
}
