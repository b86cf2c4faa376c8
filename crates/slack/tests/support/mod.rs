#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hitter_core::mutex::MutexCoordinator;
use hitter_core::shorturl::{IdGenerator, ShortUrlService};
use hitter_core::staging::{ObjectStaging, UrlSigner};
use hitter_core::store::{ExpiringStore, InMemoryExpiringStore, InMemoryObjectStore};
use hitter_core::time::{Clock, ManualClock};
use hitter_core::translate::{LanguagePair, TranslateError, Translator};
use hitter_slack::blocks::MessageTemplate;
use hitter_slack::client::{PostedMessage, SlackApi, SlackApiError, TextFile};
use hitter_slack::commands::{CommandHandler, CommandRegistry};
use hitter_slack::handlers::{HelpHandler, HitHandler, LinkHandler, ShortHandler, TranslateHandler};
use hitter_slack::processor::{ProcessorSettings, WebhookProcessor, WebhookRequest};
use hitter_slack::verify::{RequestVerifier, SignatureHeaders};
use secrecy::SecretString;
use serde_json::{json, Value};

pub const TOKEN: &str = "verification-token";
pub const BOT_ID: &str = "U0LAN0Z89";
pub const CALLER: &str = "U061F7AUR";
pub const CHANNEL: &str = "C0LAN2Q65";
pub const REPLY_TS: &str = "1714554001.000200";
pub const SHORT_BASE: &str = "https://s.example.com";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("valid start")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posted {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub message: MessageTemplate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uploaded {
    pub channel: String,
    pub thread_ts: Option<String>,
    pub file: TextFile,
}

#[derive(Default)]
pub struct RecordingSlack {
    pub members: Mutex<Vec<String>>,
    pub bots: Mutex<HashSet<String>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub posted: Mutex<Vec<Posted>>,
    pub uploads: Mutex<Vec<Uploaded>>,
    pub unreachable: AtomicBool,
    pub member_calls: AtomicUsize,
}

impl RecordingSlack {
    pub fn with_members(members: &[&str], bots: &[&str]) -> Self {
        let slack = Self::default();
        *slack.members.lock().expect("members") = members.iter().map(|id| id.to_string()).collect();
        *slack.bots.lock().expect("bots") = bots.iter().map(|id| id.to_string()).collect();
        slack
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.posted.lock().expect("posted").clone()
    }

    pub fn uploads(&self) -> Vec<Uploaded> {
        self.uploads.lock().expect("uploads").clone()
    }

    pub fn last_text(&self) -> String {
        self.posted().last().map(|posted| posted.message.section_text()).unwrap_or_default()
    }

    fn check_reachable(&self, method: &'static str) -> Result<(), SlackApiError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SlackApiError::Unreachable { method, detail: "connection refused".into() });
        }
        Ok(())
    }
}

#[async_trait]
impl SlackApi for RecordingSlack {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError> {
        self.check_reachable("chat.postMessage")?;
        self.posted.lock().expect("posted").push(Posted {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            message: message.clone(),
        });
        Ok(PostedMessage { channel: channel.to_string(), ts: REPLY_TS.to_string() })
    }

    async fn upload_text_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        file: &TextFile,
    ) -> Result<(), SlackApiError> {
        self.check_reachable("files.completeUploadExternal")?;
        self.uploads.lock().expect("uploads").push(Uploaded {
            channel: channel.to_string(),
            thread_ts: thread_ts.map(str::to_string),
            file: file.clone(),
        });
        Ok(())
    }

    async fn conversation_members(&self, _channel: &str) -> Result<Vec<String>, SlackApiError> {
        self.check_reachable("conversations.members")?;
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.members.lock().expect("members").clone())
    }

    async fn human_user_ids(&self, candidates: &[String]) -> Result<Vec<String>, SlackApiError> {
        self.check_reachable("users.list")?;
        let bots = self.bots.lock().expect("bots");
        Ok(candidates.iter().filter(|id| !bots.contains(id.as_str())).cloned().collect())
    }

    async fn download_file(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, SlackApiError> {
        self.check_reachable("files.download")?;
        let bytes = self
            .files
            .lock()
            .expect("files")
            .get(url)
            .cloned()
            .ok_or_else(|| SlackApiError::Api { method: "files.download", error: "file_not_found".into() })?;
        if bytes.len() as u64 > max_bytes {
            return Err(SlackApiError::Api { method: "files.download", error: "file_too_large".into() });
        }
        Ok(bytes)
    }
}

/// Detects `ja` for text containing non-ASCII characters, `en` otherwise.
pub struct FakeTranslator;

#[async_trait]
impl Translator for FakeTranslator {
    async fn detect_language(&self, text: &str) -> Result<String, TranslateError> {
        Ok(if text.is_ascii() { "en" } else { "ja" }.to_string())
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        Ok(format!("[{source}->{target}] {text}"))
    }
}

pub struct ScriptedIds(pub Mutex<VecDeque<&'static str>>);

impl ScriptedIds {
    pub fn new(ids: &[&'static str]) -> Self {
        Self(Mutex::new(ids.iter().copied().collect()))
    }
}

impl IdGenerator for ScriptedIds {
    fn generate(&self) -> String {
        let mut ids = self.0.lock().expect("ids");
        let next = ids.pop_front().unwrap_or("fallback");
        if ids.is_empty() {
            ids.push_back(next);
        }
        next.to_string()
    }
}

/// Store whose every operation fails, standing in for an unavailable database.
pub struct UnavailableStore;

#[async_trait]
impl ExpiringStore for UnavailableStore {
    fn namespace(&self) -> &str {
        "unavailable"
    }

    async fn put_if_absent(
        &self,
        _id: &str,
        _value: &str,
        _expires_at: DateTime<Utc>,
    ) -> Result<hitter_core::store::PutOutcome, hitter_core::store::StoreError> {
        Err(hitter_core::store::StoreError::Unavailable("database is locked".into()))
    }

    async fn get(
        &self,
        _id: &str,
    ) -> Result<Option<hitter_core::store::ExpiringRecord>, hitter_core::store::StoreError> {
        Err(hitter_core::store::StoreError::Unavailable("database is locked".into()))
    }

    async fn purge_expired(&self) -> Result<u64, hitter_core::store::StoreError> {
        Err(hitter_core::store::StoreError::Unavailable("database is locked".into()))
    }
}

pub struct HarnessOptions {
    pub signing_secret: Option<&'static str>,
    pub channel_filter: Option<&'static str>,
    pub handler_timeout: Duration,
    pub mutex_store: Option<Arc<dyn ExpiringStore>>,
    pub url_store: Option<Arc<dyn ExpiringStore>>,
    pub id_generator: Option<Arc<dyn IdGenerator>>,
    pub extra_handlers: Vec<Arc<dyn CommandHandler>>,
    pub slack: RecordingSlack,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            signing_secret: None,
            channel_filter: None,
            handler_timeout: Duration::from_secs(5),
            mutex_store: None,
            url_store: None,
            id_generator: None,
            extra_handlers: Vec::new(),
            slack: RecordingSlack::with_members(&[CALLER, "U1", "U2", "U3"], &[]),
        }
    }
}

pub struct Harness {
    pub processor: WebhookProcessor,
    pub slack: Arc<RecordingSlack>,
    pub clock: ManualClock,
    pub mutex_store: Arc<dyn ExpiringStore>,
    pub short_urls: Arc<ShortUrlService>,
    pub staging: Arc<ObjectStaging>,
}

pub fn harness() -> Harness {
    harness_with(HarnessOptions::default())
}

pub fn harness_with(options: HarnessOptions) -> Harness {
    let clock = ManualClock::new(start());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let slack = Arc::new(options.slack);

    let mutex_store: Arc<dyn ExpiringStore> = match options.mutex_store {
        Some(store) => store,
        None => Arc::new(InMemoryExpiringStore::with_clock("hitter-mutex", shared_clock.clone())),
    };
    let url_store: Arc<dyn ExpiringStore> = match options.url_store {
        Some(store) => store,
        None => Arc::new(InMemoryExpiringStore::with_clock("hitter-url", shared_clock.clone())),
    };

    let mut short_urls = ShortUrlService::new(url_store, SHORT_BASE).with_clock(shared_clock.clone());
    if let Some(generator) = options.id_generator {
        short_urls = short_urls.with_generator(generator);
    }
    let short_urls = Arc::new(short_urls);
    let staging = Arc::new(
        ObjectStaging::new(
            Arc::new(InMemoryObjectStore::with_clock(shared_clock.clone())),
            UrlSigner::new(SecretString::from("staging-secret".to_owned())),
            "hitter-objects",
            "https://api.example.com",
        )
        .with_clock(shared_clock.clone()),
    );

    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(HitHandler::new(slack.clone())));
    registry.register(Arc::new(TranslateHandler::new(Arc::new(FakeTranslator), LanguagePair::default())));
    registry.register(Arc::new(LinkHandler::new(
        slack.clone(),
        staging.clone(),
        Duration::from_secs(15 * 60),
        1024 * 1024,
    )));
    registry.register(Arc::new(ShortHandler::new(short_urls.clone(), 1)));
    for handler in options.extra_handlers {
        registry.register(handler);
    }
    let help = HelpHandler::from_registry(&registry);
    registry.register(Arc::new(help));

    let verifier = RequestVerifier::new(
        SecretString::from(TOKEN.to_owned()),
        options.signing_secret.map(|secret| SecretString::from(secret.to_owned())),
    )
    .with_clock(shared_clock.clone());
    let mutex = MutexCoordinator::with_clock(
        mutex_store.clone(),
        Duration::from_secs(24 * 60 * 60),
        shared_clock.clone(),
    );
    let settings = ProcessorSettings {
        channel_filter: options.channel_filter.map(str::to_string),
        handler_timeout: options.handler_timeout,
        ..ProcessorSettings::default()
    };

    let processor =
        WebhookProcessor::new(verifier, mutex, Arc::new(registry), slack.clone(), settings)
            .with_clock(shared_clock);

    Harness { processor, slack, clock, mutex_store, short_urls, staging }
}

pub fn mention_event(event_id: &str, text: &str) -> Value {
    json!({
        "token": TOKEN,
        "team_id": "T1",
        "type": "event_callback",
        "event_id": event_id,
        "event_time": 1714554000,
        "event": {
            "type": "app_mention",
            "user": CALLER,
            "text": format!("<@{BOT_ID}> {text}"),
            "channel": CHANNEL,
            "ts": "1714554000.000100",
            "event_ts": "1714554000.000100"
        }
    })
}

pub fn to_body(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("serialize body")
}

pub fn json_request(body: &[u8]) -> WebhookRequest<'_> {
    WebhookRequest {
        content_type: Some("application/json"),
        signature: SignatureHeaders::default(),
        body,
    }
}

pub fn form_request(body: &[u8]) -> WebhookRequest<'_> {
    WebhookRequest {
        content_type: Some("application/x-www-form-urlencoded"),
        signature: SignatureHeaders::default(),
        body,
    }
}
