use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::blocks::MessageTemplate;

const PAGE_LIMIT: &str = "1000";
const SLACKBOT_USER_ID: &str = "USLACKBOT";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack could not be reached during `{method}`: {detail}")]
    Unreachable { method: &'static str, detail: String },
    #[error("slack rejected `{method}`: {error}")]
    Api { method: &'static str, error: String },
    #[error("unexpected response from `{method}`: {detail}")]
    Decode { method: &'static str, detail: String },
}

impl SlackApiError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

/// Plain-text file attached to a reply, uploaded into the reply's thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextFile {
    pub file_name: String,
    pub content: String,
    pub comment: String,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError>;

    async fn upload_text_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        file: &TextFile,
    ) -> Result<(), SlackApiError>;

    /// Every member id of the channel, following pagination.
    async fn conversation_members(&self, channel: &str) -> Result<Vec<String>, SlackApiError>;

    /// The subset of `candidates` that are active human accounts, in input order.
    async fn human_user_ids(&self, candidates: &[String]) -> Result<Vec<String>, SlackApiError>;

    /// Fetches a private file with the bot token. Fails once the body exceeds `max_bytes`.
    async fn download_file(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, SlackApiError>;
}

pub struct HttpSlackClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for HttpSlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSlackClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .finish()
    }
}

#[derive(Deserialize)]
struct PostMessageResponse {
    channel: String,
    ts: String,
}

#[derive(Deserialize, Default)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct MembersPage {
    #[serde(default)]
    members: Vec<String>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct UserSummary {
    id: String,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    deleted: bool,
}

#[derive(Deserialize)]
struct UsersPage {
    #[serde(default)]
    members: Vec<UserSummary>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Deserialize)]
struct UploadTarget {
    upload_url: String,
    file_id: String,
}

impl HttpSlackClient {
    pub fn new(
        token: SecretString,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
            SlackApiError::Unreachable { method: "client.build", detail: error.to_string() }
        })?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), token })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: &Value,
    ) -> Result<T, SlackApiError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .json(body)
            .send()
            .await
            .map_err(|error| transport(method, error))?;
        read_envelope(method, response).await
    }

    async fn call_form<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &[(&str, &str)],
    ) -> Result<T, SlackApiError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().filter(|(_, value)| !value.is_empty()))
            .finish();
        let response = self
            .http
            .post(self.endpoint(method))
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|error| transport(method, error))?;
        read_envelope(method, response).await
    }
}

fn transport(method: &'static str, error: reqwest::Error) -> SlackApiError {
    SlackApiError::Unreachable { method, detail: error.to_string() }
}

/// Slack answers 200 with `{"ok": false, "error": ..}` for API-level failures.
async fn read_envelope<T: DeserializeOwned>(
    method: &'static str,
    response: reqwest::Response,
) -> Result<T, SlackApiError> {
    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(SlackApiError::Unreachable { method, detail: format!("HTTP {status}") });
    }

    let payload: Value = response
        .json()
        .await
        .map_err(|error| SlackApiError::Decode { method, detail: error.to_string() })?;
    if payload.get("ok").and_then(Value::as_bool) != Some(true) {
        let error = payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(SlackApiError::Api { method, error });
    }

    serde_json::from_value(payload)
        .map_err(|error| SlackApiError::Decode { method, detail: error.to_string() })
}

#[async_trait]
impl SlackApi for HttpSlackClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, SlackApiError> {
        let mut body = json!({
            "channel": channel,
            "text": message.fallback_text,
            "blocks": message.blocks,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let posted: PostMessageResponse = self.call_json("chat.postMessage", &body).await?;
        Ok(PostedMessage { channel: posted.channel, ts: posted.ts })
    }

    async fn upload_text_file(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        file: &TextFile,
    ) -> Result<(), SlackApiError> {
        let length = file.content.len().to_string();
        let target: UploadTarget = self
            .call_form(
                "files.getUploadURLExternal",
                &[("filename", file.file_name.as_str()), ("length", length.as_str())],
            )
            .await?;

        let method = "files.upload";
        let status = self
            .http
            .post(&target.upload_url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(file.content.clone())
            .send()
            .await
            .map_err(|error| transport(method, error))?
            .status();
        if !status.is_success() {
            return Err(SlackApiError::Unreachable { method, detail: format!("HTTP {status}") });
        }

        let mut body = json!({
            "files": [{ "id": target.file_id, "title": file.file_name }],
            "channel_id": channel,
            "initial_comment": file.comment,
        });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }
        let _: Value = self.call_json("files.completeUploadExternal", &body).await?;
        debug!(
            event_name = "slack.file_uploaded",
            channel = %channel,
            file_name = %file.file_name,
            "attachment uploaded"
        );
        Ok(())
    }

    async fn conversation_members(&self, channel: &str) -> Result<Vec<String>, SlackApiError> {
        let mut members = Vec::new();
        let mut cursor = String::new();
        loop {
            let page: MembersPage = self
                .call_form(
                    "conversations.members",
                    &[("channel", channel), ("limit", PAGE_LIMIT), ("cursor", cursor.as_str())],
                )
                .await?;
            members.extend(page.members);
            if page.response_metadata.next_cursor.is_empty() {
                return Ok(members);
            }
            cursor = page.response_metadata.next_cursor;
        }
    }

    async fn human_user_ids(&self, candidates: &[String]) -> Result<Vec<String>, SlackApiError> {
        let mut humans = HashSet::new();
        let mut cursor = String::new();
        loop {
            let page: UsersPage = self
                .call_form("users.list", &[("limit", PAGE_LIMIT), ("cursor", cursor.as_str())])
                .await?;
            humans.extend(
                page.members
                    .into_iter()
                    .filter(|user| !user.is_bot && !user.deleted && user.id != SLACKBOT_USER_ID)
                    .map(|user| user.id),
            );
            if page.response_metadata.next_cursor.is_empty() {
                break;
            }
            cursor = page.response_metadata.next_cursor;
        }

        Ok(candidates.iter().filter(|id| humans.contains(id.as_str())).cloned().collect())
    }

    async fn download_file(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, SlackApiError> {
        let method = "files.download";
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.bearer())
            .send()
            .await
            .map_err(|error| transport(method, error))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SlackApiError::Unreachable { method, detail: format!("HTTP {status}") });
        }
        if !status.is_success() {
            return Err(SlackApiError::Api { method, error: format!("HTTP {status}") });
        }
        if response.content_length().is_some_and(|length| length > max_bytes) {
            return Err(SlackApiError::Api { method, error: "file_too_large".to_string() });
        }

        let bytes = response.bytes().await.map_err(|error| transport(method, error))?;
        if bytes.len() as u64 > max_bytes {
            return Err(SlackApiError::Api { method, error: "file_too_large".to_string() });
        }
        Ok(bytes.to_vec())
    }
}
