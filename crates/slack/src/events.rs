use serde::Deserialize;
use thiserror::Error;

pub const APP_MENTION: &str = "app_mention";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("request body is empty")]
    EmptyBody,
    #[error("invalid events payload: {0}")]
    InvalidJson(String),
    #[error("slash command payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Events API envelope, discriminated by its `type` field.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiPayload {
    UrlVerification {
        #[serde(default)]
        token: String,
        challenge: String,
    },
    EventCallback(EventCallback),
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct EventCallback {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub team_id: Option<String>,
    pub event_id: String,
    #[serde(default)]
    pub event_time: Option<i64>,
    pub event: InnerEvent,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct InnerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub event_ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub blocks: Vec<RichTextElement>,
    #[serde(default)]
    pub files: Vec<SlackFile>,
}

impl InnerEvent {
    pub fn is_bot_authored(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// First `link` element found anywhere in the rich-text tree.
    pub fn first_link(&self) -> Option<String> {
        self.blocks.iter().find_map(RichTextElement::first_link)
    }
}

/// Rich-text nodes nest arbitrarily (block → section → leaf); only the fields
/// needed to find links and mentions are kept.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct RichTextElement {
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub elements: Vec<RichTextElement>,
}

impl RichTextElement {
    fn first_link(&self) -> Option<String> {
        if self.element_type == "link" {
            if let Some(url) = self.url.as_ref().filter(|url| !url.is_empty()) {
                return Some(url.clone());
            }
        }
        self.elements.iter().find_map(Self::first_link)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct SlackFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url_private_download: Option<String>,
}

/// Form-encoded body Slack sends for slash commands.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub token: String,
    pub team_id: Option<String>,
    pub channel_id: String,
    pub user_id: String,
    pub command: String,
    pub text: String,
    pub trigger_id: String,
    pub response_url: Option<String>,
}

impl SlashCommandPayload {
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        let mut payload = Self::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            let value = value.into_owned();
            match key.as_ref() {
                "token" => payload.token = value,
                "team_id" => payload.team_id = Some(value),
                "channel_id" => payload.channel_id = value,
                "user_id" => payload.user_id = value,
                "command" => payload.command = value,
                "text" => payload.text = value,
                "trigger_id" => payload.trigger_id = value,
                "response_url" => payload.response_url = Some(value),
                _ => {}
            }
        }

        if payload.command.is_empty() {
            return Err(DecodeError::MissingField("command"));
        }
        if payload.trigger_id.is_empty() {
            return Err(DecodeError::MissingField("trigger_id"));
        }
        if payload.channel_id.is_empty() {
            return Err(DecodeError::MissingField("channel_id"));
        }
        Ok(payload)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundRequest {
    Events(EventsApiPayload),
    SlashCommand(SlashCommandPayload),
}

/// Fields read before strict decoding so authentication never depends on
/// the rest of the payload being well formed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    /// `event_id` or `trigger_id` when the body carries one.
    pub correlation_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LenientEnvelope {
    #[serde(default)]
    token: serde_json::Value,
    #[serde(default)]
    event_id: serde_json::Value,
}

fn is_form(content_type: Option<&str>) -> bool {
    content_type
        .map(|value| value.trim().to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Lenient first pass: any JSON object or form body yields credentials,
/// whatever its shape. Missing or non-string tokens read as empty.
pub fn read_credentials(content_type: Option<&str>, body: &[u8]) -> Result<Credentials, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::EmptyBody);
    }

    if is_form(content_type) {
        let mut credentials = Credentials::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "token" => credentials.token = value.into_owned(),
                "trigger_id" if !value.is_empty() => {
                    credentials.correlation_id = Some(value.into_owned());
                }
                _ => {}
            }
        }
        return Ok(credentials);
    }

    let envelope = serde_json::from_slice::<LenientEnvelope>(body)
        .map_err(|error| DecodeError::InvalidJson(error.to_string()))?;
    Ok(Credentials {
        token: envelope.token.as_str().unwrap_or_default().to_string(),
        correlation_id: envelope
            .event_id
            .as_str()
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    })
}

pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<InboundRequest, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::EmptyBody);
    }

    if is_form(content_type) {
        return SlashCommandPayload::parse(body).map(InboundRequest::SlashCommand);
    }

    serde_json::from_slice::<EventsApiPayload>(body)
        .map(InboundRequest::Events)
        .map_err(|error| DecodeError::InvalidJson(error.to_string()))
}
