use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use hitter_core::errors::ApplicationError;
use hitter_core::shorturl::ShortUrlError;
use hitter_core::staging::StagingError;
use hitter_core::store::StoreError;
use hitter_core::translate::TranslateError;
use thiserror::Error;

use crate::blocks::{MessageTemplate, ReplyHeader};
use crate::client::{SlackApiError, TextFile};
use crate::events::{InnerEvent, SlashCommandPayload};

pub const HELP_COMMAND: &str = "help";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub mimetype: Option<String>,
    pub size: Option<u64>,
    pub download_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandSource {
    Mention,
    SlashCommand { command: String },
}

/// A parsed `<@bot> command argument --option value ...` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub correlation_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub name: String,
    pub argument: Option<String>,
    /// Everything after the command word with whitespace preserved.
    pub remainder: String,
    pub options: BTreeMap<String, Vec<String>>,
    pub link: Option<String>,
    pub files: Vec<FileRef>,
    pub event_time: DateTime<Utc>,
    pub thread_ts: Option<String>,
    pub source: CommandSource,
}

impl CommandRequest {
    pub fn from_mention(
        correlation_id: impl Into<String>,
        event: &InnerEvent,
        received_at: DateTime<Utc>,
    ) -> Self {
        let text = event.text.trim().to_string();
        let (head, rest) = split_head(&text);
        let rest = if head.starts_with("<@") { rest } else { text.as_str() };
        let files = event
            .files
            .iter()
            .filter_map(|file| {
                let download_url = file.url_private_download.clone()?;
                Some(FileRef {
                    name: file.name.clone().unwrap_or_else(|| "attachment".to_string()),
                    mimetype: file.mimetype.clone(),
                    size: file.size,
                    download_url,
                })
            })
            .collect();
        let event_time = event
            .event_ts
            .as_deref()
            .or(event.ts.as_deref())
            .and_then(parse_slack_ts)
            .unwrap_or(received_at);

        Self::parse(rest, CommandFrame {
            correlation_id: correlation_id.into(),
            channel_id: event.channel.clone().unwrap_or_default(),
            user_id: event.user.clone().unwrap_or_default(),
            text: text.clone(),
            link: event.first_link(),
            files,
            event_time,
            thread_ts: event.thread_ts.clone(),
            source: CommandSource::Mention,
        })
    }

    pub fn from_slash_command(payload: &SlashCommandPayload, received_at: DateTime<Utc>) -> Self {
        let text = payload.text.trim().to_string();
        Self::parse(&text, CommandFrame {
            correlation_id: payload.trigger_id.clone(),
            channel_id: payload.channel_id.clone(),
            user_id: payload.user_id.clone(),
            text: format!("{} {}", payload.command, text).trim().to_string(),
            link: None,
            files: Vec::new(),
            event_time: received_at,
            thread_ts: None,
            source: CommandSource::SlashCommand { command: payload.command.clone() },
        })
    }

    fn parse(command_text: &str, frame: CommandFrame) -> Self {
        let (name, remainder) = split_head(command_text);
        let name = if name.is_empty() { HELP_COMMAND.to_string() } else { name.to_ascii_lowercase() };
        let remainder = remainder.trim().to_string();

        let mut argument = None;
        let mut options: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut current: Option<String> = None;
        for (index, token) in remainder.split_whitespace().enumerate() {
            if let Some(key) = token.strip_prefix("--").filter(|key| !key.is_empty()) {
                let key = key.to_ascii_lowercase();
                options.entry(key.clone()).or_default();
                current = Some(key);
                continue;
            }
            let value = unwrap_token(token);
            // Each `--key` takes at most one value; repeat the flag for more.
            match current.take() {
                Some(key) => options.entry(key).or_default().push(value),
                None if index == 0 => argument = Some(value),
                None => {}
            }
        }

        Self {
            correlation_id: frame.correlation_id,
            channel_id: frame.channel_id,
            user_id: frame.user_id,
            text: frame.text,
            name,
            argument,
            remainder,
            options,
            link: frame.link,
            files: frame.files,
            event_time: frame.event_time,
            thread_ts: frame.thread_ts,
            source: frame.source,
        }
    }

    pub fn option(&self, key: &str) -> &[String] {
        self.options.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first_option(&self, key: &str) -> Option<&str> {
        self.option(key).first().map(String::as_str)
    }

    pub fn is_slash_command(&self) -> bool {
        matches!(self.source, CommandSource::SlashCommand { .. })
    }
}

struct CommandFrame {
    correlation_id: String,
    channel_id: String,
    user_id: String,
    text: String,
    link: Option<String>,
    files: Vec<FileRef>,
    event_time: DateTime<Utc>,
    thread_ts: Option<String>,
    source: CommandSource,
}

fn split_head(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(index) => (&text[..index], &text[index..]),
        None => (text, ""),
    }
}

/// `<@U123>` and `<@U123|name>` become `U123`, `<https://x|label>` becomes `https://x`.
pub fn unwrap_token(token: &str) -> String {
    let Some(inner) = token.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) else {
        return token.to_string();
    };
    let inner = inner.split('|').next().unwrap_or(inner);
    inner.strip_prefix('@').unwrap_or(inner).to_string()
}

/// Slack `ts` values are `seconds.micros` strings.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, "0"));
    let seconds: i64 = seconds.parse().ok()?;
    let micros: u32 = format!("{fraction:0<6}").get(..6)?.parse().ok()?;
    DateTime::from_timestamp(seconds, micros * 1_000)
}

/// Per-reply rendering settings shared by every handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub display_offset: FixedOffset,
}

impl CommandContext {
    pub fn new(display_offset: FixedOffset) -> Self {
        Self { display_offset }
    }

    pub fn format_time(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset).format("%Y/%m/%d %a %H:%M:%S %:z").to_string()
    }

    pub fn file_stamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset).format("%Y%m%d%H%M%S").to_string()
    }

    pub fn header(&self, request: &CommandRequest) -> ReplyHeader {
        ReplyHeader {
            user_id: request.user_id.clone(),
            command_text: request.text.clone(),
            event_time: self.format_time(request.event_time),
        }
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandReply {
    pub message: MessageTemplate,
    pub attachment: Option<TextFile>,
}

impl CommandReply {
    pub fn message(message: MessageTemplate) -> Self {
        Self { message, attachment: None }
    }

    pub fn with_attachment(mut self, attachment: TextFile) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Problem with what the user asked for; reported back in the channel.
    #[error("{0}")]
    User(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no free short id after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },
    #[error(transparent)]
    Platform(#[from] SlackApiError),
}

impl CommandError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::User(message) => message.clone(),
            Self::Store(_) => "Storage is temporarily unavailable".to_string(),
            Self::CollisionExhausted { .. } => "Could not allocate a short id".to_string(),
            Self::Platform(error) if error.is_unreachable() => "Slack could not be reached".to_string(),
            Self::Platform(error) => error.to_string(),
        }
    }

    pub fn into_application(self) -> ApplicationError {
        match self {
            Self::User(message) => ApplicationError::Command(message),
            Self::Store(error) => ApplicationError::from(error),
            Self::CollisionExhausted { attempts } => ApplicationError::CollisionExhausted { attempts },
            Self::Platform(error) if error.is_unreachable() => {
                ApplicationError::Integration(error.to_string())
            }
            Self::Platform(error) => ApplicationError::Command(error.to_string()),
        }
    }
}

impl From<ShortUrlError> for CommandError {
    fn from(value: ShortUrlError) -> Self {
        match value {
            ShortUrlError::InvalidUrl(message) | ShortUrlError::InvalidTtl(message) => {
                Self::User(message)
            }
            ShortUrlError::CollisionExhausted { attempts } => Self::CollisionExhausted { attempts },
            ShortUrlError::Store(error) => Self::Store(error),
        }
    }
}

impl From<StagingError> for CommandError {
    fn from(value: StagingError) -> Self {
        match value {
            StagingError::Store(error) => Self::Store(error),
            other => Self::User(other.to_string()),
        }
    }
}

impl From<TranslateError> for CommandError {
    fn from(value: TranslateError) -> Self {
        Self::User(value.to_string())
    }
}

/// Reference entry rendered by the `help` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandHelp {
    pub name: &'static str,
    pub description: &'static str,
    pub synopsis: &'static str,
    pub options: &'static [&'static str],
    pub examples: &'static [&'static str],
}

impl CommandHelp {
    pub fn render(&self) -> String {
        let mut text = format!(":book: *{}*\n```DESCRIPTION: \n • {}\n", self.name, self.description);
        text.push_str(&format!("SYNOPSIS: \n • {}\n", self.synopsis));
        if !self.options.is_empty() {
            text.push_str("OPTIONS: \n");
            for option in self.options {
                text.push_str(&format!(" • {option}\n"));
            }
        }
        if !self.examples.is_empty() {
            text.push_str("EXAMPLES: \n");
            for example in self.examples {
                text.push_str(&format!(" • {example}\n"));
            }
        }
        text.push_str("```\n");
        text
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn help(&self) -> CommandHelp;

    async fn handle(
        &self,
        request: &CommandRequest,
        context: &CommandContext,
    ) -> Result<CommandReply, CommandError>;
}

/// Name → handler table, filled once at startup.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
    order: Vec<&'static str>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Option<Arc<dyn CommandHandler>> {
        let name = handler.name();
        let previous = self.handlers.insert(name, handler);
        if previous.is_none() {
            self.order.push(name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    /// Help text for every registered command except `help` itself, in registration order.
    pub fn help_reference(&self) -> String {
        self.order
            .iter()
            .filter(|name| **name != HELP_COMMAND)
            .filter_map(|name| self.handlers.get(name))
            .map(|handler| handler.help().render())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
