use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use hitter_core::config::AppConfig;
use hitter_core::errors::ApplicationError;
use hitter_core::mutex::{Acquisition, MutexCoordinator};
use hitter_core::time::{Clock, SystemClock};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::blocks::{error_message, help_message};
use crate::client::{SlackApi, SlackApiError};
use crate::commands::{CommandContext, CommandError, CommandRegistry, CommandReply, CommandRequest};
use crate::events::{
    decode_body, read_credentials, DecodeError, EventCallback, EventsApiPayload, InboundRequest,
    SlashCommandPayload, APP_MENTION,
};
use crate::verify::{RequestVerifier, SignatureHeaders, VerificationError};

const UNASSIGNED: &str = "unassigned";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Received,
    Verified,
    Deduplicated,
    Dispatched,
    Responded,
    Rejected,
    Acknowledged,
}

impl ProcessingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Verified => "verified",
            Self::Deduplicated => "deduplicated",
            Self::Dispatched => "dispatched",
            Self::Responded => "responded",
            Self::Rejected => "rejected",
            Self::Acknowledged => "acknowledged",
        }
    }
}

/// Raw webhook as the HTTP layer saw it.
#[derive(Clone, Copy, Debug)]
pub struct WebhookRequest<'a> {
    pub content_type: Option<&'a str>,
    pub signature: SignatureHeaders<'a>,
    pub body: &'a [u8],
}

#[derive(Clone, Debug, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: Value,
    /// Last state the request reached.
    pub stage: ProcessingStage,
}

impl WebhookResponse {
    fn new(status: u16, body: Value, stage: ProcessingStage) -> Self {
        Self { status, body, stage }
    }

    fn ignored(reason: &str) -> Self {
        Self::new(200, json!({ "message": format!("[IGNORED] {reason}") }), ProcessingStage::Verified)
    }
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Store(#[from] hitter_core::store::StoreError),
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl From<ProcessorError> for ApplicationError {
    fn from(value: ProcessorError) -> Self {
        match value {
            ProcessorError::Decode(error) => Self::MalformedRequest(error.to_string()),
            ProcessorError::Verification(error) => Self::Authentication(error.to_string()),
            ProcessorError::Store(error) => Self::from(error),
            ProcessorError::Slack(error) => Self::Integration(error.to_string()),
            ProcessorError::Command(error) => error.into_application(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorSettings {
    pub channel_filter: Option<String>,
    pub handler_timeout: Duration,
    pub display_offset: FixedOffset,
}

impl ProcessorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let offset_secs = config.processing.display_utc_offset_minutes.saturating_mul(60);
        Self {
            channel_filter: config.slack.channel_id.clone(),
            handler_timeout: config.processing.handler_timeout(),
            display_offset: FixedOffset::east_opt(offset_secs).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            channel_filter: None,
            handler_timeout: Duration::from_secs(25),
            display_offset: Utc.fix(),
        }
    }
}

/// Drives one webhook from receipt to reply:
/// `Received → Verified → Deduplicated → Dispatched → Responded`.
pub struct WebhookProcessor {
    verifier: RequestVerifier,
    mutex: MutexCoordinator,
    registry: Arc<CommandRegistry>,
    slack: Arc<dyn SlackApi>,
    clock: Arc<dyn Clock>,
    settings: ProcessorSettings,
}

impl WebhookProcessor {
    pub fn new(
        verifier: RequestVerifier,
        mutex: MutexCoordinator,
        registry: Arc<CommandRegistry>,
        slack: Arc<dyn SlackApi>,
        settings: ProcessorSettings,
    ) -> Self {
        Self { verifier, mutex, registry, slack, clock: Arc::new(SystemClock), settings }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub async fn process(&self, request: WebhookRequest<'_>) -> WebhookResponse {
        info!(
            event_name = "ingress.webhook.received",
            body_bytes = request.body.len(),
            signed = request.signature.signature.is_some(),
            "webhook received"
        );

        if let Err(error) = self.verifier.verify_signature(request.signature, request.body) {
            return self.reject(error, UNASSIGNED);
        }

        let credentials = match read_credentials(request.content_type, request.body) {
            Ok(credentials) => credentials,
            Err(error) => return malformed(error, UNASSIGNED),
        };
        let correlation_id = credentials.correlation_id.as_deref().unwrap_or(UNASSIGNED);
        if let Err(error) = self.verifier.verify_token(&credentials.token) {
            return self.reject(error, correlation_id);
        }

        let inbound = match decode_body(request.content_type, request.body) {
            Ok(inbound) => inbound,
            Err(error) => return malformed(error, correlation_id),
        };

        match inbound {
            InboundRequest::Events(EventsApiPayload::UrlVerification { challenge, .. }) => {
                debug!(event_name = "ingress.webhook.url_verification", "challenge answered");
                WebhookResponse::new(200, json!({ "challenge": challenge }), ProcessingStage::Verified)
            }
            InboundRequest::Events(EventsApiPayload::Unsupported) => {
                WebhookResponse::ignored("Unsupported envelope type")
            }
            InboundRequest::Events(EventsApiPayload::EventCallback(callback)) => {
                self.process_event(callback).await
            }
            InboundRequest::SlashCommand(payload) => self.process_slash_command(payload).await,
        }
    }

    fn reject(&self, error: VerificationError, correlation_id: &str) -> WebhookResponse {
        warn!(
            event_name = "ingress.webhook.rejected",
            correlation_id = %correlation_id,
            reason = %error,
            "webhook failed verification"
        );
        failure(ProcessorError::from(error), correlation_id, ProcessingStage::Rejected)
    }

    fn channel_allowed(&self, channel: &str) -> bool {
        self.settings.channel_filter.as_deref().map_or(true, |expected| expected == channel)
    }

    async fn process_event(&self, callback: EventCallback) -> WebhookResponse {
        let event = &callback.event;
        if event.event_type != APP_MENTION {
            debug!(
                event_name = "ingress.webhook.ignored",
                correlation_id = %callback.event_id,
                event_type = %event.event_type,
                "not an app mention"
            );
            return WebhookResponse::ignored("Slack event type is not 'app_mention'");
        }
        if event.is_bot_authored() {
            return WebhookResponse::ignored("Message was posted by a bot");
        }
        let channel = event.channel.as_deref().unwrap_or_default();
        if !self.channel_allowed(channel) {
            debug!(
                event_name = "ingress.webhook.ignored",
                correlation_id = %callback.event_id,
                channel = %channel,
                "channel filtered"
            );
            return WebhookResponse::ignored("Slack channel ID does not match");
        }

        if let Some(response) = self.deduplicate(&callback.event_id).await {
            return response;
        }

        let request = CommandRequest::from_mention(&callback.event_id, event, self.clock.now());
        self.dispatch(request).await
    }

    async fn process_slash_command(&self, payload: SlashCommandPayload) -> WebhookResponse {
        if !self.channel_allowed(&payload.channel_id) {
            return WebhookResponse::ignored("Slack channel ID does not match");
        }
        if let Some(response) = self.deduplicate(&payload.trigger_id).await {
            return response;
        }

        let request = CommandRequest::from_slash_command(&payload, self.clock.now());
        self.dispatch(request).await
    }

    /// `Some` ends processing here: a duplicate delivery or a storage failure.
    async fn deduplicate(&self, event_id: &str) -> Option<WebhookResponse> {
        match self.mutex.try_acquire_default(event_id).await {
            Ok(Acquisition::Acquired { .. }) => None,
            Ok(Acquisition::Duplicate) => {
                info!(
                    event_name = "ingress.webhook.duplicate",
                    correlation_id = %event_id,
                    "delivery already processed"
                );
                Some(WebhookResponse::new(
                    200,
                    json!({ "message": "[ACKNOWLEDGED] Already running under the same event ID" }),
                    ProcessingStage::Acknowledged,
                ))
            }
            Err(error) => {
                error!(
                    event_name = "mutex.unavailable",
                    correlation_id = %event_id,
                    error = %error,
                    "could not claim delivery id"
                );
                Some(failure(ProcessorError::from(error), event_id, ProcessingStage::Verified))
            }
        }
    }

    async fn dispatch(&self, request: CommandRequest) -> WebhookResponse {
        let context = CommandContext::new(self.settings.display_offset);
        info!(
            event_name = "command.dispatched",
            correlation_id = %request.correlation_id,
            command = %request.name,
            channel = %request.channel_id,
            "command dispatched"
        );

        let (reply, failed) = match self.run_handler(&request, context).await {
            Ok(reply) => (reply, None),
            Err(error) => {
                warn!(
                    event_name = "command.failed",
                    correlation_id = %request.correlation_id,
                    command = %request.name,
                    error = %error,
                    "command failed"
                );
                let message = error_message(&context.header(&request), &error.user_message());
                (CommandReply::message(message), Some(error))
            }
        };

        if request.is_slash_command() {
            return self.respond_inline(&request, reply, failed).await;
        }

        if let Err(error) = self.deliver(&request, &reply).await {
            if error.is_unreachable() {
                error!(
                    event_name = "slack.unreachable",
                    correlation_id = %request.correlation_id,
                    error = %error,
                    "reply could not be delivered"
                );
                return failure(
                    ProcessorError::from(error),
                    &request.correlation_id,
                    ProcessingStage::Dispatched,
                );
            }
            error!(
                event_name = "slack.delivery_rejected",
                correlation_id = %request.correlation_id,
                error = %error,
                "slack refused the reply"
            );
            return WebhookResponse::new(
                200,
                json!({ "result": "undelivered", "error": error.to_string() }),
                ProcessingStage::Dispatched,
            );
        }

        finish(&request, failed)
    }

    async fn run_handler(
        &self,
        request: &CommandRequest,
        context: CommandContext,
    ) -> Result<CommandReply, CommandError> {
        let Some(handler) = self.registry.get(&request.name) else {
            debug!(
                event_name = "command.unrecognized",
                correlation_id = %request.correlation_id,
                command = %request.name,
                "falling back to help"
            );
            return Ok(CommandReply::message(help_message(
                &request.user_id,
                Some(&request.name),
                &self.registry.help_reference(),
            )));
        };

        let task_request = request.clone();
        let task = tokio::spawn(async move { handler.handle(&task_request, &context).await });
        let abort = task.abort_handle();
        match tokio::time::timeout(self.settings.handler_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!(
                    event_name = "command.panicked",
                    correlation_id = %request.correlation_id,
                    command = %request.name,
                    panicked = join_error.is_panic(),
                    "command task did not complete"
                );
                Err(CommandError::user("The command stopped unexpectedly"))
            }
            Err(_) => {
                abort.abort();
                warn!(
                    event_name = "command.timed_out",
                    correlation_id = %request.correlation_id,
                    command = %request.name,
                    timeout_secs = self.settings.handler_timeout.as_secs(),
                    "command timed out"
                );
                Err(CommandError::user(format!(
                    "The command did not finish within {} seconds",
                    self.settings.handler_timeout.as_secs()
                )))
            }
        }
    }

    async fn deliver(&self, request: &CommandRequest, reply: &CommandReply) -> Result<(), SlackApiError> {
        let posted = self
            .slack
            .post_message(&request.channel_id, request.thread_ts.as_deref(), &reply.message)
            .await?;
        if let Some(attachment) = &reply.attachment {
            let thread_ts = request.thread_ts.as_deref().unwrap_or(&posted.ts);
            self.slack.upload_text_file(&posted.channel, Some(thread_ts), attachment).await?;
        }
        Ok(())
    }

    /// Slash commands answer in the HTTP body; only attachments go through the Web API.
    async fn respond_inline(
        &self,
        request: &CommandRequest,
        reply: CommandReply,
        failed: Option<CommandError>,
    ) -> WebhookResponse {
        if let Some(attachment) = &reply.attachment {
            if let Err(error) =
                self.slack.upload_text_file(&request.channel_id, None, attachment).await
            {
                warn!(
                    event_name = "slack.attachment_failed",
                    correlation_id = %request.correlation_id,
                    error = %error,
                    "attachment upload failed"
                );
            }
        }

        if let Some(error) = failed {
            let mapped = error.into_application();
            if !matches!(mapped, ApplicationError::Command(_)) {
                return failure_from(mapped, &request.correlation_id, ProcessingStage::Responded);
            }
        }

        WebhookResponse::new(
            200,
            json!({
                "response_type": "in_channel",
                "text": reply.message.fallback_text,
                "blocks": reply.message.blocks,
            }),
            ProcessingStage::Responded,
        )
    }
}

fn finish(request: &CommandRequest, failed: Option<CommandError>) -> WebhookResponse {
    if let Some(error) = failed {
        let mapped = error.into_application();
        if !matches!(mapped, ApplicationError::Command(_)) {
            return failure_from(mapped, &request.correlation_id, ProcessingStage::Responded);
        }
    }
    info!(
        event_name = "command.responded",
        correlation_id = %request.correlation_id,
        command = %request.name,
        "reply delivered"
    );
    WebhookResponse::new(200, json!({ "result": "ok" }), ProcessingStage::Responded)
}

fn failure(error: ProcessorError, correlation_id: &str, stage: ProcessingStage) -> WebhookResponse {
    failure_from(ApplicationError::from(error), correlation_id, stage)
}

fn failure_from(error: ApplicationError, correlation_id: &str, stage: ProcessingStage) -> WebhookResponse {
    let interface = error.into_interface(correlation_id);
    WebhookResponse::new(
        interface.status_code(),
        json!({
            "error": interface.user_message(),
            "correlation_id": interface.correlation_id(),
        }),
        stage,
    )
}

fn malformed(error: DecodeError, correlation_id: &str) -> WebhookResponse {
    warn!(
        event_name = "ingress.webhook.malformed",
        correlation_id = %correlation_id,
        error = %error,
        "webhook body could not be decoded"
    );
    failure(ProcessorError::from(error), correlation_id, ProcessingStage::Received)
}
