use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hitter_core::domain::object::StagedObjectGrant;
use hitter_core::staging::ObjectStaging;
use tracing::info;

use crate::blocks::{result_message, ReplyState};
use crate::client::{SlackApi, TextFile};
use crate::commands::{
    CommandContext, CommandError, CommandHandler, CommandHelp, CommandReply, CommandRequest,
};

/// Links can not outlive the two-day object retention.
pub const MAX_LINK_MINUTES: u64 = 2880;
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub struct LinkHandler {
    slack: Arc<dyn SlackApi>,
    staging: Arc<ObjectStaging>,
    default_lifetime: Duration,
    max_object_bytes: u64,
}

impl LinkHandler {
    pub fn new(
        slack: Arc<dyn SlackApi>,
        staging: Arc<ObjectStaging>,
        default_lifetime: Duration,
        max_object_bytes: u64,
    ) -> Self {
        Self { slack, staging, default_lifetime, max_object_bytes }
    }

    fn lifetime(&self, argument: Option<&str>) -> Result<Duration, CommandError> {
        let Some(raw) = argument else {
            return Ok(self.default_lifetime);
        };
        match raw.parse::<u64>() {
            Ok(minutes) if (1..=MAX_LINK_MINUTES).contains(&minutes) => {
                Ok(Duration::from_secs(minutes * 60))
            }
            _ => Err(CommandError::user(format!(
                "Expiry minutes must be between 1 and {MAX_LINK_MINUTES}, got `{raw}`"
            ))),
        }
    }
}

#[async_trait]
impl CommandHandler for LinkHandler {
    fn name(&self) -> &'static str {
        "link"
    }

    fn help(&self) -> CommandHelp {
        CommandHelp {
            name: "link",
            description: "Stage the attached files and generate pre-signed URLs",
            synopsis: "@hitter link <Expiry Minutes> <Files>",
            options: &[],
            examples: &["@hitter link <file1>", "@hitter link 15 <fileA, fileB>"],
        }
    }

    async fn handle(
        &self,
        request: &CommandRequest,
        context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        let lifetime = self.lifetime(request.argument.as_deref())?;
        if request.files.is_empty() {
            return Err(CommandError::user("Attach at least one file to the link command"));
        }

        let mut grants = Vec::with_capacity(request.files.len());
        for file in &request.files {
            let bytes = self.slack.download_file(&file.download_url, self.max_object_bytes).await?;
            let content_type = file.mimetype.as_deref().unwrap_or(FALLBACK_CONTENT_TYPE);
            grants.push(self.staging.stage(&file.name, content_type, bytes, lifetime).await?);
        }
        info!(
            event_name = "command.link.staged",
            correlation_id = %request.correlation_id,
            objects = grants.len(),
            bucket = %self.staging.bucket(),
            "attachments staged"
        );

        let count = if grants.len() > 1 { format!("{} files ", grants.len()) } else { String::new() };
        let results = format!(
            ":linked_paperclips: {count}Object information and Pre-Signed URL\n\n`Please check the file attached to the thread for details of the link command results.`\n\n> :satellite_antenna: _If you want to change the expiry date, please try again._"
        );
        let attachment = TextFile {
            file_name: format!("{}_link_command_result.text", context.file_stamp(request.event_time)),
            content: grants
                .iter()
                .enumerate()
                .map(|(index, grant)| describe_grant(index + 1, grant, context))
                .collect(),
            comment: ":linked_paperclips: This file is the result of the link command.".to_string(),
        };

        Ok(CommandReply::message(result_message(
            ReplyState::Success,
            &context.header(request),
            &results,
        ))
        .with_attachment(attachment))
    }
}

fn describe_grant(number: usize, grant: &StagedObjectGrant, context: &CommandContext) -> String {
    format!(
        "• [{number}]: {name}\n\n\nObject: \n • bucket: \n      {bucket}\n\n • key: \n      {key}\n\n • size: \n      {size} bytes\n\n • expiry date: \n      {object_expiry}\n\n\nPre-Signed URL: \n • URL: \n      {url}\n\n • expiry date: \n      {url_expiry}\n\n\n\n",
        name = grant.file_name,
        bucket = grant.bucket,
        key = grant.key,
        size = grant.size_bytes,
        object_expiry = context.format_time(grant.object_expires_at),
        url = grant.url,
        url_expiry = context.format_time(grant.url_expires_at),
    )
}
