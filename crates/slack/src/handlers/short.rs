use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hitter_core::shorturl::ShortUrlService;

use crate::blocks::{result_message, ReplyState};
use crate::commands::{
    unwrap_token, CommandContext, CommandError, CommandHandler, CommandHelp, CommandReply,
    CommandRequest,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct ShortHandler {
    service: Arc<ShortUrlService>,
    default_ttl_days: u32,
}

impl ShortHandler {
    pub fn new(service: Arc<ShortUrlService>, default_ttl_days: u32) -> Self {
        Self { service, default_ttl_days }
    }

    fn ttl(&self, request: &CommandRequest) -> Result<Duration, CommandError> {
        let Some(raw) = request.first_option("ttl") else {
            return Ok(DAY * self.default_ttl_days.max(1));
        };
        match raw.parse::<u32>() {
            Ok(days) if days > 0 => Ok(DAY * days),
            _ => Err(CommandError::user(format!("`--ttl` expects a number of days, got `{raw}`"))),
        }
    }
}

#[async_trait]
impl CommandHandler for ShortHandler {
    fn name(&self) -> &'static str {
        "short"
    }

    fn help(&self) -> CommandHelp {
        CommandHelp {
            name: "short",
            description: "Generate a shortened URL",
            synopsis: "@hitter short <URL> <Options>",
            options: &["--ttl <Expiry Days>"],
            examples: &["@hitter short https://www.rust-lang.org/", "@hitter short https://www.rust-lang.org/ --ttl 7"],
        }
    }

    async fn handle(
        &self,
        request: &CommandRequest,
        context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        // Rich-text blocks carry the exact URL; the mrkdwn text may hold `<url|label>`.
        let long_url = request
            .link
            .clone()
            .or_else(|| request.argument.as_deref().map(unwrap_token))
            .ok_or_else(|| CommandError::user("Enter the URL to shorten"))?;
        let ttl = self.ttl(request)?;

        let link = self.service.shorten(&long_url, ttl).await?;

        let results = format!(
            ":link: {}\n\n:clock930: {}\n\n> :globe_with_meridians: _If you want to change the expiry date, please try again._",
            link.short_url,
            context.format_time(link.expires_at)
        );
        Ok(CommandReply::message(result_message(
            ReplyState::Success,
            &context.header(request),
            &results,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use hitter_core::shorturl::{Resolution, ShortUrlService};
    use hitter_core::store::InMemoryExpiringStore;

    use super::ShortHandler;
    use crate::commands::{CommandContext, CommandError, CommandHandler, CommandRequest};
    use crate::events::SlashCommandPayload;

    fn request(text: &str) -> CommandRequest {
        let payload = SlashCommandPayload {
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            command: "/hitter".to_string(),
            text: text.to_string(),
            trigger_id: "T1".to_string(),
            ..SlashCommandPayload::default()
        };
        CommandRequest::from_slash_command(&payload, Utc::now())
    }

    fn handler() -> (ShortHandler, Arc<ShortUrlService>) {
        let store = Arc::new(InMemoryExpiringStore::new("hitter-url"));
        let service = Arc::new(ShortUrlService::new(store, "https://hit.example.com"));
        (ShortHandler::new(service.clone(), 1), service)
    }

    #[tokio::test]
    async fn minted_link_resolves_to_target() {
        let (handler, service) = handler();
        let reply = handler
            .handle(&request("short https://www.rust-lang.org/learn"), &CommandContext::default())
            .await
            .expect("short link");

        let text = reply.message.section_text();
        let short_url = text
            .split_whitespace()
            .find(|word| word.starts_with("https://hit.example.com/"))
            .expect("short url in reply");
        let id = short_url.trim_start_matches("https://hit.example.com/");
        match service.resolve(id).await.expect("resolve") {
            Resolution::Found(record) => {
                assert_eq!(record.long_url, "https://www.rust-lang.org/learn");
            }
            Resolution::NotFound => panic!("minted id should resolve"),
        }
    }

    #[tokio::test]
    async fn ttl_option_must_be_positive_days() {
        let (handler, _) = handler();
        let error = handler
            .handle(&request("short https://www.rust-lang.org/ --ttl zero"), &CommandContext::default())
            .await
            .expect_err("bad ttl");
        assert!(matches!(error, CommandError::User(message) if message.contains("--ttl")));
    }

    #[tokio::test]
    async fn missing_url_is_a_user_error() {
        let (handler, _) = handler();
        let error =
            handler.handle(&request("short"), &CommandContext::default()).await.expect_err("no url");
        assert_eq!(error, CommandError::user("Enter the URL to shorten"));
    }
}
