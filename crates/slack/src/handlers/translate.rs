use std::sync::Arc;

use async_trait::async_trait;
use hitter_core::translate::{LanguagePair, Translator};

use crate::blocks::{result_message, ReplyState};
use crate::client::TextFile;
use crate::commands::{
    CommandContext, CommandError, CommandHandler, CommandHelp, CommandReply, CommandRequest,
};

pub struct TranslateHandler {
    translator: Arc<dyn Translator>,
    languages: LanguagePair,
}

impl TranslateHandler {
    pub fn new(translator: Arc<dyn Translator>, languages: LanguagePair) -> Self {
        Self { translator, languages }
    }
}

#[async_trait]
impl CommandHandler for TranslateHandler {
    fn name(&self) -> &'static str {
        "translate"
    }

    fn help(&self) -> CommandHelp {
        CommandHelp {
            name: "translate",
            description: "Translates the input text",
            synopsis: "@hitter translate <Text>",
            options: &[],
            examples: &[
                "@hitter translate Rust is a language empowering everyone to build reliable software",
                "@hitter translate Rust は信頼性の高いソフトウェアを誰もが構築できる言語です",
            ],
        }
    }

    async fn handle(
        &self,
        request: &CommandRequest,
        context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        let source_text = request.remainder.trim();
        if source_text.is_empty() {
            return Err(CommandError::user("Enter the text to translate"));
        }

        let source = self.translator.detect_language(source_text).await?;
        let target = self.languages.target_for(&source).to_string();
        let translated = self.translator.translate(source_text, &source, &target).await?;

        let results = format!(
            ":dart: Translated the text from *[{source}]* to *[{target}]*\n\n`Please check the file attached to the thread for details of the translation command results.`\n\n> :zap: _If there is a problem with the translation, please check the input text and try again._"
        );
        let attachment = TextFile {
            file_name: format!(
                "{}_translate_command_result.text",
                context.file_stamp(request.event_time)
            ),
            content: format!(
                "• Source text: [{source}]\n\n{source_text}\n\n\n\n• Translated text: [{target}]\n\n{translated}\n"
            ),
            comment: ":dart: This file is the result of the translation command.".to_string(),
        };

        Ok(CommandReply::message(result_message(
            ReplyState::Success,
            &context.header(request),
            &results,
        ))
        .with_attachment(attachment))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use hitter_core::translate::{
        LanguagePair, TranslateError, Translator, UnconfiguredTranslator,
    };

    use super::TranslateHandler;
    use crate::commands::{CommandContext, CommandError, CommandHandler, CommandRequest};
    use crate::events::SlashCommandPayload;

    struct FixedTranslator;

    #[async_trait]
    impl Translator for FixedTranslator {
        async fn detect_language(&self, _text: &str) -> Result<String, TranslateError> {
            Ok("en".to_string())
        }

        async fn translate(
            &self,
            _text: &str,
            source: &str,
            target: &str,
        ) -> Result<String, TranslateError> {
            Ok(format!("{source}->{target}"))
        }
    }

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

    #[tokio::test]
    async fn english_goes_to_the_primary_language() {
        let handler = TranslateHandler::new(Arc::new(FixedTranslator), LanguagePair::new("ja", "en"));
        let reply = handler
            .handle(&request("translate good morning"), &CommandContext::default())
            .await
            .expect("translated");

        assert!(reply.message.section_text().contains("*[en]* to *[ja]*"));
        let attachment = reply.attachment.expect("attachment");
        assert!(attachment.content.contains("good morning"));
        assert!(attachment.content.contains("en->ja"));
        assert!(attachment.file_name.ends_with("_translate_command_result.text"));
    }

    #[tokio::test]
    async fn unconfigured_backend_is_reported_to_the_user() {
        let handler =
            TranslateHandler::new(Arc::new(UnconfiguredTranslator), LanguagePair::new("ja", "en"));
        let error = handler
            .handle(&request("translate hello"), &CommandContext::default())
            .await
            .expect_err("not configured");
        assert_eq!(error, CommandError::user("translation is not configured"));
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let handler = TranslateHandler::new(Arc::new(FixedTranslator), LanguagePair::new("ja", "en"));
        let error =
            handler.handle(&request("translate"), &CommandContext::default()).await.expect_err("blank");
        assert!(matches!(error, CommandError::User(_)));
    }
}
