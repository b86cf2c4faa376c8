use async_trait::async_trait;

use crate::blocks::help_message;
use crate::commands::{
    CommandContext, CommandError, CommandHandler, CommandHelp, CommandRegistry, CommandReply,
    CommandRequest, HELP_COMMAND,
};

/// Renders the reference of every command registered before it.
pub struct HelpHandler {
    reference: String,
}

impl HelpHandler {
    pub fn from_registry(registry: &CommandRegistry) -> Self {
        Self { reference: registry.help_reference() }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    fn name(&self) -> &'static str {
        HELP_COMMAND
    }

    fn help(&self) -> CommandHelp {
        CommandHelp {
            name: HELP_COMMAND,
            description: "Show this command reference",
            synopsis: "@hitter help",
            options: &[],
            examples: &["@hitter help"],
        }
    }

    async fn handle(
        &self,
        request: &CommandRequest,
        _context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        Ok(CommandReply::message(help_message(&request.user_id, None, &self.reference)))
    }
}
