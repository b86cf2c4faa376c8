use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::blocks::{result_message, ReplyState};
use crate::client::SlackApi;
use crate::commands::{
    CommandContext, CommandError, CommandHandler, CommandHelp, CommandReply, CommandRequest,
};

pub struct HitHandler {
    slack: Arc<dyn SlackApi>,
}

impl HitHandler {
    pub fn new(slack: Arc<dyn SlackApi>) -> Self {
        Self { slack }
    }
}

#[async_trait]
impl CommandHandler for HitHandler {
    fn name(&self) -> &'static str {
        "hit"
    }

    fn help(&self) -> CommandHelp {
        CommandHelp {
            name: "hit",
            description: "Randomly select from the members in the channel",
            synopsis: "@hitter hit <Number> [<Options> ...]",
            options: &["--ex <User>"],
            examples: &["@hitter hit 2", "@hitter hit 3 --ex @userA --ex @userB"],
        }
    }

    async fn handle(
        &self,
        request: &CommandRequest,
        context: &CommandContext,
    ) -> Result<CommandReply, CommandError> {
        let count = requested_count(request.argument.as_deref())?;

        let members = self.slack.conversation_members(&request.channel_id).await?;
        let humans = self.slack.human_user_ids(&members).await?;
        let excluded: HashSet<&str> = request.option("ex").iter().map(String::as_str).collect();
        let pool: Vec<String> =
            humans.into_iter().filter(|id| !excluded.contains(id.as_str())).collect();

        if count > pool.len() {
            return Err(CommandError::user(format!(
                "There are too many choices: {count}/{}",
                pool.len()
            )));
        }

        let picks = pick(pool, count);
        debug!(
            event_name = "command.hit.picked",
            correlation_id = %request.correlation_id,
            members = members.len(),
            excluded = excluded.len(),
            picked = picks.len(),
            "members picked"
        );

        let mut results = String::new();
        for (index, user_id) in picks.iter().enumerate() {
            let place = index + 1;
            results.push_str(&format!(
                ":tada: *[{place}]:*  <@{user_id}> You are the *{}* choice.\n\n",
                ordinal(place)
            ));
        }
        results.push_str("> :zap: _If you have a problem with your choice, please try again._");

        Ok(CommandReply::message(result_message(
            ReplyState::Success,
            &context.header(request),
            &results,
        )))
    }
}

fn requested_count(argument: Option<&str>) -> Result<usize, CommandError> {
    let Some(raw) = argument else {
        return Ok(1);
    };
    match raw.parse::<usize>() {
        Ok(0) => Err(CommandError::user("Choose at least one member")),
        Ok(count) => Ok(count),
        Err(_) => Err(CommandError::user(format!("`{raw}` is not a number of choices"))),
    }
}

/// Drawing the whole pool keeps the channel order.
fn pick(pool: Vec<String>, count: usize) -> Vec<String> {
    if count == pool.len() {
        return pool;
    }
    let mut rng = rand::thread_rng();
    pool.choose_multiple(&mut rng, count).cloned().collect()
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
