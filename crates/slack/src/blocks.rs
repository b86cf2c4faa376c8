use serde::Serialize;

/// Slack rejects section text above 3000 characters; command echoes are cut well below that.
pub const COMMAND_ECHO_LIMIT: usize = 2000;
pub const COMMAND_ECHO_KEEP: usize = 1950;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Divider,
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// Concatenated section text, handy for assertions and plain-text fallbacks.
    pub fn section_text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Section { text, .. } => Some(text.text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(" "))
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyState {
    Success,
    Failure,
    Help,
}

impl ReplyState {
    fn summary(self) -> &'static str {
        match self {
            Self::Success => ":confetti_ball: I successfully executed the requested command.",
            Self::Failure => ":rotating_light: I failed to execute the requested command.",
            Self::Help => ":thinking_face: Please check the following command help.",
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            Self::Success => "Command executed",
            Self::Failure => "Command failed",
            Self::Help => "Command help",
        }
    }
}

/// Who asked, what they typed, and when. Rendered as the echo section of every reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyHeader {
    pub user_id: String,
    pub command_text: String,
    pub event_time: String,
}

fn summary_text(user_id: &str, state: ReplyState) -> String {
    if user_id.is_empty() {
        state.summary().to_string()
    } else {
        format!("<@{user_id}> {}", state.summary())
    }
}

pub fn truncate_command(text: &str) -> String {
    if text.chars().count() <= COMMAND_ECHO_LIMIT {
        return text.to_string();
    }
    let kept: String = text.chars().take(COMMAND_ECHO_KEEP).collect();
    format!("{kept}...(omitted)")
}

/// Summary, echo and results separated by dividers.
pub fn result_message(state: ReplyState, header: &ReplyHeader, results: &str) -> MessageTemplate {
    MessageBuilder::new(state.fallback())
        .section("hitter.reply.summary.v1", |section| {
            section.mrkdwn(summary_text(&header.user_id, state));
        })
        .divider()
        .section("hitter.reply.command.v1", |section| {
            let echo = truncate_command(&header.command_text).replace("```", "'''");
            section.mrkdwn(format!("*Command:*\n```{echo}```\n:clock8: {}", header.event_time));
        })
        .divider()
        .section("hitter.reply.results.v1", |section| {
            section.mrkdwn(format!("*Results:*\n{results}"));
        })
        .divider()
        .build()
}

pub fn error_message(header: &ReplyHeader, message: &str) -> MessageTemplate {
    result_message(
        ReplyState::Failure,
        header,
        &format!(
            ":name_badge: Command execution failed. *[{message}]*\n> :warning: _Be sure to check the help if you want to rerun the command._"
        ),
    )
}

/// Help layout has no echo section, only the summary and the command reference.
pub fn help_message(user_id: &str, unrecognized: Option<&str>, reference: &str) -> MessageTemplate {
    let mut builder = MessageBuilder::new(ReplyState::Help.fallback()).section(
        "hitter.reply.summary.v1",
        |section| {
            section.mrkdwn(summary_text(user_id, ReplyState::Help));
        },
    );
    if let Some(command) = unrecognized {
        builder = builder.context("hitter.reply.unrecognized.v1", |context| {
            context.mrkdwn(format!(":question: Unrecognized command `{command}`."));
        });
    }
    builder
        .divider()
        .section("hitter.reply.help.v1", |section| {
            section.mrkdwn(format!(
                "*Commands:*\n{reference}\n> :information_source: _See the documentation if you need more details._"
            ));
        })
        .divider()
        .build()
}
