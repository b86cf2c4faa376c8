//! Slack integration for hitter
//!
//! Everything between an inbound webhook body and the reply posted back:
//! - **Events** (`events`) - Events API envelopes and slash-command forms
//! - **Verification** (`verify`) - verification token and `v0` request signatures
//! - **Commands** (`commands`, `handlers`) - parsing `<@bot> command ...` and the handler registry
//! - **Block Kit** (`blocks`) - reply layouts
//! - **Web API** (`client`) - `chat.postMessage`, file uploads, member lookups
//! - **Processor** (`processor`) - the webhook state machine
//!
//! # Architecture
//!
//! ```text
//! POST / → WebhookProcessor → verify → MutexCoordinator → CommandRegistry → handler
//!                                                                 ↓
//!                                   chat.postMessage ← Block Kit reply
//! ```

pub mod blocks;
pub mod client;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod processor;
pub mod verify;

pub use client::{HttpSlackClient, SlackApi, SlackApiError, TextFile};
pub use commands::{CommandContext, CommandError, CommandHandler, CommandRegistry, CommandRequest};
pub use processor::{
    ProcessingStage, ProcessorSettings, WebhookProcessor, WebhookRequest, WebhookResponse,
};
pub use verify::{RequestVerifier, SignatureHeaders};
