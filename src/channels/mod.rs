//! Transport seam between the wizard and the chat platform.

pub mod telegram;

pub use telegram::TelegramTransport;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::survey::Submitter;

/// Opaque handle to a rendered message, used for in-place edits.
pub type MessageHandle = i64;

/// A selectable button: display label plus the callback payload it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub data: String,
}

/// Slash commands understood by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Cancel,
    Broadcast(String),
    Unknown(String),
}

/// One inbound user action, already authenticated by the transport.
#[derive(Debug, Clone)]
pub enum Interaction {
    /// A slash command message.
    Command {
        submitter: Submitter,
        chat_id: i64,
        command: Command,
    },
    /// A plain text message.
    FreeText {
        submitter: Submitter,
        chat_id: i64,
        text: String,
    },
    /// A button press on a rendered prompt.
    OptionChosen {
        submitter: Submitter,
        chat_id: i64,
        handle: MessageHandle,
        callback_id: String,
        data: String,
    },
}

/// Stream of inbound interactions produced by a transport.
pub type InteractionStream = Pin<Box<dyn Stream<Item = Interaction> + Send>>;

/// Chat transport: delivers interactions in, renders prompts out.
///
/// Delivery is serialized per chat by the platform, so consumers may hold
/// plain mutable state across calls.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Begin listening; returns the inbound interaction stream.
    async fn start(&self) -> Result<InteractionStream, ChannelError>;

    /// Render a prompt with selectable options as a new message.
    async fn render_prompt(
        &self,
        chat_id: i64,
        text: &str,
        choices: &[Choice],
    ) -> Result<MessageHandle, ChannelError>;

    /// Replace an existing rendering in place. An empty `choices` slice
    /// removes the buttons.
    async fn replace_rendering(
        &self,
        chat_id: i64,
        handle: MessageHandle,
        text: &str,
        choices: &[Choice],
    ) -> Result<(), ChannelError>;

    /// Send a plain text message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;

    /// Acknowledge a button press, optionally showing a short notice.
    async fn ack_option(
        &self,
        callback_id: &str,
        notice: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Verify the transport account is reachable; returns its identity.
    async fn health_check(&self) -> Result<String, ChannelError>;
}
