//! Event loop — consumes transport interactions and drives the wizard.
//!
//! Runs as a single task, so sessions are never touched concurrently and
//! the engine needs no locking. Recoverable errors become fixed
//! user-visible replies; a response-log failure ends the loop.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{Command, Interaction, MessageHandle, Transport};
use crate::error::{Error, SurveyError};
use crate::survey::{CallbackToken, Engine, Reply, Submitter};

const STALE_NOTICE: &str = "This form is no longer active. Send /start to begin again.";
const TEXT_GUIDANCE: &str =
    "I wasn't expecting a message right now. Send /start to begin a scorecard, or use the buttons above.";
const HELP_TEXT: &str = "/start — begin a new scorecard\n/cancel — discard the scorecard in progress\n/help — show this message";

/// Owns the engine and processes the interaction stream one action at a
/// time.
pub struct Dispatcher {
    engine: Engine,
    transport: Arc<dyn Transport>,
    admin_users: Vec<String>,
    /// Every chat that has ever interacted; the /broadcast audience.
    roster: HashSet<i64>,
}

impl Dispatcher {
    pub fn new(engine: Engine, transport: Arc<dyn Transport>, admin_users: Vec<String>) -> Self {
        Self {
            engine,
            transport,
            admin_users,
            roster: HashSet::new(),
        }
    }

    /// Consume the interaction stream until it ends or a fatal error
    /// occurs.
    pub async fn run(mut self) -> Result<(), Error> {
        let mut stream = self.transport.start().await?;
        while let Some(interaction) = stream.next().await {
            self.handle(interaction).await?;
        }
        tracing::info!("interaction stream ended");
        Ok(())
    }

    async fn handle(&mut self, interaction: Interaction) -> Result<(), Error> {
        match interaction {
            Interaction::Command {
                submitter,
                chat_id,
                command,
            } => {
                self.roster.insert(chat_id);
                self.handle_command(submitter, chat_id, command).await
            }
            Interaction::FreeText {
                submitter,
                chat_id,
                text,
            } => {
                self.roster.insert(chat_id);
                self.handle_text(submitter, chat_id, &text).await;
                Ok(())
            }
            Interaction::OptionChosen {
                submitter,
                chat_id,
                handle,
                callback_id,
                data,
            } => {
                self.roster.insert(chat_id);
                self.handle_option(submitter, chat_id, handle, &callback_id, &data)
                    .await
            }
        }
    }

    async fn handle_command(
        &mut self,
        submitter: Submitter,
        chat_id: i64,
        command: Command,
    ) -> Result<(), Error> {
        match command {
            Command::Start => {
                let reply = self.engine.start(submitter);
                self.render_new(chat_id, reply).await;
            }
            Command::Help => self.send(chat_id, HELP_TEXT).await,
            Command::Cancel => {
                if self.engine.cancel(submitter.id) {
                    self.send(chat_id, "All clear!").await;
                } else {
                    self.send(chat_id, "Nothing to cancel. Send /start to begin.").await;
                }
            }
            Command::Broadcast(text) => {
                if !self.is_admin(&submitter) {
                    tracing::warn!(user_id = submitter.id, "broadcast denied");
                    self.send(chat_id, "You are not allowed to broadcast.").await;
                } else if text.is_empty() {
                    self.send(chat_id, "Usage: /broadcast <message>").await;
                } else {
                    let delivered = self.broadcast(&text).await;
                    self.send(chat_id, &format!("Broadcast sent to {delivered} chat(s)."))
                        .await;
                }
            }
            Command::Unknown(word) => {
                tracing::debug!(command = %word, "unknown command");
                self.send(chat_id, HELP_TEXT).await;
            }
        }
        Ok(())
    }

    async fn handle_text(&mut self, submitter: Submitter, chat_id: i64, text: &str) {
        match self.engine.free_text(submitter.id, text) {
            Ok(reply) => self.render_new(chat_id, reply).await,
            Err(SurveyError::UnexpectedText) => self.send(chat_id, TEXT_GUIDANCE).await,
            Err(e) => tracing::warn!(user_id = submitter.id, "free text rejected: {e}"),
        }
    }

    async fn handle_option(
        &mut self,
        submitter: Submitter,
        chat_id: i64,
        handle: MessageHandle,
        callback_id: &str,
        data: &str,
    ) -> Result<(), Error> {
        let Some(token) = CallbackToken::parse(data) else {
            self.ack(callback_id, Some(STALE_NOTICE)).await;
            return Ok(());
        };

        match self.engine.select(submitter.id, &token).await {
            Ok(reply) => {
                self.ack(callback_id, None).await;
                self.render_in_place(chat_id, handle, reply).await;
                Ok(())
            }
            Err(SurveyError::Sink(e)) => {
                tracing::error!("response log append failed: {e}");
                Err(e.into())
            }
            Err(_) => {
                self.ack(callback_id, Some(STALE_NOTICE)).await;
                Ok(())
            }
        }
    }

    // ── Rendering ───────────────────────────────────────────────────

    /// Render an engine reply as a fresh message.
    async fn render_new(&self, chat_id: i64, reply: Reply) {
        let result = match reply {
            Reply::Prompt { text, choices } => self
                .transport
                .render_prompt(chat_id, &text, &choices)
                .await
                .map(|_| ()),
            Reply::Confirmed { text } | Reply::Discarded { text } => {
                self.transport.send_text(chat_id, &text).await
            }
        };
        if let Err(e) = result {
            tracing::warn!(chat_id, "failed to render prompt: {e}");
        }
    }

    /// Render an engine reply by editing the pressed message. Terminal
    /// replies keep the text and drop the buttons.
    async fn render_in_place(&self, chat_id: i64, handle: MessageHandle, reply: Reply) {
        let (text, choices) = match reply {
            Reply::Prompt { text, choices } => (text, choices),
            Reply::Confirmed { text } | Reply::Discarded { text } => (text, Vec::new()),
        };
        if let Err(e) = self
            .transport
            .replace_rendering(chat_id, handle, &text, &choices)
            .await
        {
            tracing::warn!(chat_id, handle, "failed to replace rendering: {e}");
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            tracing::warn!(chat_id, "failed to send message: {e}");
        }
    }

    async fn ack(&self, callback_id: &str, notice: Option<&str>) {
        if let Err(e) = self.transport.ack_option(callback_id, notice).await {
            tracing::warn!(callback_id, "failed to answer callback: {e}");
        }
    }

    // ── Broadcast ───────────────────────────────────────────────────

    fn is_admin(&self, submitter: &Submitter) -> bool {
        let id = submitter.id.to_string();
        self.admin_users.iter().any(|u| {
            u == "*" || u == &id || submitter.handle.as_deref() == Some(u.as_str())
        })
    }

    /// Send `text` to every chat in the roster; returns the number of
    /// successful deliveries.
    async fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;
        for &chat_id in &self.roster {
            match self.transport.send_text(chat_id, text).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(chat_id, "broadcast delivery failed: {e}"),
            }
        }
        tracing::info!(delivered, total = self.roster.len(), "broadcast complete");
        delivered
    }
}
