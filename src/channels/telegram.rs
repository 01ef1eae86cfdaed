//! Telegram transport — long-polls the Bot API for updates.
//!
//! Raw Bot API over reqwest: messages and callback queries in, inline
//! keyboards out.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{
    Choice, Command, Interaction, InteractionStream, MessageHandle, Transport,
};
use crate::error::ChannelError;
use crate::survey::Submitter;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>, poll_timeout_secs: u64) -> Self {
        Self {
            bot_token,
            allowed_users,
            poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method and return its `result` payload.
    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ChannelError> {
        let send_failed = |reason: String| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: {reason}"),
        };

        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| send_failed(format!("bad response ({status}): {e}")))?;

        if !data.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            let description = data
                .get("description")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no description");
            return Err(send_failed(format!("{status}: {description}")));
        }

        Ok(data.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

// ── Transport trait implementation ──────────────────────────────────

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<InteractionStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let poll_timeout_secs = self.poll_timeout_secs;
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram transport listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout_secs,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        // Advance offset past this update
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        let Some(interaction) = parse_update(update) else {
                            continue;
                        };

                        let submitter = interaction_submitter(&interaction);
                        if !submitter_allowed(&allowed_users, submitter) {
                            tracing::warn!(
                                user_id = submitter.id,
                                handle = submitter.handle.as_deref().unwrap_or("unknown"),
                                "Telegram: ignoring update from unauthorized user"
                            );
                            continue;
                        }

                        if tx.send(interaction).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn render_prompt(
        &self,
        chat_id: i64,
        text: &str,
        choices: &[Choice],
    ) -> Result<MessageHandle, ChannelError> {
        // Overlong prompts carry user free text; everything before the
        // last chunk goes out plain, the keyboard rides on the last.
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let (last, rest) = chunks.split_last().expect("split_message is non-empty");
        for chunk in rest {
            self.send_text(chat_id, chunk).await?;
        }

        let result = self
            .call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": last,
                    "reply_markup": keyboard(choices),
                }),
            )
            .await?;

        result
            .get("message_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| {
                ChannelError::InvalidMessage("sendMessage result without message_id".into())
            })
    }

    async fn replace_rendering(
        &self,
        chat_id: i64,
        handle: MessageHandle,
        text: &str,
        choices: &[Choice],
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let (last, rest) = chunks.split_last().expect("split_message is non-empty");
        for chunk in rest {
            self.send_text(chat_id, chunk).await?;
        }

        self.call(
            "editMessageText",
            serde_json::json!({
                "chat_id": chat_id,
                "message_id": handle,
                "text": last,
                "reply_markup": keyboard(choices),
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": chunk,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn ack_option(
        &self,
        callback_id: &str,
        notice: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = notice {
            body["text"] = serde_json::Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", body).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<String, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            });
        }

        let data: serde_json::Value =
            resp.json().await.map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe parse error: {e}"),
            })?;

        Ok(data
            .get("result")
            .and_then(|r| r.get("username"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build the inline keyboard payload, one button per row. An empty
/// choice list removes the keyboard.
fn keyboard(choices: &[Choice]) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = choices
        .iter()
        .map(|c| serde_json::json!([{ "text": c.label, "callback_data": c.data }]))
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Parse one getUpdates entry into an interaction. None for anything
/// the wizard has no use for (joins, edits, media, …).
fn parse_update(update: &serde_json::Value) -> Option<Interaction> {
    if let Some(callback) = update.get("callback_query") {
        let submitter = parse_submitter(callback.get("from")?)?;
        let message = callback.get("message")?;
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)?;
        let handle = message
            .get("message_id")
            .and_then(serde_json::Value::as_i64)?;
        let callback_id = callback.get("id").and_then(serde_json::Value::as_str)?;
        let data = callback.get("data").and_then(serde_json::Value::as_str)?;

        return Some(Interaction::OptionChosen {
            submitter,
            chat_id,
            handle,
            callback_id: callback_id.to_string(),
            data: data.to_string(),
        });
    }

    let message = update.get("message")?;
    let submitter = parse_submitter(message.get("from")?)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;

    match parse_command(text) {
        Some(command) => Some(Interaction::Command {
            submitter,
            chat_id,
            command,
        }),
        None => Some(Interaction::FreeText {
            submitter,
            chat_id,
            text: text.to_string(),
        }),
    }
}

/// Extract submitter identity from a Telegram `from` object.
fn parse_submitter(from: &serde_json::Value) -> Option<Submitter> {
    let id = from.get("id").and_then(serde_json::Value::as_i64)?;
    let handle = from
        .get("username")
        .and_then(serde_json::Value::as_str)
        .map(String::from);
    let name = from
        .get("first_name")
        .and_then(serde_json::Value::as_str)
        .map(String::from)
        .or_else(|| handle.clone())
        .unwrap_or_else(|| "unknown".to_string());
    Some(Submitter { id, name, handle })
}

/// Parse a slash command. None for plain text. A `@botname` suffix on
/// the command word is stripped.
fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }
    let (word, rest) = match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    };
    let word = word.split('@').next().unwrap_or(word);

    Some(match word {
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/cancel" => Command::Cancel,
        "/broadcast" => Command::Broadcast(rest.to_string()),
        other => Command::Unknown(other.to_string()),
    })
}

/// Check a submitter against the allowlist by handle and numeric id.
fn submitter_allowed(allowed_users: &[String], submitter: &Submitter) -> bool {
    let id = submitter.id.to_string();
    allowed_users.iter().any(|u| {
        u == "*" || u == &id || submitter.handle.as_deref() == Some(u.as_str())
    })
}

fn interaction_submitter(interaction: &Interaction) -> &Submitter {
    match interaction {
        Interaction::Command { submitter, .. }
        | Interaction::FreeText { submitter, .. }
        | Interaction::OptionChosen { submitter, .. } => submitter,
    }
}

/// Split a message into chunks that fit Telegram's message limit.
/// Tries to split on newlines, then spaces, then hard-cuts on the last
/// char boundary inside the limit. Prompts carry raw user free text, so
/// every cut has to stay off multi-byte codepoints.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let limit = floor_char_boundary(remaining, max_len);
        // A first char wider than the limit still has to go somewhere.
        let limit = if limit == 0 {
            remaining.chars().next().map_or(max_len, char::len_utf8)
        } else {
            limit
        };

        // Find a good split point
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Largest index no greater than `max` that lies on a char boundary.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    let mut index = max.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

// ── Tests ───────────────────────────────────────────────────────────
