//! Environment-driven configuration.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Bot configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// Usernames or numeric ids allowed to use the bot. `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Usernames or numeric ids allowed to /broadcast.
    pub admin_users: Vec<String>,
    /// Append-only response log path.
    pub log_path: PathBuf,
    /// Optional JSON catalog override; the built-in form is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Long-poll timeout in seconds for getUpdates.
    pub poll_timeout_secs: u64,
}

impl BotConfig {
    /// Read configuration from the environment.
    ///
    /// `SCOREBOT_TOKEN` is required; everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("SCOREBOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("SCOREBOT_TOKEN".into()))?;

        let allowed_users = list_var("SCOREBOT_ALLOWED_USERS").unwrap_or_else(|| vec!["*".into()]);
        let admin_users = list_var("SCOREBOT_ADMIN_USERS").unwrap_or_default();

        let log_path = std::env::var("SCOREBOT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/responses.csv"));

        let catalog_path = std::env::var("SCOREBOT_CATALOG").ok().map(PathBuf::from);

        let poll_timeout_secs = match std::env::var("SCOREBOT_POLL_TIMEOUT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SCOREBOT_POLL_TIMEOUT".into(),
                message: format!("expected seconds as an integer, got {raw:?}"),
            })?,
            Err(_) => 30,
        };

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            allowed_users,
            admin_users,
            log_path,
            catalog_path,
            poll_timeout_secs,
        })
    }
}

/// Parse a comma-separated env var into a trimmed, non-empty list.
fn list_var(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() { None } else { Some(items) }
}
