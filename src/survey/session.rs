//! Per-user sessions and the callback token that keeps renderings live.
//!
//! Every /start allocates a fresh generation number from a store-wide
//! counter. Rendered buttons carry `generation:stage:option`; an
//! interaction is live only if its generation and stage both match the
//! user's current session. Anything else is stale, so superseded
//! renderings are rejected without keeping any per-rendering state.

use std::collections::HashMap;
use std::str::FromStr;

use crate::catalog::Stage;
use crate::survey::record::AnswerRecord;

/// Who is filling in the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitter {
    /// Numeric chat-platform user id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Optional @username handle.
    pub handle: Option<String>,
}

/// One user's in-progress submission.
#[derive(Debug)]
pub struct Session {
    pub submitter: Submitter,
    pub current: Stage,
    pub record: AnswerRecord,
    pub generation: u64,
}

/// All live sessions, keyed by submitter id. Exactly one session per user.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<i64, Session>,
    next_generation: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh session for `submitter`, replacing any session in
    /// progress. Returns a reference to the new session.
    pub fn begin(&mut self, submitter: Submitter, first: Stage) -> &Session {
        self.next_generation += 1;
        let user_id = submitter.id;
        let replaced = self
            .sessions
            .insert(
                user_id,
                Session {
                    submitter,
                    current: first,
                    record: AnswerRecord::new(),
                    generation: self.next_generation,
                },
            )
            .is_some();
        if replaced {
            tracing::debug!(user_id, "discarded in-progress session on restart");
        }
        &self.sessions[&user_id]
    }

    pub fn get(&self, user_id: i64) -> Option<&Session> {
        self.sessions.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: i64) -> Option<&mut Session> {
        self.sessions.get_mut(&user_id)
    }

    /// Remove a session (completed or cancelled). Returns it if present.
    pub fn remove(&mut self, user_id: i64) -> Option<Session> {
        self.sessions.remove(&user_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// The payload carried by a rendered button.
///
/// Encodes as `generation:stage:option`, comfortably inside Telegram's
/// 64-byte callback-data cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackToken {
    pub generation: u64,
    pub stage: Stage,
    pub option: usize,
}

impl CallbackToken {
    pub fn new(generation: u64, stage: Stage, option: usize) -> Self {
        Self {
            generation,
            stage,
            option,
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.generation, self.stage, self.option)
    }

    /// Decode a button payload. None for anything malformed, which the
    /// caller treats the same as a stale interaction.
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.splitn(3, ':');
        let generation = parts.next()?.parse().ok()?;
        let stage = Stage::from_str(parts.next()?).ok()?;
        let option = parts.next()?.parse().ok()?;
        Some(Self {
            generation,
            stage,
            option,
        })
    }
}
