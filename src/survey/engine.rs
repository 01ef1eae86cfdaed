//! Wizard engine — walks one session through the question catalog.
//!
//! State machine over the catalog's stages plus two terminal outcomes
//! (confirmed, discarded). All stage-specific behavior dispatches once
//! on the `Stage` variant.

use std::sync::Arc;

use crate::catalog::{Catalog, Stage};
use crate::channels::Choice;
use crate::error::SurveyError;
use crate::sink::ResponseSink;
use crate::survey::record::{AnswerRecord, NO_FEEDBACK_SENTINEL};
use crate::survey::session::{CallbackToken, Session, SessionStore, Submitter};

/// What the dispatcher should render after an engine step.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The next question: text plus selectable options.
    Prompt { text: String, choices: Vec<Choice> },
    /// The submission was committed to the response log.
    Confirmed { text: String },
    /// The submission was dropped without persistence.
    Discarded { text: String },
}

/// Drives per-user sessions through the catalog and commits completed
/// records to the response sink.
pub struct Engine {
    catalog: Arc<Catalog>,
    sink: Arc<dyn ResponseSink>,
    sessions: SessionStore,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            catalog,
            sink,
            sessions: SessionStore::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Begin a fresh scorecard for `submitter`, unconditionally discarding
    /// any session already in progress for them.
    pub fn start(&mut self, submitter: Submitter) -> Reply {
        let user_id = submitter.id;
        tracing::info!(user_id, "starting scorecard");
        let first = self.catalog.first_stage();
        self.sessions.begin(submitter, first);
        let session = self.sessions.get(user_id).expect("session just created");
        self.render_stage(session)
    }

    /// Discard the in-progress session, if any. Returns whether one existed.
    pub fn cancel(&mut self, user_id: i64) -> bool {
        let existed = self.sessions.remove(user_id).is_some();
        if existed {
            tracing::info!(user_id, "scorecard cancelled");
        }
        existed
    }

    /// Apply a button press.
    ///
    /// The token must match the user's live session: same generation, same
    /// current stage, and an option index that resolves against the
    /// catalog. Everything else is a stale interaction and mutates nothing.
    pub async fn select(
        &mut self,
        user_id: i64,
        token: &CallbackToken,
    ) -> Result<Reply, SurveyError> {
        let session = self.sessions.get(user_id).ok_or(SurveyError::Stale)?;
        if token.generation != session.generation || token.stage != session.current {
            return Err(SurveyError::Stale);
        }
        let stage = session.current;
        let value = self
            .resolve_value(stage, token.option)
            .ok_or(SurveyError::Stale)?;

        tracing::debug!(user_id, %stage, value = %value, "answer recorded");

        match stage {
            Stage::Confirmation => {
                let affirmed = token.option == 0;
                let session = self
                    .sessions
                    .get_mut(user_id)
                    .expect("session checked above");
                session.record.insert(stage, value);

                let session = self
                    .sessions
                    .remove(user_id)
                    .expect("session checked above");
                if affirmed {
                    self.sink
                        .commit(&session.record, &session.submitter)
                        .await?;
                    tracing::info!(user_id, "scorecard committed");
                    let text = format!("{}\nDone and saved.", self.summary(&session.record));
                    Ok(Reply::Confirmed { text })
                } else {
                    tracing::info!(user_id, "scorecard discarded");
                    Ok(Reply::Discarded {
                        text: "Answer discarded.".into(),
                    })
                }
            }
            _ => {
                let next = self
                    .catalog
                    .next_stage(stage)
                    .expect("non-terminal stage has a successor");
                let session = self
                    .sessions
                    .get_mut(user_id)
                    .expect("session checked above");
                session.record.insert(stage, value);
                session.current = next;
                let session = self.sessions.get(user_id).expect("session still live");
                Ok(self.render_stage(session))
            }
        }
    }

    /// Apply a plain text message. Valid only at the feedback stage.
    pub fn free_text(&mut self, user_id: i64, text: &str) -> Result<Reply, SurveyError> {
        let session = self
            .sessions
            .get_mut(user_id)
            .ok_or(SurveyError::UnexpectedText)?;
        if session.current != Stage::Feedback {
            return Err(SurveyError::UnexpectedText);
        }
        session
            .record
            .insert(Stage::Feedback, text.trim().to_string());
        session.current = Stage::Confirmation;
        tracing::debug!(user_id, "feedback recorded");
        let session = self.sessions.get(user_id).expect("session still live");
        Ok(self.render_stage(session))
    }

    /// Resolve an option index to its answer string for the given stage.
    fn resolve_value(&self, stage: Stage, option: usize) -> Option<String> {
        match stage {
            Stage::Feedback => (option == 0).then(|| NO_FEEDBACK_SENTINEL.to_string()),
            _ => self
                .catalog
                .options_for(stage)
                .and_then(|opts| opts.get(option))
                .cloned(),
        }
    }

    /// Render the session's current stage: running summary, prompt, options.
    fn render_stage(&self, session: &Session) -> Reply {
        let stage = session.current;
        let summary = self.summary(&session.record);
        let text = if summary.is_empty() {
            self.catalog.prompt_for(stage).to_string()
        } else {
            format!("{summary}\n{}", self.catalog.prompt_for(stage))
        };
        let choices = self.choices_for(session.generation, stage);
        Reply::Prompt { text, choices }
    }

    /// One `label: value` line per answered stage, in catalog order.
    /// Confirmation never appears; feedback is skipped when it holds the
    /// "no answer" sentinel.
    fn summary(&self, record: &AnswerRecord) -> String {
        let mut lines = Vec::new();
        for stage in self.catalog.answer_stages() {
            let Some(value) = record.get(stage) else {
                continue;
            };
            if stage == Stage::Feedback && value == NO_FEEDBACK_SENTINEL {
                continue;
            }
            lines.push(format!("{}: {}", self.catalog.label_for(stage), value));
        }
        lines.join("\n")
    }

    /// Buttons for a stage, each carrying a live callback token.
    fn choices_for(&self, generation: u64, stage: Stage) -> Vec<Choice> {
        match stage {
            Stage::Feedback => vec![Choice {
                label: self.catalog.feedback.skip_option.clone(),
                data: CallbackToken::new(generation, stage, 0).encode(),
            }],
            _ => self
                .catalog
                .options_for(stage)
                .expect("selectable stage has an option list")
                .iter()
                .enumerate()
                .map(|(i, label)| Choice {
                    label: label.clone(),
                    data: CallbackToken::new(generation, stage, i).encode(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn submitter(id: i64) -> Submitter {
        Submitter {
            id,
            name: "Alice".into(),
            handle: Some("alice".into()),
        }
    }

    fn engine() -> (Engine, Arc<MemorySink>) {
        let catalog = Arc::new(Catalog::builtin());
        let sink = Arc::new(MemorySink::new(Arc::clone(&catalog)));
        let engine = Engine::new(catalog, Arc::clone(&sink) as Arc<dyn ResponseSink>);
        (engine, sink)
    }

    fn prompt(reply: &Reply) -> (&str, &[Choice]) {
        match reply {
            Reply::Prompt { text, choices } => (text, choices),
            other => panic!("expected prompt, got {other:?}"),
        }
    }

    /// Press the button at `index` on the given prompt reply.
    async fn press(engine: &mut Engine, user_id: i64, reply: &Reply, index: usize) -> Reply {
        let (_, choices) = prompt(reply);
        let token = CallbackToken::parse(&choices[index].data).expect("valid token");
        engine.select(user_id, &token).await.expect("live selection")
    }

    #[tokio::test]
    async fn start_renders_first_stage_without_summary() {
        let (mut engine, _) = engine();
        let reply = engine.start(submitter(1));
        let (text, choices) = prompt(&reply);
        assert_eq!(text, "Choose round:");
        assert_eq!(choices.len(), 3);
        assert_eq!(choices[1].label, "2");
    }

    #[tokio::test]
    async fn each_select_records_one_answer_and_advances() {
        let (mut engine, _) = engine();
        let mut reply = engine.start(submitter(1));

        // Round, Judge, Team, Place: four selects, four answers.
        for expected_len in 1..=4 {
            reply = press(&mut engine, 1, &reply, 0).await;
            let session = engine.sessions.get(1).unwrap();
            assert_eq!(session.record.len(), expected_len);
        }
        let session = engine.sessions.get(1).unwrap();
        assert_eq!(session.current, Stage::Rating(0));
        assert_eq!(
            engine.catalog.next_stage(Stage::Place),
            Some(session.current)
        );
    }

    #[tokio::test]
    async fn summary_accumulates_in_catalog_order() {
        let (mut engine, _) = engine();
        let reply = engine.start(submitter(1));
        let reply = press(&mut engine, 1, &reply, 1).await; // Round = 2
        let reply = press(&mut engine, 1, &reply, 0).await; // Judge = Judge 1
        let (text, _) = prompt(&reply);
        assert_eq!(text, "Round: 2\nJudge: Judge 1\nChoose team:");
    }

    #[tokio::test]
    async fn stale_generation_is_rejected_without_mutation() {
        let (mut engine, _) = engine();
        let first = engine.start(submitter(1));
        let (_, first_choices) = prompt(&first);
        let old = CallbackToken::parse(&first_choices[0].data).unwrap();

        // Restart: the old rendering's generation is dead.
        engine.start(submitter(1));
        let err = engine.select(1, &old).await.unwrap_err();
        assert!(matches!(err, SurveyError::Stale));
        assert!(engine.sessions.get(1).unwrap().record.is_empty());
    }

    #[tokio::test]
    async fn advanced_past_stage_is_rejected() {
        let (mut engine, _) = engine();
        let reply = engine.start(submitter(1));
        let (_, choices) = prompt(&reply);
        let round_token = CallbackToken::parse(&choices[0].data).unwrap();

        press(&mut engine, 1, &reply, 0).await;

        // Same generation, but the session has moved past Round.
        let err = engine.select(1, &round_token).await.unwrap_err();
        assert!(matches!(err, SurveyError::Stale));
        let session = engine.sessions.get(1).unwrap();
        assert_eq!(session.record.len(), 1);
        assert_eq!(session.current, Stage::Judge);
    }

    #[tokio::test]
    async fn out_of_range_option_is_stale() {
        let (mut engine, _) = engine();
        let reply = engine.start(submitter(1));
        let (_, choices) = prompt(&reply);
        let mut token = CallbackToken::parse(&choices[0].data).unwrap();
        token.option = 99;
        assert!(matches!(
            engine.select(1, &token).await,
            Err(SurveyError::Stale)
        ));
    }

    #[tokio::test]
    async fn select_without_session_is_stale() {
        let (mut engine, _) = engine();
        let token = CallbackToken::new(1, Stage::Round, 0);
        assert!(matches!(
            engine.select(42, &token).await,
            Err(SurveyError::Stale)
        ));
    }

    #[tokio::test]
    async fn free_text_outside_feedback_stage_is_unexpected() {
        let (mut engine, _) = engine();
        assert!(matches!(
            engine.free_text(1, "hello"),
            Err(SurveyError::UnexpectedText)
        ));

        engine.start(submitter(1));
        let err = engine.free_text(1, "hello").unwrap_err();
        assert!(matches!(err, SurveyError::UnexpectedText));
        assert!(engine.sessions.get(1).unwrap().record.is_empty());
    }

    #[tokio::test]
    async fn feedback_text_advances_to_confirmation() {
        let (mut engine, _) = engine();
        let mut reply = engine.start(submitter(1));
        for _ in 0..6 {
            reply = press(&mut engine, 1, &reply, 0).await;
        }
        assert_eq!(engine.sessions.get(1).unwrap().current, Stage::Feedback);

        let reply = engine.free_text(1, "  great match  ").unwrap();
        let session = engine.sessions.get(1).unwrap();
        assert_eq!(session.current, Stage::Confirmation);
        assert_eq!(session.record.get(Stage::Feedback), Some("great match"));

        let (text, choices) = prompt(&reply);
        assert!(text.contains("Feedback: great match"));
        assert!(text.ends_with("Submit this scorecard?"));
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[0].label, "Yes, confirm");
    }

    #[tokio::test]
    async fn feedback_skip_records_sentinel_and_hides_it_from_summary() {
        let (mut engine, _) = engine();
        let mut reply = engine.start(submitter(1));
        for _ in 0..6 {
            reply = press(&mut engine, 1, &reply, 0).await;
        }
        let (_, choices) = prompt(&reply);
        assert_eq!(choices.len(), 1);
        assert_eq!(choices[0].label, "No feedback");

        let reply = press(&mut engine, 1, &reply, 0).await;
        let session = engine.sessions.get(1).unwrap();
        assert_eq!(
            session.record.get(Stage::Feedback),
            Some(NO_FEEDBACK_SENTINEL)
        );
        let (text, _) = prompt(&reply);
        assert!(!text.contains("Feedback:"));
    }

    #[tokio::test]
    async fn confirmation_yes_commits_and_ends_session() {
        let (mut engine, sink) = engine();
        let mut reply = engine.start(submitter(1));
        for _ in 0..7 {
            reply = press(&mut engine, 1, &reply, 0).await;
        }
        let reply = press(&mut engine, 1, &reply, 0).await;

        match reply {
            Reply::Confirmed { text } => assert!(text.ends_with("Done and saved.")),
            other => panic!("expected confirmed, got {other:?}"),
        }
        assert!(engine.sessions.get(1).is_none());
        assert_eq!(sink.entries().len(), 1);
    }

    #[tokio::test]
    async fn confirmation_no_discards_without_persistence() {
        let (mut engine, sink) = engine();
        let mut reply = engine.start(submitter(1));
        for _ in 0..7 {
            reply = press(&mut engine, 1, &reply, 0).await;
        }
        let reply = press(&mut engine, 1, &reply, 1).await;

        match reply {
            Reply::Discarded { text } => assert_eq!(text, "Answer discarded."),
            other => panic!("expected discarded, got {other:?}"),
        }
        assert!(engine.sessions.get(1).is_none());
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn cancel_discards_session() {
        let (mut engine, _) = engine();
        assert!(!engine.cancel(1));
        engine.start(submitter(1));
        assert!(engine.cancel(1));
        assert!(engine.sessions.get(1).is_none());
    }

    #[tokio::test]
    async fn sessions_do_not_cross_users() {
        let (mut engine, _) = engine();
        let reply_a = engine.start(submitter(1));
        engine.start(submitter(2));

        press(&mut engine, 1, &reply_a, 2).await;
        assert_eq!(engine.sessions.get(1).unwrap().record.len(), 1);
        assert!(engine.sessions.get(2).unwrap().record.is_empty());
    }
}
