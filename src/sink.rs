//! Response sink — append-only persistence for completed scorecards.
//!
//! One comma-joined, newline-terminated line per submission, fixed
//! positional schema:
//! `timestamp,submitter_id,submitter_handle,submitter_name,<answers…>`
//! with answers in catalog order. The schema is produced in exactly one
//! place (`format_entry`) so the field order cannot drift.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;

use crate::catalog::{Catalog, Stage};
use crate::error::SinkError;
use crate::survey::record::{AnswerRecord, NO_FEEDBACK_SENTINEL};
use crate::survey::session::Submitter;

/// Destination for completed submissions.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Persist one completed record. Failure is fatal to the bot and is
    /// surfaced to the operator, never the end user.
    async fn commit(
        &self,
        record: &AnswerRecord,
        submitter: &Submitter,
    ) -> Result<(), SinkError>;
}

/// Strip the delimiters from a field so the line stays one record and
/// splits cleanly on commas.
fn sanitize_field(value: &str) -> String {
    value.replace([',', '\r', '\n'], " ")
}

/// Format one log line for a completed record.
///
/// Skipped stages become empty fields; the feedback sentinel is
/// normalized to an empty field; the confirmation stage is not logged.
pub fn format_entry(
    catalog: &Catalog,
    record: &AnswerRecord,
    submitter: &Submitter,
    at: DateTime<Utc>,
) -> String {
    let mut fields = vec![
        at.to_rfc3339(),
        submitter.id.to_string(),
        sanitize_field(submitter.handle.as_deref().unwrap_or("")),
        sanitize_field(&submitter.name),
    ];
    for stage in catalog.answer_stages() {
        let value = match record.get(stage) {
            Some(v) if stage == Stage::Feedback && v == NO_FEEDBACK_SENTINEL => "",
            Some(v) => v,
            None => "",
        };
        fields.push(sanitize_field(value));
    }
    let mut line = fields.join(",");
    line.push('\n');
    line
}

/// File-backed sink appending to a CSV log.
pub struct CsvLogSink {
    path: PathBuf,
    catalog: Arc<Catalog>,
}

impl CsvLogSink {
    pub fn new(path: PathBuf, catalog: Arc<Catalog>) -> Self {
        Self { path, catalog }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ResponseSink for CsvLogSink {
    async fn commit(
        &self,
        record: &AnswerRecord,
        submitter: &Submitter,
    ) -> Result<(), SinkError> {
        let line = format_entry(&self.catalog, record, submitter, Utc::now());
        let append = |source| SinkError::Append {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(append)?;
            }
        }

        // One O_APPEND write per record keeps interleaved appends whole.
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(append)?;
        file.write_all(line.as_bytes()).await.map_err(append)?;
        file.flush().await.map_err(append)?;

        tracing::info!(path = %self.path.display(), submitter_id = submitter.id, "response logged");
        Ok(())
    }
}

/// In-memory sink for tests: collects formatted lines.
pub struct MemorySink {
    catalog: Arc<Catalog>,
    entries: std::sync::Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            entries: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// The committed lines, in commit order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    async fn commit(
        &self,
        record: &AnswerRecord,
        submitter: &Submitter,
    ) -> Result<(), SinkError> {
        let line = format_entry(&self.catalog, record, submitter, Utc::now());
        self.entries.lock().expect("sink lock").push(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter() -> Submitter {
        Submitter {
            id: 99,
            name: "Alice".into(),
            handle: Some("alice".into()),
        }
    }

    fn full_record(catalog: &Catalog) -> AnswerRecord {
        let mut record = AnswerRecord::new();
        record.insert(Stage::Round, "2".into());
        record.insert(Stage::Judge, "Judge 2".into());
        record.insert(Stage::Team, "Team 1".into());
        record.insert(Stage::Place, "3".into());
        record.insert(Stage::Rating(0), "5".into());
        record.insert(Stage::Rating(1), "4".into());
        record.insert(Stage::Feedback, "solid run".into());
        record.insert(Stage::Confirmation, catalog.confirm_yes().to_string());
        record
    }

    #[test]
    fn entry_fields_follow_catalog_order() {
        let catalog = Catalog::builtin();
        let record = full_record(&catalog);
        let at = "2026-08-04T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let line = format_entry(&catalog, &record, &submitter(), at);
        assert!(line.ends_with('\n'));
        let fields: Vec<&str> = line.trim_end().split(',').collect();

        assert_eq!(fields[1], "99");
        assert_eq!(fields[2], "alice");
        assert_eq!(fields[3], "Alice");
        assert_eq!(
            &fields[4..],
            &["2", "Judge 2", "Team 1", "3", "5", "4", "solid run"]
        );
    }

    #[test]
    fn sentinel_feedback_becomes_empty_field() {
        let catalog = Catalog::builtin();
        let mut record = full_record(&catalog);
        record.insert(Stage::Feedback, NO_FEEDBACK_SENTINEL.into());

        let line = format_entry(&catalog, &record, &submitter(), Utc::now());
        assert!(line.trim_end().ends_with(','));
    }

    #[test]
    fn skipped_stage_becomes_empty_field() {
        let catalog = Catalog::builtin();
        let mut record = AnswerRecord::new();
        record.insert(Stage::Round, "1".into());

        let line = format_entry(&catalog, &record, &submitter(), Utc::now());
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        // 4 identity fields + 7 answer columns, only Round filled.
        assert_eq!(fields.len(), 11);
        assert_eq!(fields[4], "1");
        assert!(fields[5..].iter().all(|f| f.is_empty()));
    }

    #[test]
    fn delimiters_in_free_text_are_flattened() {
        let catalog = Catalog::builtin();
        let mut record = full_record(&catalog);
        record.insert(Stage::Feedback, "good, but\nslow".into());

        let line = format_entry(&catalog, &record, &submitter(), Utc::now());
        assert_eq!(line.matches('\n').count(), 1);
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        assert_eq!(*fields.last().unwrap(), "good  but slow");
    }

    #[test]
    fn missing_handle_is_empty_field() {
        let catalog = Catalog::builtin();
        let record = full_record(&catalog);
        let anon = Submitter {
            id: 7,
            name: "Bob".into(),
            handle: None,
        };
        let line = format_entry(&catalog, &record, &anon, Utc::now());
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        assert_eq!(fields[2], "");
        assert_eq!(fields[3], "Bob");
    }

    #[tokio::test]
    async fn csv_sink_appends_without_truncating() {
        let catalog = Arc::new(Catalog::builtin());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.csv");
        let sink = CsvLogSink::new(path.clone(), Arc::clone(&catalog));

        let record = full_record(&catalog);
        sink.commit(&record, &submitter()).await.unwrap();
        sink.commit(&record, &submitter()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
        assert!(lines[0].contains("Judge 2"));
    }

    #[tokio::test]
    async fn csv_sink_creates_missing_parent_dir() {
        let catalog = Arc::new(Catalog::builtin());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/responses.csv");
        let sink = CsvLogSink::new(path.clone(), Arc::clone(&catalog));

        sink.commit(&full_record(&catalog), &submitter()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn csv_sink_unwritable_path_fails() {
        let catalog = Arc::new(Catalog::builtin());
        let path = PathBuf::from("/proc/does-not-exist/responses.csv");
        let sink = CsvLogSink::new(path, catalog.clone());

        let err = sink
            .commit(&full_record(&catalog), &submitter())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("responses.csv"));
    }

    #[tokio::test]
    async fn memory_sink_collects_in_order() {
        let catalog = Arc::new(Catalog::builtin());
        let sink = MemorySink::new(Arc::clone(&catalog));

        let mut record = full_record(&catalog);
        sink.commit(&record, &submitter()).await.unwrap();
        record.insert(Stage::Round, "3".into());
        sink.commit(&record, &submitter()).await.unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].contains(",3,Judge 2,"));
    }
}
