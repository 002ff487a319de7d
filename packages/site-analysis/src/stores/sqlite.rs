//! SQLite storage implementation.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Local development
//! - Single-server deployments
//! - Testing with persistent data
//!
//! Uniqueness of subject keys and task ids is enforced by the schema, and
//! every trait method is a single statement, so concurrent callers never
//! see a partially applied write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{SubjectStore, TaskStore, TerminalWrite};
use crate::types::{
    fingerprint::Fingerprint,
    subject::{Annotation, FingerprintSlots, SubjectId, SubjectPatch, SubjectRecord, TaskRefs},
    task::{TaskId, TaskRecord, TaskState},
    timestamps::Timestamps,
};

const SUBJECT_COLUMNS: &str = "id, subject_key, content_fingerprint, flagged, saved, \
     social_task, classification_task, location_task, \
     social_fingerprint, classification_fingerprint, location_fingerprint, \
     created_at, updated_at";

const TASK_COLUMNS: &str = "task_id, kind, state, result, created_at, updated_at";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

/// SQLite-backed analysis store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite://site-analysis.db?mode=rwc` - Create if not exists
    /// - `sqlite:./analysis.db` - Existing file
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        Self::connect(database_url, SqlitePoolOptions::new().max_connections(5)).await
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:", memory_pool_options()).await
    }

    async fn connect(database_url: &str, options: SqlitePoolOptions) -> StoreResult<Self> {
        let pool = options.connect(database_url).await.map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id TEXT NOT NULL,
                subject_key TEXT PRIMARY KEY,
                content_fingerprint TEXT,
                flagged INTEGER NOT NULL DEFAULT 0,
                saved INTEGER NOT NULL DEFAULT 0,
                social_task TEXT,
                classification_task TEXT,
                location_task TEXT,
                social_fingerprint TEXT,
                classification_fingerprint TEXT,
                location_fingerprint TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subjects_created_at ON subjects(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                state TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

}

/// Pool settings for `:memory:` databases.
///
/// Every connection to `:memory:` opens its own empty database, and the
/// data lives only as long as that connection. The pool holds exactly one
/// and never retires it.
fn memory_pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
}

fn parse_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {}: {}", value, e)))
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("invalid id {}: {}", value, e)))
}

fn parse_task_ref(value: Option<String>) -> StoreResult<Option<TaskId>> {
    value.as_deref().map(parse_uuid).transpose().map(|id| id.map(TaskId))
}

fn encode_fingerprint(value: Option<&Fingerprint>) -> Option<String> {
    value.map(|f| f.as_str().to_string())
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct SubjectRow {
    id: String,
    subject_key: String,
    content_fingerprint: Option<String>,
    flagged: bool,
    saved: bool,
    social_task: Option<String>,
    classification_task: Option<String>,
    location_task: Option<String>,
    social_fingerprint: Option<String>,
    classification_fingerprint: Option<String>,
    location_fingerprint: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SubjectRow {
    fn into_record(self) -> StoreResult<SubjectRecord> {
        Ok(SubjectRecord {
            id: SubjectId(parse_uuid(&self.id)?),
            subject_key: self.subject_key,
            content_fingerprint: self.content_fingerprint.map(Fingerprint::from_stored),
            kind_fingerprints: FingerprintSlots {
                social: self.social_fingerprint.map(Fingerprint::from_stored),
                classification: self.classification_fingerprint.map(Fingerprint::from_stored),
                location: self.location_fingerprint.map(Fingerprint::from_stored),
            },
            flagged: self.flagged,
            saved: self.saved,
            tasks: TaskRefs {
                social: parse_task_ref(self.social_task)?,
                classification: parse_task_ref(self.classification_task)?,
                location: parse_task_ref(self.location_task)?,
            },
            timestamps: Timestamps {
                created_at: parse_time(&self.created_at)?,
                updated_at: parse_time(&self.updated_at)?,
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: String,
    kind: String,
    state: String,
    result: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn into_record(self) -> StoreResult<TaskRecord> {
        let result = self
            .result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("invalid result JSON: {}", e)))?;

        Ok(TaskRecord {
            task_id: TaskId(parse_uuid(&self.task_id)?),
            kind: self.kind.parse().map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
            state: self.state.parse::<TaskState>().map_err(StoreError::Corrupt)?,
            result,
            timestamps: Timestamps {
                created_at: parse_time(&self.created_at)?,
                updated_at: parse_time(&self.updated_at)?,
            },
        })
    }
}

fn encode_result(result: &Option<serde_json::Value>) -> StoreResult<Option<String>> {
    result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[async_trait]
impl SubjectStore for SqliteStore {
    async fn get_subject(&self, subject_key: &str) -> StoreResult<Option<SubjectRecord>> {
        let row = sqlx::query_as::<_, SubjectRow>(&format!(
            "SELECT {} FROM subjects WHERE subject_key = ?",
            SUBJECT_COLUMNS
        ))
        .bind(subject_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SubjectRow::into_record).transpose()
    }

    async fn list_subjects(&self) -> StoreResult<Vec<SubjectRecord>> {
        let rows = sqlx::query_as::<_, SubjectRow>(&format!(
            "SELECT {} FROM subjects ORDER BY created_at",
            SUBJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(SubjectRow::into_record).collect()
    }

    async fn insert_subject(&self, record: &SubjectRecord) -> StoreResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO subjects (id, subject_key, content_fingerprint, flagged, saved,
                social_task, classification_task, location_task,
                social_fingerprint, classification_fingerprint, location_fingerprint,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.subject_key)
        .bind(encode_fingerprint(record.content_fingerprint.as_ref()))
        .bind(record.flagged)
        .bind(record.saved)
        .bind(record.tasks.social.map(|id| id.to_string()))
        .bind(record.tasks.classification.map(|id| id.to_string()))
        .bind(record.tasks.location.map(|id| id.to_string()))
        .bind(encode_fingerprint(record.kind_fingerprints.social.as_ref()))
        .bind(encode_fingerprint(record.kind_fingerprints.classification.as_ref()))
        .bind(encode_fingerprint(record.kind_fingerprints.location.as_ref()))
        .bind(record.timestamps.created_at.to_rfc3339())
        .bind(record.timestamps.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Conflict {
                    subject_key: record.subject_key.clone(),
                })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn update_subject(
        &self,
        subject_key: &str,
        patch: &SubjectPatch,
    ) -> StoreResult<Option<SubjectRecord>> {
        // COALESCE keeps the stored value for every omitted field
        let row = sqlx::query_as::<_, SubjectRow>(&format!(
            r#"
            UPDATE subjects SET
                content_fingerprint = COALESCE(?, content_fingerprint),
                social_task = COALESCE(?, social_task),
                classification_task = COALESCE(?, classification_task),
                location_task = COALESCE(?, location_task),
                social_fingerprint = COALESCE(?, social_fingerprint),
                classification_fingerprint = COALESCE(?, classification_fingerprint),
                location_fingerprint = COALESCE(?, location_fingerprint),
                updated_at = ?
            WHERE subject_key = ?
            RETURNING {}
            "#,
            SUBJECT_COLUMNS
        ))
        .bind(encode_fingerprint(patch.fingerprint.as_ref()))
        .bind(patch.tasks.social.map(|id| id.to_string()))
        .bind(patch.tasks.classification.map(|id| id.to_string()))
        .bind(patch.tasks.location.map(|id| id.to_string()))
        .bind(encode_fingerprint(patch.kind_fingerprints.social.as_ref()))
        .bind(encode_fingerprint(patch.kind_fingerprints.classification.as_ref()))
        .bind(encode_fingerprint(patch.kind_fingerprints.location.as_ref()))
        .bind(Utc::now().to_rfc3339())
        .bind(subject_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SubjectRow::into_record).transpose()
    }

    async fn annotate_subject(
        &self,
        subject_key: &str,
        annotation: Annotation,
    ) -> StoreResult<Option<SubjectRecord>> {
        let column = match annotation {
            Annotation::Flagged => "flagged",
            Annotation::Saved => "saved",
        };

        // Setting an already-set flag leaves updated_at alone
        let row = sqlx::query_as::<_, SubjectRow>(&format!(
            r#"
            UPDATE subjects SET
                updated_at = CASE WHEN {col} = 0 THEN ? ELSE updated_at END,
                {col} = 1
            WHERE subject_key = ?
            RETURNING {cols}
            "#,
            col = column,
            cols = SUBJECT_COLUMNS
        ))
        .bind(Utc::now().to_rfc3339())
        .bind(subject_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SubjectRow::into_record).transpose()
    }

    async fn delete_subject(&self, subject_key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subjects WHERE subject_key = ?")
            .bind(subject_key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn get_task(&self, task_id: TaskId) -> StoreResult<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM tasks WHERE task_id = ?",
            TASK_COLUMNS
        ))
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(TaskRow::into_record).transpose()
    }

    async fn insert_pending(&self, record: &TaskRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, kind, state, result, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(task_id) DO NOTHING
            "#,
        )
        .bind(record.task_id.to_string())
        .bind(record.kind.as_str())
        .bind(record.state.as_str())
        .bind(encode_result(&record.result)?)
        .bind(record.timestamps.created_at.to_rfc3339())
        .bind(record.timestamps.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn persist_terminal(&self, record: &TaskRecord) -> StoreResult<TerminalWrite> {
        let now = Utc::now().to_rfc3339();

        // Only a Pending row may transition; a terminal row is left as is
        let written = sqlx::query(
            r#"
            INSERT INTO tasks (task_id, kind, state, result, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(task_id) DO UPDATE SET
                state = excluded.state,
                result = excluded.result,
                updated_at = excluded.updated_at
            WHERE tasks.state = 'PENDING'
            "#,
        )
        .bind(record.task_id.to_string())
        .bind(record.kind.as_str())
        .bind(record.state.as_str())
        .bind(encode_result(&record.result)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected()
            > 0;

        let persisted = self.get_task(record.task_id).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("task {} vanished after write", record.task_id))
        })?;

        Ok(TerminalWrite {
            record: persisted,
            written,
        })
    }

    async fn override_result(
        &self,
        task_id: TaskId,
        result: &serde_json::Value,
    ) -> StoreResult<Option<TaskRecord>> {
        let encoded =
            serde_json::to_string(result).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            UPDATE tasks SET result = ?, updated_at = ?
            WHERE task_id = ? AND state != 'PENDING'
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(encoded)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(TaskRow::into_record).transpose()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{kind::WorkKind, task::Outcome};
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_subject_roundtrip_and_conflict() {
        let store = test_store().await;
        let social = TaskId::new();
        let record = SubjectRecord::new(
            "https://example.com",
            &SubjectPatch::new()
                .with_fingerprint(Fingerprint::of("<html></html>"))
                .with_task(WorkKind::Social, social),
        );

        store.insert_subject(&record).await.unwrap();

        let loaded = store.get_subject("https://example.com").await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.tasks.social, Some(social));
        assert_eq!(loaded.content_fingerprint, record.content_fingerprint);

        let duplicate = SubjectRecord::new("https://example.com", &SubjectPatch::new());
        let err = store.insert_subject(&duplicate).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_omitted_fields() {
        let store = test_store().await;
        let social = TaskId::new();
        let fingerprint = Fingerprint::of("a");
        store
            .insert_subject(&SubjectRecord::new(
                "https://example.com",
                &SubjectPatch::new()
                    .with_fingerprint(fingerprint.clone())
                    .with_task(WorkKind::Social, social),
            ))
            .await
            .unwrap();

        let location = TaskId::new();
        let updated = store
            .update_subject(
                "https://example.com",
                &SubjectPatch::new().with_task(WorkKind::Location, location),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.content_fingerprint, Some(fingerprint));
        assert_eq!(updated.tasks.social, Some(social));
        assert_eq!(updated.tasks.location, Some(location));
    }

    #[tokio::test]
    async fn test_kind_fingerprints_persist_per_column() {
        let store = test_store().await;
        let a = Fingerprint::of("<html>a</html>");
        let b = Fingerprint::of("<html>b</html>");
        store
            .insert_subject(&SubjectRecord::new(
                "https://example.com",
                &SubjectPatch::new().with_kind_fingerprint(WorkKind::Social, a.clone()),
            ))
            .await
            .unwrap();

        let updated = store
            .update_subject(
                "https://example.com",
                &SubjectPatch::new().with_kind_fingerprint(WorkKind::Classification, b.clone()),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.content_fingerprint, Some(b.clone()));
        assert_eq!(updated.kind_fingerprints.social, Some(a));
        assert_eq!(updated.kind_fingerprints.classification, Some(b));
        assert_eq!(updated.kind_fingerprints.location, None);
    }

    #[test]
    fn test_memory_pool_never_retires_its_connection() {
        let options = memory_pool_options();
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_min_connections(), 1);
        assert_eq!(options.get_idle_timeout(), None);
        assert_eq!(options.get_max_lifetime(), None);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_data_across_queries() {
        let store = test_store().await;
        for i in 0..20 {
            let key = format!("https://example.com/{}", i);
            store
                .insert_subject(&SubjectRecord::new(&key, &SubjectPatch::new()))
                .await
                .unwrap();
            store.ping().await.unwrap();
        }
        assert_eq!(store.list_subjects().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_annotate_and_delete() {
        let store = test_store().await;
        store
            .insert_subject(&SubjectRecord::new("https://example.com", &SubjectPatch::new()))
            .await
            .unwrap();

        let flagged = store
            .annotate_subject("https://example.com", Annotation::Flagged)
            .await
            .unwrap()
            .unwrap();
        assert!(flagged.flagged);
        assert!(!flagged.saved);

        assert!(store
            .annotate_subject("https://missing.com", Annotation::Saved)
            .await
            .unwrap()
            .is_none());

        assert!(store.delete_subject("https://example.com").await.unwrap());
        assert!(!store.delete_subject("https://example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_write_is_conditional() {
        let store = test_store().await;
        let task_id = TaskId::new();
        store
            .insert_pending(&TaskRecord::pending(task_id, WorkKind::Classification))
            .await
            .unwrap();

        let success = TaskRecord::terminal(
            task_id,
            WorkKind::Classification,
            &Outcome::Success(json!({"category": "News"})),
        );
        let first = store.persist_terminal(&success).await.unwrap();
        assert!(first.written);
        assert_eq!(first.record.state, TaskState::Success);

        let late = TaskRecord::terminal(
            task_id,
            WorkKind::Classification,
            &Outcome::Success(json!({"category": "Sports"})),
        );
        let second = store.persist_terminal(&late).await.unwrap();
        assert!(!second.written);
        assert_eq!(second.record.result, Some(json!({"category": "News"})));
    }

    #[tokio::test]
    async fn test_terminal_write_inserts_when_absent() {
        let store = test_store().await;
        let task_id = TaskId::new();
        let record = TaskRecord::terminal(task_id, WorkKind::Location, &Outcome::Success(json!({})));

        let write = store.persist_terminal(&record).await.unwrap();
        assert!(write.written);
        assert_eq!(store.get_task(task_id).await.unwrap().unwrap().state, TaskState::Success);
    }

    #[tokio::test]
    async fn test_override_only_touches_terminal_rows() {
        let store = test_store().await;
        let task_id = TaskId::new();
        store
            .insert_pending(&TaskRecord::pending(task_id, WorkKind::Social))
            .await
            .unwrap();
        assert!(store
            .override_result(task_id, &json!({"manual": true}))
            .await
            .unwrap()
            .is_none());

        store
            .persist_terminal(&TaskRecord::terminal(
                task_id,
                WorkKind::Social,
                &Outcome::Success(json!({"emails": []})),
            ))
            .await
            .unwrap();

        let overridden = store
            .override_result(task_id, &json!({"manual": true}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(overridden.state, TaskState::Success);
        assert_eq!(overridden.result, Some(json!({"manual": true})));
    }
}
