//! SQLite-backed recording repository.
//!
//! The compare-and-set is a single `UPDATE ... WHERE id = ? AND status = ?`
//! statement, so SQLite's write lock makes it atomic across connections and
//! processes. A zero-row update is disambiguated afterwards into `NotFound`
//! or `Conflict`; the disambiguating read is informational only and never
//! changes the outcome.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::recording::{Recording, RecordingStatus};

use super::repository::{ensure_transition, RecordingRepository};
use super::schema;

const RECORDING_COLUMNS: &str =
    "id, audio_locator, status, transcript, retry_count, created_at, updated_at";

/// Recording repository persisted in a SQLite database.
#[derive(Clone)]
pub struct SqliteRecordingRepository {
    pool: SqlitePool,
}

impl SqliteRecordingRepository {
    /// Opens (creating if missing) the database at `url` and applies the schema.
    ///
    /// `url` is a sqlx SQLite URL such as `sqlite://recordings.db`.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        let repo = Self { pool };
        repo.run_migrations().await?;

        tracing::info!(url = url, "Recording store opened");
        Ok(repo)
    }

    /// Wraps an existing pool. The schema is not applied.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates tables and indexes. Idempotent.
    pub async fn run_migrations(&self) -> Result<(), RepositoryError> {
        for statement in schema::all_schema_statements() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Recording>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(recording_from_row).transpose()
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn recording_from_row(row: &SqliteRow) -> Result<Recording, RepositoryError> {
    let raw_id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&raw_id)
        .map_err(|e| RepositoryError::Corrupt(format!("bad id '{raw_id}': {e}")))?;

    let raw_status: String = row.try_get("status")?;
    let status = raw_status
        .parse::<RecordingStatus>()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;

    let retry_count: i64 = row.try_get("retry_count")?;
    let retry_count = u32::try_from(retry_count)
        .map_err(|_| RepositoryError::Corrupt(format!("bad retry_count {retry_count}")))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Recording {
        id,
        audio_locator: row.try_get("audio_locator")?,
        status,
        transcript: row.try_get("transcript")?,
        retry_count,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait]
impl RecordingRepository for SqliteRecordingRepository {
    async fn insert(&self, recording: Recording) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO recordings (
                id, audio_locator, status, transcript, retry_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING",
        )
        .bind(recording.id.to_string())
        .bind(&recording.audio_locator)
        .bind(recording.status.as_str())
        .bind(&recording.transcript)
        .bind(i64::from(recording.retry_count))
        .bind(format_timestamp(recording.created_at))
        .bind(format_timestamp(recording.updated_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Duplicate { id: recording.id });
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Recording, RepositoryError> {
        self.fetch(id).await?.ok_or(RepositoryError::NotFound(id))
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: RecordingStatus,
        new_status: RecordingStatus,
        transcript: Option<String>,
    ) -> Result<Recording, RepositoryError> {
        ensure_transition(expected, new_status)?;

        let transcript = match new_status {
            RecordingStatus::Ready => transcript,
            _ => None,
        };
        let retry_increment = i64::from(RecordingStatus::is_retry(expected, new_status));

        let row = sqlx::query(&format!(
            "UPDATE recordings
             SET status = ?1,
                 transcript = ?2,
                 retry_count = retry_count + ?3,
                 updated_at = ?4
             WHERE id = ?5 AND status = ?6
             RETURNING {RECORDING_COLUMNS}"
        ))
        .bind(new_status.as_str())
        .bind(transcript)
        .bind(retry_increment)
        .bind(format_timestamp(Utc::now()))
        .bind(id.to_string())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return recording_from_row(&row);
        }

        match self.fetch(id).await? {
            None => Err(RepositoryError::NotFound(id)),
            Some(current) => Err(RepositoryError::Conflict {
                id,
                expected,
                actual: current.status,
            }),
        }
    }

    async fn list_by_status(
        &self,
        status: RecordingStatus,
    ) -> Result<Vec<Recording>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings WHERE status = ?1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(recording_from_row).collect()
    }
}
