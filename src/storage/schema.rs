//! SQL schema for the recording store.

/// Recordings table. Only the columns the transcription pipeline owns.
pub const CREATE_RECORDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS recordings (
    id TEXT PRIMARY KEY NOT NULL,
    audio_locator TEXT NOT NULL,
    status TEXT NOT NULL
        CHECK (status IN ('pending_upload', 'transcribing', 'ready', 'failed')),
    transcript TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// Supports `list_by_status` and orphan scans.
pub const CREATE_STATUS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_recordings_status
    ON recordings (status, created_at)
"#;

/// Returns all schema statements in the order they must be applied.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_RECORDINGS_TABLE, CREATE_STATUS_INDEX]
}
