//! Ledger repository implementation.
//!
//! Append-only lifecycle record keyed by content hash. There is no
//! DELETE statement in this module; "removal" is a state transition with
//! the file preserved at a known path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use conductor_core::{
    Error, LedgerEntry, LedgerPatch, LedgerRepository, LedgerState, Result,
};

/// SQLite implementation of [`LedgerRepository`].
pub struct SqliteLedgerRepository {
    pool: SqlitePool,
}

impl SqliteLedgerRepository {
    /// Create a repository over an existing pool. Call
    /// [`SqliteLedgerRepository::init_schema`] once before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the ledger table and indexes if they do not exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ledger (
                hash TEXT PRIMARY KEY NOT NULL,
                original_filename TEXT NOT NULL,
                original_path TEXT NOT NULL,
                current_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                category TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                extracted_chars INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_state ON ledger(state)")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(())
    }

    fn parse_row(row: SqliteRow) -> Result<LedgerEntry> {
        let state_str: String = row.get("state");
        let state: LedgerState = state_str.parse()?;
        let created_at: DateTime<Utc> = row
            .get::<String, _>("created_at")
            .parse()
            .map_err(|e| Error::Serialization(format!("Bad created_at: {e}")))?;
        let updated_at: DateTime<Utc> = row
            .get::<String, _>("updated_at")
            .parse()
            .map_err(|e| Error::Serialization(format!("Bad updated_at: {e}")))?;

        Ok(LedgerEntry {
            hash: row.get("hash"),
            original_filename: row.get("original_filename"),
            original_path: row.get("original_path"),
            current_path: row.get("current_path"),
            size_bytes: row.get("size_bytes"),
            mime_type: row.get("mime_type"),
            category: row.get("category"),
            state,
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            extracted_chars: row.get("extracted_chars"),
            created_at,
            updated_at,
        })
    }

    async fn fetch(&self, hash: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query("SELECT * FROM ledger WHERE hash = ?1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.map(Self::parse_row).transpose()
    }
}

#[async_trait]
impl LedgerRepository for SqliteLedgerRepository {
    #[instrument(skip(self, seed), fields(content_hash = %seed.hash))]
    async fn upsert_sighting(&self, seed: LedgerEntry) -> Result<LedgerEntry> {
        // INSERT OR IGNORE keeps the first sighting authoritative: a
        // duplicate hash arriving later must not reset attempts or state.
        let result = sqlx::query(
            "INSERT INTO ledger
                (hash, original_filename, original_path, current_path, size_bytes,
                 mime_type, category, state, attempts, last_error, extracted_chars,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(hash) DO NOTHING",
        )
        .bind(&seed.hash)
        .bind(&seed.original_filename)
        .bind(&seed.original_path)
        .bind(&seed.current_path)
        .bind(seed.size_bytes)
        .bind(&seed.mime_type)
        .bind(&seed.category)
        .bind(seed.state.as_str())
        .bind(seed.attempts)
        .bind(&seed.last_error)
        .bind(seed.extracted_chars)
        .bind(seed.created_at.to_rfc3339())
        .bind(seed.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            debug!(content_hash = %seed.hash, "Duplicate sighting, entry unchanged");
        }

        self.fetch(&seed.hash)
            .await?
            .ok_or_else(|| Error::EntryNotFound(seed.hash.clone()))
    }

    async fn get(&self, hash: &str) -> Result<Option<LedgerEntry>> {
        self.fetch(hash).await
    }

    #[instrument(skip(self, patch), fields(content_hash = %hash, expected = %expected_state))]
    async fn update_cas(
        &self,
        hash: &str,
        expected_state: LedgerState,
        patch: LedgerPatch,
    ) -> Result<LedgerEntry> {
        if let Some(to) = patch.state {
            if to != expected_state && !LedgerState::can_transition(expected_state, to) {
                return Err(Error::IllegalTransition {
                    hash: hash.to_string(),
                    from: expected_state.as_str().to_string(),
                    to: to.as_str().to_string(),
                });
            }
        }

        // Single-row compare-and-swap: the WHERE clause is the guard.
        // COALESCE keeps untouched columns; last_error uses a sentinel
        // flag because "set to NULL" and "leave alone" differ.
        let now = Utc::now().to_rfc3339();
        let (error_flag, error_value) = match &patch.last_error {
            None => (0i64, None),
            Some(None) => (1, None),
            Some(Some(e)) => (1, Some(e.clone())),
        };

        let result = sqlx::query(
            "UPDATE ledger SET
                state = COALESCE(?1, state),
                current_path = COALESCE(?2, current_path),
                attempts = COALESCE(?3, attempts),
                last_error = CASE WHEN ?4 = 1 THEN ?5 ELSE last_error END,
                extracted_chars = COALESCE(?6, extracted_chars),
                updated_at = ?7
             WHERE hash = ?8 AND state = ?9",
        )
        .bind(patch.state.map(|s| s.as_str()))
        .bind(&patch.current_path)
        .bind(patch.attempts)
        .bind(error_flag)
        .bind(&error_value)
        .bind(patch.extracted_chars)
        .bind(&now)
        .bind(hash)
        .bind(expected_state.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return match self.fetch(hash).await? {
                Some(_) => Err(Error::StaleWrite {
                    hash: hash.to_string(),
                    expected: expected_state.as_str().to_string(),
                }),
                None => Err(Error::EntryNotFound(hash.to_string())),
            };
        }

        self.fetch(hash)
            .await?
            .ok_or_else(|| Error::EntryNotFound(hash.to_string()))
    }

    async fn list_by_state(&self, state: LedgerState) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query("SELECT * FROM ledger WHERE state = ?1 ORDER BY created_at ASC")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn counts_by_state(&self) -> Result<Vec<(LedgerState, i64)>> {
        let rows =
            sqlx::query("SELECT state, COUNT(*) AS n FROM ledger GROUP BY state ORDER BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let state: LedgerState = row.get::<String, _>("state").parse()?;
                Ok((state, row.get::<i64, _>("n")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_memory_pool;

    fn seed_entry(hash: &str, name: &str) -> LedgerEntry {
        let now = Utc::now();
        LedgerEntry {
            hash: hash.to_string(),
            original_filename: name.to_string(),
            original_path: format!("/inbox/{name}"),
            current_path: format!("/staging/{hash}__{name}"),
            size_bytes: 42,
            mime_type: "text/plain".to_string(),
            category: "text".to_string(),
            state: LedgerState::Queued,
            attempts: 0,
            last_error: None,
            extracted_chars: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn test_repo() -> SqliteLedgerRepository {
        let pool = create_memory_pool().await.expect("memory pool");
        let repo = SqliteLedgerRepository::new(pool);
        repo.init_schema().await.expect("schema");
        repo
    }

    #[tokio::test]
    async fn test_upsert_creates_entry() {
        let repo = test_repo().await;
        let entry = repo.upsert_sighting(seed_entry("aaa", "a.txt")).await.unwrap();
        assert_eq!(entry.hash, "aaa");
        assert_eq!(entry.state, LedgerState::Queued);
        assert_eq!(entry.attempts, 0);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_hash() {
        let repo = test_repo().await;
        repo.upsert_sighting(seed_entry("dup", "first.txt"))
            .await
            .unwrap();

        // Move the entry forward, then sight the same hash again.
        repo.update_cas(
            "dup",
            LedgerState::Queued,
            LedgerPatch::state(LedgerState::Processing),
        )
        .await
        .unwrap();

        let second = repo
            .upsert_sighting(seed_entry("dup", "second-name.txt"))
            .await
            .unwrap();

        // First sighting stays authoritative: no reset, no second row.
        assert_eq!(second.original_filename, "first.txt");
        assert_eq!(second.state, LedgerState::Processing);
        let counts = repo.counts_by_state().await.unwrap();
        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_cas_happy_path() {
        let repo = test_repo().await;
        repo.upsert_sighting(seed_entry("h1", "doc.pdf")).await.unwrap();

        let entry = repo
            .update_cas(
                "h1",
                LedgerState::Queued,
                LedgerPatch::state(LedgerState::Processing).with_attempts(1),
            )
            .await
            .unwrap();
        assert_eq!(entry.state, LedgerState::Processing);
        assert_eq!(entry.attempts, 1);

        let entry = repo
            .update_cas(
                "h1",
                LedgerState::Processing,
                LedgerPatch::state(LedgerState::Indexed)
                    .with_current_path("/archive/h1/doc.pdf")
                    .with_extracted_chars(512)
                    .clear_error(),
            )
            .await
            .unwrap();
        assert_eq!(entry.state, LedgerState::Indexed);
        assert_eq!(entry.current_path, "/archive/h1/doc.pdf");
        assert_eq!(entry.extracted_chars, 512);
        assert!(entry.last_error.is_none());
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_writer() {
        let repo = test_repo().await;
        repo.upsert_sighting(seed_entry("h2", "doc.pdf")).await.unwrap();

        repo.update_cas(
            "h2",
            LedgerState::Queued,
            LedgerPatch::state(LedgerState::Processing),
        )
        .await
        .unwrap();

        // A second writer still believing the entry is queued loses.
        let err = repo
            .update_cas(
                "h2",
                LedgerState::Queued,
                LedgerPatch::state(LedgerState::Processing),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleWrite { .. }));

        // Loser retries as read-modify-write and converges.
        let current = repo.get("h2").await.unwrap().unwrap();
        assert_eq!(current.state, LedgerState::Processing);
    }

    #[tokio::test]
    async fn test_cas_rejects_illegal_transition() {
        let repo = test_repo().await;
        repo.upsert_sighting(seed_entry("h3", "doc.pdf")).await.unwrap();
        repo.update_cas(
            "h3",
            LedgerState::Queued,
            LedgerPatch::state(LedgerState::Processing),
        )
        .await
        .unwrap();
        repo.update_cas(
            "h3",
            LedgerState::Processing,
            LedgerPatch::state(LedgerState::Indexed),
        )
        .await
        .unwrap();

        // Indexed is final.
        let err = repo
            .update_cas(
                "h3",
                LedgerState::Indexed,
                LedgerPatch::state(LedgerState::Queued),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_cas_missing_entry() {
        let repo = test_repo().await;
        let err = repo
            .update_cas(
                "ghost",
                LedgerState::Queued,
                LedgerPatch::state(LedgerState::Processing),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_to_queued_retry_transition() {
        let repo = test_repo().await;
        repo.upsert_sighting(seed_entry("h4", "doc.pdf")).await.unwrap();
        repo.update_cas(
            "h4",
            LedgerState::Queued,
            LedgerPatch::state(LedgerState::Processing),
        )
        .await
        .unwrap();
        repo.update_cas(
            "h4",
            LedgerState::Processing,
            LedgerPatch::state(LedgerState::Failed).with_error("chain exhausted"),
        )
        .await
        .unwrap();

        let entry = repo
            .update_cas(
                "h4",
                LedgerState::Failed,
                LedgerPatch::state(LedgerState::Queued).with_attempts(2),
            )
            .await
            .unwrap();
        assert_eq!(entry.state, LedgerState::Queued);
        assert_eq!(entry.attempts, 2);
        // last_error untouched unless patched
        assert_eq!(entry.last_error.as_deref(), Some("chain exhausted"));
    }

    #[tokio::test]
    async fn test_list_and_counts_by_state() {
        let repo = test_repo().await;
        repo.upsert_sighting(seed_entry("a1", "a.txt")).await.unwrap();
        repo.upsert_sighting(seed_entry("a2", "b.txt")).await.unwrap();
        repo.upsert_sighting(seed_entry("a3", "c.txt")).await.unwrap();
        repo.update_cas(
            "a3",
            LedgerState::Queued,
            LedgerPatch::state(LedgerState::Processing),
        )
        .await
        .unwrap();

        let queued = repo.list_by_state(LedgerState::Queued).await.unwrap();
        assert_eq!(queued.len(), 2);
        let processing = repo.list_by_state(LedgerState::Processing).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].hash, "a3");

        let counts = repo.counts_by_state().await.unwrap();
        let get = |s: LedgerState| {
            counts
                .iter()
                .find(|(state, _)| *state == s)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        assert_eq!(get(LedgerState::Queued), 2);
        assert_eq!(get(LedgerState::Processing), 1);
    }
}
