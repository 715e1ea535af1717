//! Repository for the `wizard_sessions` table.

use sqlx::PgPool;
use uuid::Uuid;

use stepwise_core::types::Timestamp;

use crate::models::session::SessionRow;

/// Column list for `wizard_sessions` queries.
const COLUMNS: &str = "id, wizard_key, wizard_version, status, current_step, state, \
     created_at, updated_at, expires_at";

/// CRUD operations for wizard sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session row.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &PgPool,
        id: Uuid,
        wizard_key: &str,
        wizard_version: &str,
        status: &str,
        current_step: Option<&str>,
        state: &serde_json::Value,
        expires_at: Timestamp,
    ) -> Result<SessionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO wizard_sessions \
                (id, wizard_key, wizard_version, status, current_step, state, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .bind(wizard_key)
            .bind(wizard_version)
            .bind(status)
            .bind(current_step)
            .bind(state)
            .bind(expires_at)
            .fetch_one(pool)
            .await
    }

    /// Find a live (non-expired) session by ID.
    pub async fn find_live(pool: &PgPool, id: Uuid) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM wizard_sessions \
             WHERE id = $1 AND expires_at > now()"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Full-row replacement of the mutable columns. Idempotent: re-applying
    /// the same values produces the same row (modulo `updated_at`).
    pub async fn save(
        pool: &PgPool,
        id: Uuid,
        status: &str,
        current_step: Option<&str>,
        state: &serde_json::Value,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE wizard_sessions \
             SET status = $2, current_step = $3, state = $4, updated_at = now() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .bind(status)
            .bind(current_step)
            .bind(state)
            .fetch_optional(pool)
            .await
    }

    /// Delete sessions that expired before `cutoff`. Returns the number of
    /// rows removed.
    pub async fn delete_expired_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM wizard_sessions WHERE expires_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
