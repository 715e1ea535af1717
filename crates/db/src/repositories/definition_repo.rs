//! Repository for the `definitions` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::definition::DefinitionRow;

/// Column list for definitions queries.
const COLUMNS: &str = "id, kind, definition_key, version_num, schema_version, body, \
     checksum, created_by, created_at, published_at";

/// CRUD plus version assignment for wizard/page definitions.
pub struct DefinitionRepo;

impl DefinitionRepo {
    /// Find the draft row for a key.
    pub async fn find_draft(
        pool: &PgPool,
        kind: &str,
        key: &str,
    ) -> Result<Option<DefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM definitions \
             WHERE kind = $1 AND definition_key = $2 AND version_num IS NULL"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(kind)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Insert a new draft row.
    ///
    /// The `uq_definitions_draft` partial index rejects a second draft for
    /// the same key with a unique violation.
    pub async fn insert_draft(
        pool: &PgPool,
        kind: &str,
        key: &str,
        schema_version: &str,
        body: &serde_json::Value,
        checksum: &str,
        created_by: &str,
    ) -> Result<DefinitionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO definitions \
                (id, kind, definition_key, version_num, schema_version, body, checksum, created_by) \
             VALUES ($1, $2, $3, NULL, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(Uuid::new_v4())
            .bind(kind)
            .bind(key)
            .bind(schema_version)
            .bind(body)
            .bind(checksum)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// Replace a draft's body and checksum. Returns `None` if no draft
    /// exists for the key.
    pub async fn update_draft(
        pool: &PgPool,
        kind: &str,
        key: &str,
        body: &serde_json::Value,
        checksum: &str,
        created_by: &str,
    ) -> Result<Option<DefinitionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE definitions SET body = $3, checksum = $4, created_by = $5 \
             WHERE kind = $1 AND definition_key = $2 AND version_num IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(kind)
            .bind(key)
            .bind(body)
            .bind(checksum)
            .bind(created_by)
            .fetch_optional(pool)
            .await
    }

    /// Delete the draft row. Returns `true` if a row was deleted.
    pub async fn delete_draft(pool: &PgPool, kind: &str, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM definitions \
             WHERE kind = $1 AND definition_key = $2 AND version_num IS NULL",
        )
        .bind(kind)
        .bind(key)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List drafts of a kind, newest first.
    pub async fn list_drafts(
        pool: &PgPool,
        kind: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM definitions \
             WHERE kind = $1 AND version_num IS NULL \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(kind)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Find one exact published version.
    pub async fn find_published(
        pool: &PgPool,
        kind: &str,
        key: &str,
        version_num: i32,
    ) -> Result<Option<DefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM definitions \
             WHERE kind = $1 AND definition_key = $2 AND version_num = $3"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(kind)
            .bind(key)
            .bind(version_num)
            .fetch_optional(pool)
            .await
    }

    /// Find the highest-numbered published version.
    pub async fn find_latest_published(
        pool: &PgPool,
        kind: &str,
        key: &str,
    ) -> Result<Option<DefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM definitions \
             WHERE kind = $1 AND definition_key = $2 AND version_num IS NOT NULL \
             ORDER BY version_num DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(kind)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// List every version of a key: draft first, then published
    /// newest-first.
    pub async fn list_versions(
        pool: &PgPool,
        kind: &str,
        key: &str,
    ) -> Result<Vec<DefinitionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM definitions \
             WHERE kind = $1 AND definition_key = $2 \
             ORDER BY version_num DESC NULLS FIRST"
        );
        sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(kind)
            .bind(key)
            .fetch_all(pool)
            .await
    }

    /// Atomically insert the next published version for a key.
    ///
    /// Runs in a transaction holding a per-key advisory lock, so two
    /// concurrent publishes for the same key serialize and version numbers
    /// stay unique and gap-free. Publishes for different keys do not
    /// contend.
    pub async fn insert_next_published(
        pool: &PgPool,
        kind: &str,
        key: &str,
        schema_version: &str,
        body: &serde_json::Value,
        checksum: &str,
        created_by: &str,
    ) -> Result<DefinitionRow, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{kind}:{key}"))
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "INSERT INTO definitions \
                (id, kind, definition_key, version_num, schema_version, body, checksum, \
                 created_by, published_at) \
             SELECT $1, $2, $3, \
                    COALESCE(MAX(version_num), 0) + 1, \
                    $4, $5, $6, $7, now() \
             FROM definitions \
             WHERE kind = $2 AND definition_key = $3 AND version_num IS NOT NULL \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, DefinitionRow>(&query)
            .bind(Uuid::new_v4())
            .bind(kind)
            .bind(key)
            .bind(schema_version)
            .bind(body)
            .bind(checksum)
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }
}
