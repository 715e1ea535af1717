//! PostgreSQL implementations of the core store traits.
//!
//! Thin adapters over the repositories: they translate between the core's
//! typed store vocabulary and rows, and map database failures into the
//! domain error taxonomy (unique-violation on the draft index becomes
//! `Conflict`; everything else is logged and surfaced as `Internal`).

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use stepwise_core::checksum;
use stepwise_core::error::CoreError;
use stepwise_core::session::SessionRecord;
use stepwise_core::store::{
    DefinitionSource, DefinitionStore, DraftDefinition, PublishedDefinition, SessionStore,
    VersionEntry,
};
use stepwise_core::version::DefinitionKind;

use crate::repositories::{DefinitionRepo, SessionRepo};

/// Map a sqlx error to the domain taxonomy.
///
/// Unique violations against `uq_`-prefixed constraints are conflicts (the
/// draft partial index and the key+version constraint); anything else is an
/// internal failure.
fn map_db_err(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                return CoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ));
            }
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Internal("A database error occurred".to_string())
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// [`DefinitionStore`] backed by the `definitions` table.
#[derive(Clone)]
pub struct PgDefinitionStore {
    pool: PgPool,
}

impl PgDefinitionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DefinitionSource for PgDefinitionStore {
    async fn get_published(
        &self,
        kind: DefinitionKind,
        key: &str,
        version: u32,
    ) -> Result<Option<PublishedDefinition>, CoreError> {
        let row = DefinitionRepo::find_published(&self.pool, kind.as_str(), key, version as i32)
            .await
            .map_err(map_db_err)?;
        row.map(|r| r.into_published()).transpose()
    }

    async fn get_latest_published(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Option<PublishedDefinition>, CoreError> {
        let row = DefinitionRepo::find_latest_published(&self.pool, kind.as_str(), key)
            .await
            .map_err(map_db_err)?;
        row.map(|r| r.into_published()).transpose()
    }
}

#[async_trait]
impl DefinitionStore for PgDefinitionStore {
    async fn get_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Option<DraftDefinition>, CoreError> {
        let row = DefinitionRepo::find_draft(&self.pool, kind.as_str(), key)
            .await
            .map_err(map_db_err)?;
        row.map(|r| r.into_draft()).transpose()
    }

    async fn create_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        schema_version: &str,
        author: &str,
    ) -> Result<DraftDefinition, CoreError> {
        let body_checksum = checksum::of_value(&body);
        let row = DefinitionRepo::insert_draft(
            &self.pool,
            kind.as_str(),
            key,
            schema_version,
            &body,
            &body_checksum,
            author,
        )
        .await
        .map_err(|e| match map_db_err(e) {
            CoreError::Conflict(_) => CoreError::Conflict(format!(
                "Draft already exists for {kind} '{key}'. Use update instead."
            )),
            other => other,
        })?;
        row.into_draft()
    }

    async fn update_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        author: &str,
    ) -> Result<DraftDefinition, CoreError> {
        let body_checksum = checksum::of_value(&body);
        let row = DefinitionRepo::update_draft(
            &self.pool,
            kind.as_str(),
            key,
            &body,
            &body_checksum,
            author,
        )
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::NotFound {
            entity: kind.entity(),
            key: format!("{key} (draft)"),
        })?;
        row.into_draft()
    }

    async fn delete_draft(&self, kind: DefinitionKind, key: &str) -> Result<(), CoreError> {
        let deleted = DefinitionRepo::delete_draft(&self.pool, kind.as_str(), key)
            .await
            .map_err(map_db_err)?;
        if deleted {
            Ok(())
        } else {
            Err(CoreError::NotFound {
                entity: kind.entity(),
                key: format!("{key} (draft)"),
            })
        }
    }

    async fn list_drafts(
        &self,
        kind: DefinitionKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DraftDefinition>, CoreError> {
        let rows = DefinitionRepo::list_drafts(&self.pool, kind.as_str(), limit, offset)
            .await
            .map_err(map_db_err)?;
        rows.into_iter().map(|r| r.into_draft()).collect()
    }

    async fn list_versions(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Vec<VersionEntry>, CoreError> {
        let rows = DefinitionRepo::list_versions(&self.pool, kind.as_str(), key)
            .await
            .map_err(map_db_err)?;
        Ok(rows.iter().map(|r| r.version_entry()).collect())
    }

    async fn create_next_published_version(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        schema_version: &str,
        checksum_hex: &str,
        created_by: &str,
    ) -> Result<PublishedDefinition, CoreError> {
        let row = DefinitionRepo::insert_next_published(
            &self.pool,
            kind.as_str(),
            key,
            schema_version,
            &body,
            checksum_hex,
            created_by,
        )
        .await
        .map_err(map_db_err)?;
        row.into_published()
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// [`SessionStore`] backed by the `wizard_sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, record: &SessionRecord) -> Result<(), CoreError> {
        SessionRepo::create(
            &self.pool,
            record.session_id,
            &record.wizard_key,
            &record.wizard_version.to_string(),
            record.status.as_str(),
            record.current_step.as_deref(),
            &record.state,
            record.expires_at,
        )
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Option<SessionRecord>, CoreError> {
        let row = SessionRepo::find_live(&self.pool, session_id)
            .await
            .map_err(map_db_err)?;
        row.map(|r| r.into_record()).transpose()
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), CoreError> {
        let updated = SessionRepo::save(
            &self.pool,
            record.session_id,
            record.status.as_str(),
            record.current_step.as_deref(),
            &record.state,
        )
        .await
        .map_err(map_db_err)?;
        match updated {
            Some(_) => Ok(()),
            None => Err(CoreError::NotFound {
                entity: "Session",
                key: record.session_id.to_string(),
            }),
        }
    }
}
