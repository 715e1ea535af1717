//! Definition row model and conversions into the core store types.

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use stepwise_core::error::CoreError;
use stepwise_core::store::{DraftDefinition, PublishedDefinition, VersionEntry};
use stepwise_core::types::Timestamp;
use stepwise_core::version::{DefinitionKind, VersionTag};

/// A row from the `definitions` table (draft or published).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DefinitionRow {
    pub id: Uuid,
    pub kind: String,
    pub definition_key: String,
    /// `None` marks the draft row; published rows carry 1, 2, 3, ...
    pub version_num: Option<i32>,
    pub schema_version: String,
    pub body: serde_json::Value,
    pub checksum: String,
    pub created_by: String,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}

impl DefinitionRow {
    pub fn version_tag(&self) -> VersionTag {
        match self.version_num {
            None => VersionTag::Draft,
            Some(n) => VersionTag::Published(n as u32),
        }
    }

    /// View this row as a draft. Fails on published rows.
    pub fn into_draft(self) -> Result<DraftDefinition, CoreError> {
        if self.version_num.is_some() {
            return Err(CoreError::Internal(format!(
                "Definition row {} is published, not a draft",
                self.id
            )));
        }
        Ok(DraftDefinition {
            kind: DefinitionKind::from_str_db(&self.kind)?,
            key: self.definition_key,
            schema_version: self.schema_version,
            body: self.body,
            checksum: self.checksum,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }

    /// View this row as a published version. Fails on draft rows.
    pub fn into_published(self) -> Result<PublishedDefinition, CoreError> {
        let version = self.version_num.ok_or_else(|| {
            CoreError::Internal(format!("Definition row {} is a draft, not published", self.id))
        })?;
        let published_at = self.published_at.ok_or_else(|| {
            CoreError::Internal(format!("Published row {} has no published_at", self.id))
        })?;
        Ok(PublishedDefinition {
            kind: DefinitionKind::from_str_db(&self.kind)?,
            key: self.definition_key,
            version: version as u32,
            schema_version: self.schema_version,
            body: self.body,
            checksum: self.checksum,
            created_by: self.created_by,
            created_at: self.created_at,
            published_at,
        })
    }

    pub fn version_entry(&self) -> VersionEntry {
        VersionEntry {
            version: self.version_tag(),
            checksum: self.checksum.clone(),
            created_at: self.created_at,
            published_at: self.published_at,
        }
    }
}
