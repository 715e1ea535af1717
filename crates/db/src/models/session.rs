//! Session row model and conversions to/from the core session record.

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use stepwise_core::error::CoreError;
use stepwise_core::session::{SessionRecord, SessionStatus};
use stepwise_core::types::Timestamp;
use stepwise_core::version::VersionTag;

/// A row from the `wizard_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub wizard_key: String,
    pub wizard_version: String,
    pub status: String,
    pub current_step: Option<String>,
    pub state: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

impl SessionRow {
    pub fn into_record(self) -> Result<SessionRecord, CoreError> {
        Ok(SessionRecord {
            session_id: self.id,
            wizard_key: self.wizard_key,
            wizard_version: VersionTag::parse(&self.wizard_version)?,
            status: SessionStatus::from_str_db(&self.status)?,
            current_step: self.current_step,
            state: self.state,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        })
    }
}
