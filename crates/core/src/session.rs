//! Session status and the persisted session record.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::Timestamp;
use crate::version::VersionTag;

/// Default session time-to-live in hours.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a wizard session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Started,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(CoreError::Validation(format!(
                "Invalid session status '{s}'. Must be one of: started, completed, abandoned"
            ))),
        }
    }

    /// Terminal states accept no further mutation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// The durable shape of one session. This layout is the contract that
/// resume links and downstream consumers depend on; field renames break
/// compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub wizard_key: String,
    pub wizard_version: VersionTag,
    pub status: SessionStatus,
    pub current_step: Option<String>,
    /// The full mutable state tree: `{application: {...}, context: {...}}`.
    pub state: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Build the initial state tree for a new session.
///
/// `prefill` seeds `application`; anything that is not a JSON object is
/// ignored in favour of an empty one.
pub fn initial_state(prefill: Option<Value>) -> Value {
    let application = match prefill {
        Some(v @ Value::Object(_)) => v,
        _ => json!({}),
    };
    json!({ "application": application, "context": {} })
}
