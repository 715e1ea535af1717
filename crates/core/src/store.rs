//! Storage contracts implemented by the persistence layer.
//!
//! The core and engine never talk to a database directly; they see these
//! traits. `stepwise-db` provides the PostgreSQL implementations, and the
//! engine's tests run against in-memory ones.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::session::SessionRecord;
use crate::types::Timestamp;
use crate::version::{DefinitionKind, VersionTag};

// ---------------------------------------------------------------------------
// Definition rows as seen by callers
// ---------------------------------------------------------------------------

/// An immutable published definition version.
#[derive(Debug, Clone)]
pub struct PublishedDefinition {
    pub kind: DefinitionKind,
    pub key: String,
    pub version: u32,
    pub schema_version: String,
    pub body: Value,
    pub checksum: String,
    pub created_by: String,
    pub created_at: Timestamp,
    pub published_at: Timestamp,
}

/// The single mutable draft of a definition key.
#[derive(Debug, Clone)]
pub struct DraftDefinition {
    pub kind: DefinitionKind,
    pub key: String,
    pub schema_version: String,
    pub body: Value,
    pub checksum: String,
    pub created_by: String,
    pub created_at: Timestamp,
}

/// One entry of a version listing (draft or published).
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub version: VersionTag,
    pub checksum: String,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Read-only resolution (runtime path)
// ---------------------------------------------------------------------------

/// Read access to published definition versions.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Fetch one exact published version.
    async fn get_published(
        &self,
        kind: DefinitionKind,
        key: &str,
        version: u32,
    ) -> Result<Option<PublishedDefinition>, CoreError>;

    /// Fetch the highest-numbered published version.
    async fn get_latest_published(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Option<PublishedDefinition>, CoreError>;
}

// ---------------------------------------------------------------------------
// Full authoring store (publish path)
// ---------------------------------------------------------------------------

/// Draft lifecycle plus version assignment, on top of [`DefinitionSource`].
///
/// Implementations must guarantee:
/// - at most one draft per `(kind, key)`;
/// - published rows are append-only and never mutated;
/// - `create_next_published_version` assigns `max(published) + 1`
///   (starting at 1) and is serialized per `(kind, key)` so concurrent
///   publishes can never share a version number.
#[async_trait]
pub trait DefinitionStore: DefinitionSource {
    async fn get_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Option<DraftDefinition>, CoreError>;

    /// Create a new draft. Fails with [`CoreError::Conflict`] when a draft
    /// already exists for the key; callers then use [`Self::update_draft`].
    async fn create_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        schema_version: &str,
        author: &str,
    ) -> Result<DraftDefinition, CoreError>;

    /// Replace a draft's body, recomputing its checksum.
    async fn update_draft(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        author: &str,
    ) -> Result<DraftDefinition, CoreError>;

    async fn delete_draft(&self, kind: DefinitionKind, key: &str) -> Result<(), CoreError>;

    /// List drafts of a kind, newest first.
    async fn list_drafts(
        &self,
        kind: DefinitionKind,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DraftDefinition>, CoreError>;

    /// List every version of a key: the draft (if any) first, then
    /// published versions newest-first.
    async fn list_versions(
        &self,
        kind: DefinitionKind,
        key: &str,
    ) -> Result<Vec<VersionEntry>, CoreError>;

    /// Atomically insert the next published version with the given
    /// already-validated body and checksum. The draft row is left
    /// untouched.
    async fn create_next_published_version(
        &self,
        kind: DefinitionKind,
        key: &str,
        body: Value,
        schema_version: &str,
        checksum: &str,
        created_by: &str,
    ) -> Result<PublishedDefinition, CoreError>;
}

// ---------------------------------------------------------------------------
// Session persistence
// ---------------------------------------------------------------------------

/// Durable storage for wizard sessions.
///
/// `save` is a full-record replacement and must be idempotent under retry:
/// re-applying the same record produces the same stored row (modulo
/// `updated_at`).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: &SessionRecord) -> Result<(), CoreError>;

    /// Load a session; expired sessions are treated as absent.
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionRecord>, CoreError>;

    async fn save(&self, record: &SessionRecord) -> Result<(), CoreError>;
}
