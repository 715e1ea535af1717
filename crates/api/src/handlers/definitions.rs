//! Handlers for the authoring surface: wizard and page drafts, publishing,
//! and version lookups.
//!
//! Wizards and pages share one handler set; the definition kind is injected
//! per mounted router via an axum `Extension`.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use stepwise_core::schema;
use stepwise_core::search::{clamp_limit, clamp_offset};
use stepwise_core::store::{
    DefinitionSource, DefinitionStore, DraftDefinition, PublishedDefinition, VersionEntry,
};
use stepwise_core::types::Timestamp;
use stepwise_core::version::{DefinitionKind, VersionTag};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response schemas
// ---------------------------------------------------------------------------

/// Request body for creating a draft.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDraftRequest {
    /// Stable identifier (e.g. `travel-embedded-uk`).
    #[validate(length(min = 1, max = 255))]
    pub key: String,
    /// Definition body JSON.
    pub body: Value,
    /// Schema the body claims to conform to; defaults per kind.
    pub schema_version: Option<String>,
    pub created_by: Option<String>,
}

/// Request body for updating a draft.
#[derive(Debug, Deserialize)]
pub struct UpdateDraftRequest {
    pub body: Value,
    pub created_by: Option<String>,
}

/// Pagination parameters for listing drafts.
#[derive(Debug, Deserialize)]
pub struct ListDraftsParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A definition row (draft or published) as returned to authors.
#[derive(Debug, serde::Serialize)]
pub struct DefinitionResponse {
    pub key: String,
    pub version: String,
    pub status: &'static str,
    pub schema_version: String,
    pub body: Value,
    pub checksum: String,
    pub created_by: String,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}

impl From<DraftDefinition> for DefinitionResponse {
    fn from(draft: DraftDefinition) -> Self {
        Self {
            key: draft.key,
            version: VersionTag::Draft.to_string(),
            status: "draft",
            schema_version: draft.schema_version,
            body: draft.body,
            checksum: draft.checksum,
            created_by: draft.created_by,
            created_at: draft.created_at,
            published_at: None,
        }
    }
}

impl From<PublishedDefinition> for DefinitionResponse {
    fn from(def: PublishedDefinition) -> Self {
        Self {
            key: def.key,
            version: VersionTag::Published(def.version).to_string(),
            status: "published",
            schema_version: def.schema_version,
            body: def.body,
            checksum: def.checksum,
            created_by: def.created_by,
            created_at: def.created_at,
            published_at: Some(def.published_at),
        }
    }
}

/// One entry of a version listing.
#[derive(Debug, serde::Serialize)]
pub struct VersionEntryResponse {
    pub version: String,
    pub checksum: String,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
}

impl From<VersionEntry> for VersionEntryResponse {
    fn from(entry: VersionEntry) -> Self {
        Self {
            version: entry.version.to_string(),
            checksum: entry.checksum,
            created_at: entry.created_at,
            published_at: entry.published_at,
        }
    }
}

/// Response body for a successful publish.
#[derive(Debug, serde::Serialize)]
pub struct PublishResponse {
    pub key: String,
    pub version: String,
    pub status: &'static str,
    pub published_at: Timestamp,
    pub checksum: String,
}

// ---------------------------------------------------------------------------
// POST /{kind}
// ---------------------------------------------------------------------------

/// Create a new draft. Fails with 409 when one already exists for the key.
pub async fn create_draft(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Json(body): Json<CreateDraftRequest>,
) -> AppResult<impl IntoResponse> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let schema_version = body
        .schema_version
        .unwrap_or_else(|| kind.default_schema_version().to_string());
    if !schema::is_known(&schema_version) {
        return Err(AppError::BadRequest(format!(
            "Unknown schema_version '{schema_version}'"
        )));
    }

    let author = body.created_by.as_deref().unwrap_or("builder-ui");
    let draft = state
        .definitions
        .create_draft(kind, &body.key, body.body, &schema_version, author)
        .await?;

    tracing::info!(kind = %kind, key = %draft.key, author, "Draft created");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: DefinitionResponse::from(draft),
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /{kind}
// ---------------------------------------------------------------------------

/// List drafts of this kind, newest first.
pub async fn list_drafts(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Query(params): Query<ListDraftsParams>,
) -> AppResult<impl IntoResponse> {
    let limit = clamp_limit(params.limit, 100, 500);
    let offset = clamp_offset(params.offset);

    let drafts = state.definitions.list_drafts(kind, limit, offset).await?;
    let items: Vec<DefinitionResponse> = drafts.into_iter().map(Into::into).collect();

    tracing::debug!(kind = %kind, count = items.len(), "Listed drafts");
    Ok(Json(DataResponse { data: items }))
}

// ---------------------------------------------------------------------------
// GET /{kind}/{key}/draft
// ---------------------------------------------------------------------------

/// Get the draft of a key.
pub async fn get_draft(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let draft = state
        .definitions
        .get_draft(kind, &key)
        .await?
        .ok_or_else(|| {
            AppError::Core(stepwise_core::error::CoreError::NotFound {
                entity: kind.entity(),
                key: format!("{key} (draft)"),
            })
        })?;
    Ok(Json(DataResponse {
        data: DefinitionResponse::from(draft),
    }))
}

// ---------------------------------------------------------------------------
// PUT /{kind}/{key}/draft
// ---------------------------------------------------------------------------

/// Replace a draft's body; the checksum is recomputed.
pub async fn update_draft(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path(key): Path<String>,
    Json(body): Json<UpdateDraftRequest>,
) -> AppResult<impl IntoResponse> {
    let author = body.created_by.as_deref().unwrap_or("builder-ui");
    let draft = state
        .definitions
        .update_draft(kind, &key, body.body, author)
        .await?;

    tracing::info!(kind = %kind, key = %key, author, "Draft updated");
    Ok(Json(DataResponse {
        data: DefinitionResponse::from(draft),
    }))
}

// ---------------------------------------------------------------------------
// DELETE /{kind}/{key}/draft
// ---------------------------------------------------------------------------

/// Delete a draft. Published versions are unaffected.
pub async fn delete_draft(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.definitions.delete_draft(kind, &key).await?;
    tracing::info!(kind = %kind, key = %key, "Draft deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /{kind}/{key}/publish
// ---------------------------------------------------------------------------

/// Publish the draft as the next immutable version.
pub async fn publish(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let receipt = state.publisher.publish(kind, &key).await?;
    Ok(Json(DataResponse {
        data: PublishResponse {
            key: receipt.key,
            version: receipt.version.to_string(),
            status: receipt.status,
            published_at: receipt.published_at,
            checksum: receipt.checksum,
        },
    }))
}

// ---------------------------------------------------------------------------
// GET /{kind}/{key}/latest
// ---------------------------------------------------------------------------

/// Get the latest published version.
pub async fn get_latest(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let def = state
        .definitions
        .get_latest_published(kind, &key)
        .await?
        .ok_or_else(|| {
            AppError::Core(stepwise_core::error::CoreError::NotFound {
                entity: kind.entity(),
                key: format!("{key} (no published version)"),
            })
        })?;
    Ok(Json(DataResponse {
        data: DefinitionResponse::from(def),
    }))
}

// ---------------------------------------------------------------------------
// GET /{kind}/{key}/versions
// ---------------------------------------------------------------------------

/// List all versions of a key (draft + published, newest first).
pub async fn list_versions(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let entries = state.definitions.list_versions(kind, &key).await?;
    let items: Vec<VersionEntryResponse> = entries.into_iter().map(Into::into).collect();
    Ok(Json(DataResponse { data: items }))
}

// ---------------------------------------------------------------------------
// GET /{kind}/{key}/versions/{version}
// ---------------------------------------------------------------------------

/// Get one specific version (`draft`, `v1`, `v2`, ...).
pub async fn get_version(
    State(state): State<AppState>,
    Extension(kind): Extension<DefinitionKind>,
    Path((key, version)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let tag = VersionTag::parse(&version)?;
    let response = match tag {
        VersionTag::Draft => state
            .definitions
            .get_draft(kind, &key)
            .await?
            .map(DefinitionResponse::from),
        VersionTag::Published(n) => state
            .definitions
            .get_published(kind, &key, n)
            .await?
            .map(DefinitionResponse::from),
    }
    .ok_or_else(|| {
        AppError::Core(stepwise_core::error::CoreError::NotFound {
            entity: kind.entity(),
            key: format!("{key}@{version}"),
        })
    })?;

    Ok(Json(DataResponse { data: response }))
}
