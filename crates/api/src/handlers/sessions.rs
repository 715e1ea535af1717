//! Handlers for the runtime session surface consumed by the embeddable
//! widget: create/load/update a session, bind fields, run entry hooks, and
//! navigate.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use stepwise_core::session::SessionRecord;
use stepwise_core::version::VersionTag;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response schemas
// ---------------------------------------------------------------------------

/// Request body for creating a session.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub wizard_key: String,
    /// Pinned version tag (`v1`, `v2`, ...). Omitted means latest published.
    pub wizard_version: Option<String>,
    /// Initial `application` data.
    pub prefill: Option<Value>,
}

/// Request body for the durable state update (PUT).
#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub state: Value,
    pub current_step: Option<String>,
}

/// Request body for binding one field value.
#[derive(Debug, Deserialize)]
pub struct BindFieldRequest {
    pub path: String,
    pub value: Value,
}

/// Session view returned by `GET`: the durable record plus the step ids
/// currently visible under the session's state.
#[derive(Debug, serde::Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub visible_steps: Vec<String>,
}

// ---------------------------------------------------------------------------
// POST /sessions
// ---------------------------------------------------------------------------

/// Start a new wizard session.
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> AppResult<impl IntoResponse> {
    let version = match body.wizard_version.as_deref() {
        None => None,
        Some(raw) => match VersionTag::parse(raw)? {
            VersionTag::Published(n) => Some(n),
            VersionTag::Draft => {
                return Err(AppError::BadRequest(
                    "Sessions can only run published wizard versions".to_string(),
                ));
            }
        },
    };

    let record = state
        .sessions
        .start(&body.wizard_key, version, body.prefill)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: record })))
}

// ---------------------------------------------------------------------------
// GET /sessions/{id}
// ---------------------------------------------------------------------------

/// Load a session (resuming it from storage when necessary).
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state.sessions.load(id).await?;
    let visible_steps = state.sessions.visible_steps(id).await?;
    Ok(Json(DataResponse {
        data: SessionView {
            record,
            visible_steps,
        },
    }))
}

// ---------------------------------------------------------------------------
// PUT /sessions/{id}/state
// ---------------------------------------------------------------------------

/// Replace the session state (and optionally the current step).
///
/// Idempotent under retry: re-applying the same body yields the same row.
pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateSessionRequest>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .sessions
        .update_state(id, body.state, body.current_step)
        .await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// POST /sessions/{id}/bind
// ---------------------------------------------------------------------------

/// Bind one value into the state tree by dot-path.
pub async fn bind_field(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<BindFieldRequest>,
) -> AppResult<impl IntoResponse> {
    let record = state.sessions.bind_field(id, &body.path, body.value).await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// POST /sessions/{id}/enter
// ---------------------------------------------------------------------------

/// Run the current step's `onEnter` hooks.
pub async fn enter_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state.sessions.enter_current_step(id).await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// POST /sessions/{id}/advance
// ---------------------------------------------------------------------------

/// Advance to the next step; completes the wizard past the last step.
pub async fn advance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state.sessions.advance(id).await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// POST /sessions/{id}/back
// ---------------------------------------------------------------------------

/// Go back one step. 409 `NO_HISTORY` when there is nothing to pop.
pub async fn go_back(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state.sessions.go_back(id).await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// POST /sessions/{id}/abandon
// ---------------------------------------------------------------------------

/// Mark a session as abandoned.
pub async fn abandon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state.sessions.abandon(id).await?;
    Ok(Json(DataResponse { data: record }))
}
