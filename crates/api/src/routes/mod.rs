//! Route definitions, one module per resource.

pub mod definitions;
pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// All `/api/v1` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/wizards", definitions::wizard_router())
        .nest("/pages", definitions::page_router())
        .nest("/sessions", sessions::router())
}
