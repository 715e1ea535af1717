//! Route definitions for the runtime session surface.
//!
//! Mounted at `/sessions` by `api_routes()`.
//!
//! ```text
//! POST   /                              create_session
//! GET    /{id}                          get_session
//! PUT    /{id}/state                    update_session
//! POST   /{id}/bind                     bind_field
//! POST   /{id}/enter                    enter_step
//! POST   /{id}/advance                  advance
//! POST   /{id}/back                     go_back
//! POST   /{id}/abandon                  abandon
//! ```

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Session routes — mounted at `/sessions`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(sessions::create_session))
        .route("/{id}", get(sessions::get_session))
        .route("/{id}/state", put(sessions::update_session))
        .route("/{id}/bind", post(sessions::bind_field))
        .route("/{id}/enter", post(sessions::enter_step))
        .route("/{id}/advance", post(sessions::advance))
        .route("/{id}/back", post(sessions::go_back))
        .route("/{id}/abandon", post(sessions::abandon))
}
