//! Route definitions for the authoring surface.
//!
//! The same handler set serves both definition kinds; each router injects
//! its kind via an `Extension` layer.
//!
//! ```text
//! POST   /                              create_draft
//! GET    /                              list_drafts (?limit, offset)
//! GET    /{key}/draft                   get_draft
//! PUT    /{key}/draft                   update_draft
//! DELETE /{key}/draft                   delete_draft
//! POST   /{key}/publish                 publish
//! GET    /{key}/latest                  get_latest
//! GET    /{key}/versions                list_versions
//! GET    /{key}/versions/{version}      get_version
//! ```

use axum::extract::Extension;
use axum::routing::{get, post};
use axum::Router;

use stepwise_core::version::DefinitionKind;

use crate::handlers::definitions;
use crate::state::AppState;

/// Wizard authoring routes — mounted at `/wizards`.
pub fn wizard_router() -> Router<AppState> {
    kind_router(DefinitionKind::Wizard)
}

/// Page authoring routes — mounted at `/pages`.
pub fn page_router() -> Router<AppState> {
    kind_router(DefinitionKind::Page)
}

fn kind_router(kind: DefinitionKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(definitions::list_drafts).post(definitions::create_draft),
        )
        .route(
            "/{key}/draft",
            get(definitions::get_draft)
                .put(definitions::update_draft)
                .delete(definitions::delete_draft),
        )
        .route("/{key}/publish", post(definitions::publish))
        .route("/{key}/latest", get(definitions::get_latest))
        .route("/{key}/versions", get(definitions::list_versions))
        .route("/{key}/versions/{version}", get(definitions::get_version))
        .layer(Extension(kind))
}
