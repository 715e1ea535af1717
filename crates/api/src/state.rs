use std::sync::Arc;

use stepwise_engine::publish::PublishPipeline;
use stepwise_engine::session::SessionManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: stepwise_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Definition store (drafts + published versions).
    pub definitions: Arc<stepwise_db::store::PgDefinitionStore>,
    /// Publish pipeline over the definition store.
    pub publisher: Arc<PublishPipeline>,
    /// Owner of all running wizard sessions on this node.
    pub sessions: Arc<SessionManager>,
}
