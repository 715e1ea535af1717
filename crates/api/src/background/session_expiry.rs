//! Periodic purge of expired wizard sessions.
//!
//! Expired sessions are already invisible to reads (`find_live` filters on
//! `expires_at`); this job reclaims the rows. Runs on a fixed interval
//! using `tokio::time::interval`.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use stepwise_db::repositories::SessionRepo;

/// Run the session expiry sweep loop until `cancel` is triggered.
pub async fn run(pool: PgPool, sweep_interval_secs: u64, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = sweep_interval_secs,
        "Session expiry sweeper started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session expiry sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match SessionRepo::delete_expired_before(&pool, Utc::now()).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Session expiry: purged expired sessions");
                        } else {
                            tracing::debug!("Session expiry: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Session expiry: sweep failed");
                    }
                }
            }
        }
    }
}
