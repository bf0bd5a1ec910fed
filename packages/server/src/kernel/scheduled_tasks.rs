//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! - Session cleanup: deletes expired and revoked sessions
//! - Registration reconciliation: flags intents left in `registered`
//!
//! Both are idempotent, so overlapping runs across replicas are harmless.

use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::auth::actions::reconcile_registrations;
use crate::kernel::BaseAuthStore;

/// Every 15 minutes, on the minute.
pub const RECONCILE_SCHEDULE: &str = "0 */15 * * * *";

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Cron expression (with seconds) for session cleanup
    pub cleanup_schedule: String,
    /// How long an intent may sit in `registered` before it is reconciled
    pub orphan_grace: Duration,
}

/// Start all scheduled tasks
pub async fn start_scheduler(
    store: Arc<dyn BaseAuthStore>,
    settings: ScheduleSettings,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let cleanup_store = store.clone();
    let cleanup_job = Job::new_async(settings.cleanup_schedule.as_str(), move |_uuid, _lock| {
        let store = cleanup_store.clone();
        Box::pin(async move {
            if let Err(e) = run_session_cleanup(store.as_ref()).await {
                tracing::error!("Session cleanup task failed: {}", e);
            }
        })
    })?;

    scheduler.add(cleanup_job).await?;

    let reconcile_store = store.clone();
    let grace = settings.orphan_grace;
    let reconcile_job = Job::new_async(RECONCILE_SCHEDULE, move |_uuid, _lock| {
        let store = reconcile_store.clone();
        Box::pin(async move {
            if let Err(e) = reconcile_registrations(store.as_ref(), grace).await {
                tracing::error!("Registration reconciliation task failed: {}", e);
            }
        })
    })?;

    scheduler.add(reconcile_job).await?;
    scheduler.start().await?;

    tracing::info!(
        cleanup = %settings.cleanup_schedule,
        reconcile = RECONCILE_SCHEDULE,
        "Scheduled tasks started"
    );
    Ok(scheduler)
}

/// Delete expired and revoked sessions
pub async fn run_session_cleanup(store: &dyn BaseAuthStore) -> Result<u64> {
    let deleted = store.cleanup_expired().await?;
    if deleted > 0 {
        tracing::info!(deleted, "Expired sessions cleaned up");
    } else {
        tracing::debug!("No expired sessions to clean up");
    }
    Ok(deleted)
}
