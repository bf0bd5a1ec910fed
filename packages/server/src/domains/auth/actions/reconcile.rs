//! Reconciliation of registration intents
//!
//! An intent stuck in `registered` means the identity registry accepted the
//! citizen but the local commit was never confirmed. If the credential exists
//! anyway (only the final mark was lost) the intent is committed; otherwise
//! it is flagged as orphaned for manual follow-up. Nothing is undone in the
//! registry.

use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::common::AuthResult;
use crate::domains::auth::models::IntentUpdate;
use crate::kernel::BaseAuthStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub committed: usize,
    pub orphaned: usize,
}

pub async fn reconcile_registrations(
    store: &dyn BaseAuthStore,
    grace: Duration,
) -> AuthResult<ReconcileReport> {
    let stale = store
        .find_stale_registered_intents(Utc::now() - grace)
        .await?;
    let mut report = ReconcileReport::default();

    for intent in stale {
        if store.find_credential(&intent.citizen_id).await?.is_some() {
            store.update_intent(intent.id, IntentUpdate::Committed).await?;
            report.committed += 1;
        } else {
            error!(
                intent_id = %intent.id,
                citizen_id = %intent.citizen_id,
                external_id = ?intent.external_id,
                folder_id = ?intent.folder_id,
                "orphaned external registration: identity exists in registry without local credential"
            );
            store.update_intent(intent.id, IntentUpdate::Orphaned).await?;
            report.orphaned += 1;
        }
    }

    if report != ReconcileReport::default() {
        info!(committed = report.committed, orphaned = report.orphaned, "registration intents reconciled");
    }
    Ok(report)
}
