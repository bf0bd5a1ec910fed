//! Initiate registration action

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::publish_best_effort;
use crate::common::{AuthError, AuthResult};
use crate::domains::auth::events::{AuthEvent, RegistrationRequested};
use crate::domains::auth::models::CitizenProfile;
use crate::kernel::ServerDeps;

/// Result of initiating a registration
#[derive(Debug, Clone)]
pub struct RegistrationInitiated {
    pub citizen_id: String,
    /// Only ever delivered to the citizen by email
    pub pending_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Validate the profile, refuse known ids and issue a pending registration token.
///
/// Nothing is written locally. The token reaches the citizen through the
/// `RegistrationRequested` event, whose delivery is best-effort.
pub async fn initiate_registration(
    profile: CitizenProfile,
    deps: &ServerDeps,
) -> AuthResult<RegistrationInitiated> {
    let profile = profile.normalized();
    profile.validate()?;

    if deps.store.find_credential(&profile.citizen_id).await?.is_some() {
        return Err(AuthError::Conflict(format!(
            "citizen {} is already registered",
            profile.citizen_id
        )));
    }

    let expires_at = Utc::now() + deps.settings.pending_ttl;
    let pending_token = deps
        .tokens
        .issue_pending(&profile, Uuid::new_v4(), expires_at)?;

    info!(citizen_id = %profile.citizen_id, %expires_at, "registration initiated");

    let citizen_id = profile.citizen_id.clone();
    publish_best_effort(
        deps,
        AuthEvent::RegistrationRequested(RegistrationRequested {
            verification_url: deps.settings.verification_url(&pending_token),
            token: pending_token.clone(),
            expires_at,
            profile,
        }),
    )
    .await;

    Ok(RegistrationInitiated {
        citizen_id,
        pending_token,
        expires_at,
    })
}
