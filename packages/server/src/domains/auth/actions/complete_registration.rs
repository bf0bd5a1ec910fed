//! Complete registration action
//!
//! The local credential is written only after this execution's external
//! identity registration reported success. A local failure after that point
//! leaves the external record orphaned; the intent log stays `registered`
//! so the reconciliation job can flag it.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{call_registry, publish_best_effort};
use crate::common::{AuthError, AuthResult};
use crate::domains::auth::events::{AuthEvent, RegistrationCompleted};
use crate::domains::auth::jwt::hash_opaque_token;
use crate::domains::auth::models::{
    hash_password, validate_password_strength, CitizenProfile, IntentUpdate, NewSession,
};
use crate::kernel::{RegisterIdentity, ServerDeps};

#[derive(Debug, Clone)]
pub struct CompleteRegistration {
    pub token: String,
    pub password: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistrationComplete {
    pub session_token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub profile: CitizenProfile,
    pub external_id: String,
    pub folder_id: String,
}

pub async fn complete_registration(
    input: CompleteRegistration,
    deps: &ServerDeps,
) -> AuthResult<RegistrationComplete> {
    validate_password_strength(&input.password)?;

    let pending = deps.tokens.validate_pending(&input.token)?;
    let profile = pending.profile;
    let citizen_id = profile.citizen_id.clone();

    let availability = call_registry(
        deps.settings.identity_timeout,
        "identity availability check",
        deps.identity.validate_availability(&citizen_id),
    )
    .await?;
    if !availability.available {
        info!(%citizen_id, message = %availability.message, "identity not available");
        return Err(AuthError::Conflict(format!(
            "citizen {} cannot be registered: {}",
            citizen_id, availability.message
        )));
    }

    // Hash before any external effect.
    let password_hash = hash_password(&input.password)?;

    let intent = deps
        .store
        .record_intent(&citizen_id, pending.nonce)
        .await
        .map_err(|e| {
            error!(%citizen_id, error = %e, "failed to record registration intent");
            AuthError::Upstream(format!("could not record registration intent: {}", e))
        })?;

    let registered = match call_registry(
        deps.settings.identity_timeout,
        "identity registration",
        deps.identity.register_identity(&RegisterIdentity {
            citizen_id: citizen_id.clone(),
            full_name: profile.full_name.clone(),
            address: profile.address.clone().unwrap_or_default(),
        }),
    )
    .await
    {
        Ok(registered) => registered,
        Err(e) => {
            mark_intent(
                deps,
                intent.id,
                IntentUpdate::Failed {
                    error: e.to_string(),
                },
            )
            .await;
            return Err(e);
        }
    };

    mark_intent(
        deps,
        intent.id,
        IntentUpdate::Registered {
            external_id: registered.external_id.clone(),
            folder_id: registered.folder_id.clone(),
        },
    )
    .await;

    // Orphaned even on a duplicate: an existing credential belongs to another intent.
    let credential = match deps
        .store
        .create_credential(&citizen_id, &password_hash)
        .await
    {
        Ok(credential) => credential,
        Err(e) => {
            error!(
                %citizen_id,
                external_id = %registered.external_id,
                intent_id = %intent.id,
                error = %e,
                "identity registered externally but local credential was not created"
            );
            mark_intent(deps, intent.id, IntentUpdate::Orphaned).await;
            return Err(e);
        }
    };

    mark_intent(deps, intent.id, IntentUpdate::Committed).await;

    let session = deps
        .store
        .create_session(NewSession {
            credential_id: credential.citizen_id.clone(),
            token_hash: hash_opaque_token(&input.token),
            user_agent: input.user_agent,
            ip_address: input.ip_address,
            expires_at: Utc::now() + deps.tokens.session_ttl(),
        })
        .await?;

    let (session_token, expires_at) = deps.tokens.issue_session(
        &citizen_id,
        session.id,
        &profile.email,
        &registered.folder_id,
        &profile.full_name,
    )?;

    info!(%citizen_id, session_id = %session.id, folder_id = %registered.folder_id, "registration completed");

    publish_best_effort(
        deps,
        AuthEvent::RegistrationCompleted(RegistrationCompleted {
            profile: profile.clone(),
            external_id: registered.external_id.clone(),
            folder_id: registered.folder_id.clone(),
        }),
    )
    .await;

    Ok(RegistrationComplete {
        session_token,
        session_id: session.id,
        expires_at,
        profile,
        external_id: registered.external_id,
        folder_id: registered.folder_id,
    })
}

async fn mark_intent(deps: &ServerDeps, intent_id: Uuid, update: IntentUpdate) {
    let status = update.status();
    if let Err(e) = deps.store.update_intent(intent_id, update).await {
        warn!(%intent_id, %status, error = %e, "failed to update registration intent");
    }
}
