//! Login action

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::jwt::hash_opaque_token;
use crate::domains::auth::models::NewSession;
use crate::domains::auth::store::{lookup, validate_password};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone)]
pub struct Login {
    pub citizen_id: String,
    pub password: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub citizen_id: String,
    pub session_id: Uuid,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authenticate with citizen id and password and open a session.
///
/// Unknown ids and wrong passwords are indistinguishable to the caller.
pub async fn login(input: Login, deps: &ServerDeps) -> AuthResult<LoginResult> {
    let citizen_id = input.citizen_id.trim().to_string();
    if citizen_id.is_empty() || input.password.is_empty() {
        return Err(AuthError::Validation(
            "citizen_id and password are required".into(),
        ));
    }

    let credential = match lookup(deps.store.as_ref(), &citizen_id).await {
        Ok(credential) => credential,
        Err(AuthError::NotFound(_)) => {
            info!(%citizen_id, "login for unknown citizen");
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => return Err(e),
    };

    validate_password(deps.store.as_ref(), &credential, &input.password).await?;

    if !credential.email_verified {
        return Err(AuthError::EmailNotVerified);
    }

    // The session row keys on a random opaque value; the JWT is the bearer.
    let opaque = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let session = deps
        .store
        .create_session(NewSession {
            credential_id: credential.citizen_id.clone(),
            token_hash: hash_opaque_token(&opaque),
            user_agent: input.user_agent,
            ip_address: input.ip_address,
            expires_at: Utc::now() + deps.tokens.session_ttl(),
        })
        .await?;

    // Profile data lives with the identity registry, not here.
    let (session_token, expires_at) =
        deps.tokens
            .issue_session(&credential.citizen_id, session.id, "", "", "")?;

    info!(%citizen_id, session_id = %session.id, "login succeeded");

    Ok(LoginResult {
        citizen_id: credential.citizen_id,
        session_id: session.id,
        session_token,
        expires_at,
    })
}
