//! Session token actions: logout and introspection

use tracing::info;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::jwt::SessionClaims;
use crate::domains::auth::store::validate_session;
use crate::kernel::ServerDeps;

/// Revoke the session behind a session token. Revoking twice is fine.
pub async fn logout(session_token: &str, deps: &ServerDeps) -> AuthResult<()> {
    let claims = deps.tokens.validate_session(session_token)?;
    let revoked = deps.store.revoke_session(claims.session_id).await?;

    info!(citizen_id = %claims.citizen_id, session_id = %claims.session_id, revoked, "logout");
    Ok(())
}

/// Claims of a session token whose session row is still live.
pub async fn introspect(session_token: &str, deps: &ServerDeps) -> AuthResult<SessionClaims> {
    let claims = deps.tokens.validate_session(session_token)?;

    match validate_session(deps.store.as_ref(), claims.session_id).await {
        Ok(_) => Ok(claims),
        Err(AuthError::NotFound(_)) => Err(AuthError::SessionInvalid),
        Err(e) => Err(e),
    }
}
