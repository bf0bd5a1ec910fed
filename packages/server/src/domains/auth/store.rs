//! Local auth store: Postgres implementation plus the lookup/validate
//! operations layered over any [`BaseAuthStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::models::{
    verify_password, AuthCredential, IntentUpdate, NewSession, RegistrationIntent, Session,
};
use crate::kernel::BaseAuthStore;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Postgres-backed store. Every query runs under a timeout.
#[derive(Clone)]
pub struct PostgresAuthStore {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresAuthStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> AuthResult<T>
    where
        F: Future<Output = sqlx::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => {
                tracing::error!(operation, timeout = ?self.timeout, "store operation timed out");
                Err(AuthError::Timeout(operation))
            }
        }
    }
}

#[async_trait]
impl BaseAuthStore for PostgresAuthStore {
    async fn create_credential(
        &self,
        citizen_id: &str,
        password_hash: &str,
    ) -> AuthResult<AuthCredential> {
        self.timed(
            "create credential",
            AuthCredential::create(citizen_id, password_hash, &self.pool),
        )
        .await
        .map_err(|e| match e {
            AuthError::DatabaseError(db) if is_unique_violation(&db) => {
                AuthError::Conflict(format!("credential for {} already exists", citizen_id))
            }
            other => other,
        })
    }

    async fn find_credential(&self, citizen_id: &str) -> AuthResult<Option<AuthCredential>> {
        self.timed(
            "find credential",
            AuthCredential::find_active(citizen_id, &self.pool),
        )
        .await
    }

    async fn touch_last_login(&self, citizen_id: &str) -> AuthResult<()> {
        self.timed(
            "update last login",
            AuthCredential::touch_last_login(citizen_id, &self.pool),
        )
        .await
    }

    async fn create_session(&self, session: NewSession) -> AuthResult<Session> {
        self.timed("create session", Session::create(&session, &self.pool))
            .await
    }

    async fn find_active_session(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        self.timed("find session", Session::find_active(session_id, &self.pool))
            .await
    }

    async fn touch_session(&self, session_id: Uuid) -> AuthResult<()> {
        self.timed("update last used", Session::touch(session_id, &self.pool))
            .await
    }

    async fn revoke_session(&self, session_id: Uuid) -> AuthResult<bool> {
        self.timed("revoke session", Session::revoke(session_id, &self.pool))
            .await
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.timed("cleanup sessions", Session::delete_expired(&self.pool))
            .await
    }

    async fn record_intent(
        &self,
        citizen_id: &str,
        nonce: Uuid,
    ) -> AuthResult<RegistrationIntent> {
        self.timed(
            "record intent",
            RegistrationIntent::record(citizen_id, nonce, &self.pool),
        )
        .await
    }

    async fn update_intent(&self, intent_id: Uuid, update: IntentUpdate) -> AuthResult<()> {
        self.timed(
            "update intent",
            RegistrationIntent::apply(intent_id, &update, &self.pool),
        )
        .await
    }

    async fn find_stale_registered_intents(
        &self,
        older_than: DateTime<Utc>,
    ) -> AuthResult<Vec<RegistrationIntent>> {
        self.timed(
            "find stale intents",
            RegistrationIntent::find_stale_registered(older_than, &self.pool),
        )
        .await
    }

    async fn ping(&self) -> AuthResult<()> {
        self.timed("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
        })
        .await
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

// =============================================================================
// Store operations
// =============================================================================

/// Active credential for `citizen_id`, or `NotFound`.
pub async fn lookup(store: &dyn BaseAuthStore, citizen_id: &str) -> AuthResult<AuthCredential> {
    store
        .find_credential(citizen_id)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("credential {}", citizen_id)))
}

/// Check `password` against this exact record.
///
/// On success the last-login timestamp is bumped; a failure to do so is
/// logged and does not affect the outcome.
pub async fn validate_password(
    store: &dyn BaseAuthStore,
    credential: &AuthCredential,
    password: &str,
) -> AuthResult<()> {
    if !verify_password(password, &credential.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    if let Err(e) = store.touch_last_login(&credential.citizen_id).await {
        tracing::warn!(citizen_id = %credential.citizen_id, error = %e, "failed to update last login");
    }
    Ok(())
}

/// Live session by id, or `NotFound`. Bumps last-used best-effort.
pub async fn validate_session(store: &dyn BaseAuthStore, session_id: Uuid) -> AuthResult<Session> {
    let session = store
        .find_active_session(session_id)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("session {}", session_id)))?;

    if let Err(e) = store.touch_session(session_id).await {
        tracing::warn!(%session_id, error = %e, "failed to update session last used");
    }
    Ok(session)
}
