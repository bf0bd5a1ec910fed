// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The registration saga lives in domains/auth/actions and composes these.
//
// Naming convention: Base* for trait names (e.g., BaseAuthStore, BaseEmailGateway)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::common::AuthResult;
use crate::domains::auth::events::AuthEvent;
use crate::domains::auth::models::{
    AuthCredential, IntentUpdate, NewSession, RegistrationIntent, Session,
};

pub use identity_registry::{Availability, RegisterIdentity, RegisteredIdentity};

// =============================================================================
// Auth Store Trait (Infrastructure - credentials, sessions, intent log)
// =============================================================================

#[async_trait]
pub trait BaseAuthStore: Send + Sync {
    /// Insert a verified, active credential. Duplicates fail with a conflict.
    async fn create_credential(
        &self,
        citizen_id: &str,
        password_hash: &str,
    ) -> AuthResult<AuthCredential>;

    /// Active credential for `citizen_id`, if any
    async fn find_credential(&self, citizen_id: &str) -> AuthResult<Option<AuthCredential>>;

    async fn touch_last_login(&self, citizen_id: &str) -> AuthResult<()>;

    async fn create_session(&self, session: NewSession) -> AuthResult<Session>;

    /// Session that is neither expired nor revoked
    async fn find_active_session(&self, session_id: Uuid) -> AuthResult<Option<Session>>;

    async fn touch_session(&self, session_id: Uuid) -> AuthResult<()>;

    /// Returns true when a live session was revoked
    async fn revoke_session(&self, session_id: Uuid) -> AuthResult<bool>;

    /// Delete expired or revoked sessions. Returns rows deleted.
    async fn cleanup_expired(&self) -> AuthResult<u64>;

    async fn record_intent(&self, citizen_id: &str, nonce: Uuid)
        -> AuthResult<RegistrationIntent>;

    async fn update_intent(&self, intent_id: Uuid, update: IntentUpdate) -> AuthResult<()>;

    async fn find_stale_registered_intents(
        &self,
        older_than: DateTime<Utc>,
    ) -> AuthResult<Vec<RegistrationIntent>>;

    /// Cheap liveness probe
    async fn ping(&self) -> AuthResult<()>;
}

// =============================================================================
// Identity Registry Trait (Infrastructure - external citizen registry)
// =============================================================================

#[async_trait]
pub trait BaseIdentityRegistry: Send + Sync {
    async fn validate_availability(&self, citizen_id: &str) -> Result<Availability>;

    async fn register_identity(&self, request: &RegisterIdentity) -> Result<RegisteredIdentity>;
}

// =============================================================================
// Event Publisher Trait (Infrastructure - broker fan-out)
// =============================================================================

#[async_trait]
pub trait BaseEventPublisher: Send + Sync {
    async fn publish(&self, event: &AuthEvent) -> Result<()>;

    /// Whether the broker link is currently up
    async fn is_connected(&self) -> bool {
        true
    }
}

// =============================================================================
// Email Gateway Trait (Infrastructure - outbound mail)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait BaseEmailGateway: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}
