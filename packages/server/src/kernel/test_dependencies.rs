// TestDependencies - mock implementations for testing
//
// Provides in-memory and recording doubles that can be injected into
// ServerDeps for tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{
    Availability, BaseAuthStore, BaseEmailGateway, BaseEventPublisher, BaseIdentityRegistry,
    EmailMessage, RegisterIdentity, RegisteredIdentity, RegistrationSettings, ServerDeps,
};
use crate::common::{AuthError, AuthResult};
use crate::domains::auth::events::AuthEvent;
use crate::domains::auth::models::{
    AuthCredential, IntentUpdate, NewSession, RegistrationIntent, Session,
};
use crate::domains::auth::TokenService;

// =============================================================================
// Mock Auth Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    credentials: HashMap<String, AuthCredential>,
    sessions: HashMap<Uuid, Session>,
    intents: Vec<RegistrationIntent>,
    last_login_touches: usize,
}

/// In-memory auth store with fault injection.
#[derive(Default)]
pub struct MockAuthStore {
    state: Mutex<StoreState>,
    fail_create_credential: Mutex<bool>,
    fail_record_intent: Mutex<bool>,
    fail_touches: Mutex<bool>,
}

impl MockAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_credential` fail as if the database went away
    pub fn failing_credential_writes(self) -> Self {
        *self.fail_create_credential.lock().unwrap() = true;
        self
    }

    pub fn failing_intent_log(self) -> Self {
        *self.fail_record_intent.lock().unwrap() = true;
        self
    }

    /// Make last-login/last-used bumps fail
    pub fn failing_touches(self) -> Self {
        *self.fail_touches.lock().unwrap() = true;
        self
    }

    /// Seed a credential directly
    pub fn with_credential(self, citizen_id: &str, password_hash: &str, email_verified: bool) -> Self {
        let now = Utc::now();
        self.state.lock().unwrap().credentials.insert(
            citizen_id.to_string(),
            AuthCredential {
                citizen_id: citizen_id.to_string(),
                password_hash: password_hash.to_string(),
                email_verified,
                is_active: true,
                created_at: now,
                updated_at: now,
                last_login: None,
            },
        );
        self
    }

    pub fn credential(&self, citizen_id: &str) -> Option<AuthCredential> {
        self.state.lock().unwrap().credentials.get(citizen_id).cloned()
    }

    pub fn credential_count(&self) -> usize {
        self.state.lock().unwrap().credentials.len()
    }

    pub fn session(&self, id: Uuid) -> Option<Session> {
        self.state.lock().unwrap().sessions.get(&id).cloned()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.state.lock().unwrap().sessions.values().cloned().collect()
    }

    pub fn intents(&self) -> Vec<RegistrationIntent> {
        self.state.lock().unwrap().intents.clone()
    }

    pub fn last_login_touches(&self) -> usize {
        self.state.lock().unwrap().last_login_touches
    }

    /// Move a session's expiry, e.g. into the past
    pub fn set_session_expiry(&self, id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(session) = self.state.lock().unwrap().sessions.get_mut(&id) {
            session.expires_at = expires_at;
        }
    }

    /// Backdate an intent's last update
    pub fn age_intent(&self, id: Uuid, by: Duration) {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.iter_mut().find(|i| i.id == id) {
            intent.updated_at = intent.updated_at - by;
        }
    }

    /// Insert an intent already in `registered`, as left by a crashed commit
    pub fn with_registered_intent(self, citizen_id: &str, age: Duration) -> Self {
        let at = Utc::now() - age;
        self.state.lock().unwrap().intents.push(RegistrationIntent {
            id: Uuid::new_v4(),
            citizen_id: citizen_id.to_string(),
            nonce: Uuid::new_v4(),
            status: "registered".to_string(),
            external_id: Some(format!("ext-{}", citizen_id)),
            folder_id: Some(format!("folder-{}", citizen_id)),
            error: None,
            created_at: at,
            updated_at: at,
        });
        self
    }
}

#[async_trait]
impl BaseAuthStore for MockAuthStore {
    async fn create_credential(
        &self,
        citizen_id: &str,
        password_hash: &str,
    ) -> AuthResult<AuthCredential> {
        if *self.fail_create_credential.lock().unwrap() {
            return Err(AuthError::DatabaseError(sqlx::Error::PoolTimedOut));
        }

        let mut state = self.state.lock().unwrap();
        if state.credentials.contains_key(citizen_id) {
            return Err(AuthError::Conflict(format!(
                "credential for {} already exists",
                citizen_id
            )));
        }

        let now = Utc::now();
        let credential = AuthCredential {
            citizen_id: citizen_id.to_string(),
            password_hash: password_hash.to_string(),
            email_verified: true,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login: None,
        };
        state
            .credentials
            .insert(citizen_id.to_string(), credential.clone());
        Ok(credential)
    }

    async fn find_credential(&self, citizen_id: &str) -> AuthResult<Option<AuthCredential>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .credentials
            .get(citizen_id)
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn touch_last_login(&self, citizen_id: &str) -> AuthResult<()> {
        if *self.fail_touches.lock().unwrap() {
            return Err(AuthError::Timeout("update last login"));
        }
        let mut state = self.state.lock().unwrap();
        state.last_login_touches += 1;
        if let Some(credential) = state.credentials.get_mut(citizen_id) {
            credential.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn create_session(&self, session: NewSession) -> AuthResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            credential_id: session.credential_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            is_revoked: false,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            created_at: now,
            last_used: now,
        };
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_active_session(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        let now = Utc::now();
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .get(&session_id)
            .filter(|s| s.is_valid_at(now))
            .cloned())
    }

    async fn touch_session(&self, session_id: Uuid) -> AuthResult<()> {
        if *self.fail_touches.lock().unwrap() {
            return Err(AuthError::Timeout("update last used"));
        }
        if let Some(session) = self.state.lock().unwrap().sessions.get_mut(&session_id) {
            session.last_used = Utc::now();
        }
        Ok(())
    }

    async fn revoke_session(&self, session_id: Uuid) -> AuthResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state.sessions.get_mut(&session_id) {
            Some(session) if !session.is_revoked => {
                session.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.is_valid_at(now));
        Ok((before - state.sessions.len()) as u64)
    }

    async fn record_intent(
        &self,
        citizen_id: &str,
        nonce: Uuid,
    ) -> AuthResult<RegistrationIntent> {
        if *self.fail_record_intent.lock().unwrap() {
            return Err(AuthError::Timeout("record intent"));
        }
        let now = Utc::now();
        let intent = RegistrationIntent {
            id: Uuid::new_v4(),
            citizen_id: citizen_id.to_string(),
            nonce,
            status: "pending".to_string(),
            external_id: None,
            folder_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().intents.push(intent.clone());
        Ok(intent)
    }

    async fn update_intent(&self, intent_id: Uuid, update: IntentUpdate) -> AuthResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(intent) = state.intents.iter_mut().find(|i| i.id == intent_id) else {
            return Ok(());
        };

        intent.status = update.status().as_str().to_string();
        intent.updated_at = Utc::now();
        match update {
            IntentUpdate::Registered {
                external_id,
                folder_id,
            } => {
                intent.external_id = Some(external_id);
                intent.folder_id = Some(folder_id);
            }
            IntentUpdate::Failed { error } => intent.error = Some(error),
            IntentUpdate::Committed | IntentUpdate::Orphaned => {}
        }
        Ok(())
    }

    async fn find_stale_registered_intents(
        &self,
        older_than: DateTime<Utc>,
    ) -> AuthResult<Vec<RegistrationIntent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .intents
            .iter()
            .filter(|i| i.status == "registered" && i.updated_at < older_than)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> AuthResult<()> {
        Ok(())
    }
}

// =============================================================================
// Mock Identity Registry
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    ValidateAvailability(String),
    RegisterIdentity(String),
}

/// Identity registry double that records calls.
pub struct MockIdentityRegistry {
    available: Mutex<bool>,
    folder_id: Mutex<String>,
    fail_availability: Mutex<bool>,
    fail_registration: Mutex<bool>,
    availability_delay: Mutex<Option<std::time::Duration>>,
    registration_delay: Mutex<Option<std::time::Duration>>,
    calls: Arc<Mutex<Vec<RegistryCall>>>,
}

impl Default for MockIdentityRegistry {
    fn default() -> Self {
        Self {
            available: Mutex::new(true),
            folder_id: Mutex::new("F1".to_string()),
            fail_availability: Mutex::new(false),
            fail_registration: Mutex::new(false),
            availability_delay: Mutex::new(None),
            registration_delay: Mutex::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable(self) -> Self {
        *self.available.lock().unwrap() = false;
        self
    }

    pub fn with_folder_id(self, folder_id: &str) -> Self {
        *self.folder_id.lock().unwrap() = folder_id.to_string();
        self
    }

    /// Every registration attempt fails
    pub fn failing_registration(self) -> Self {
        *self.fail_registration.lock().unwrap() = true;
        self
    }

    pub fn failing_availability(self) -> Self {
        *self.fail_availability.lock().unwrap() = true;
        self
    }

    /// Both registry calls take `delay` before answering
    pub fn slow(self, delay: std::time::Duration) -> Self {
        *self.availability_delay.lock().unwrap() = Some(delay);
        *self.registration_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Only the registration call is slow
    pub fn slow_registration(self, delay: std::time::Duration) -> Self {
        *self.registration_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn registration_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, RegistryCall::RegisterIdentity(_)))
            .count()
    }
}

#[async_trait]
impl BaseIdentityRegistry for MockIdentityRegistry {
    async fn validate_availability(&self, citizen_id: &str) -> Result<Availability> {
        self.calls
            .lock()
            .unwrap()
            .push(RegistryCall::ValidateAvailability(citizen_id.to_string()));

        let delay = *self.availability_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_availability.lock().unwrap() {
            anyhow::bail!("registry unreachable");
        }
        let available = *self.available.lock().unwrap();
        Ok(Availability {
            available,
            message: if available {
                "available".to_string()
            } else {
                "already registered".to_string()
            },
        })
    }

    async fn register_identity(&self, request: &RegisterIdentity) -> Result<RegisteredIdentity> {
        self.calls
            .lock()
            .unwrap()
            .push(RegistryCall::RegisterIdentity(request.citizen_id.clone()));

        let delay = *self.registration_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_registration.lock().unwrap() {
            anyhow::bail!("registry returned 500");
        }
        Ok(RegisteredIdentity {
            external_id: format!("ext-{}", request.citizen_id),
            folder_id: self.folder_id.lock().unwrap().clone(),
        })
    }
}

// =============================================================================
// Spy Event Publisher
// =============================================================================

/// Records published events; can be told to fail every publish.
#[derive(Default)]
pub struct SpyEventPublisher {
    events: Mutex<Vec<AuthEvent>>,
    failing: Mutex<bool>,
}

impl SpyEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self) -> Self {
        *self.failing.lock().unwrap() = true;
        self
    }

    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseEventPublisher for SpyEventPublisher {
    async fn publish(&self, event: &AuthEvent) -> Result<()> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("broker connection closed");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !*self.failing.lock().unwrap()
    }
}

// =============================================================================
// Mock Email Gateway
// =============================================================================

#[derive(Default)]
pub struct MockEmailGateway {
    sent: Mutex<Vec<EmailMessage>>,
    failing: bool,
}

impl MockEmailGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseEmailGateway for MockEmailGateway {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.failing {
            anyhow::bail!("smtp provider unavailable");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

pub const TEST_JWT_SECRET: &str = "test_secret_key";
pub const TEST_ISSUER: &str = "auth-service";

/// Bundle of doubles wired into a [`ServerDeps`].
pub struct TestDependencies {
    pub store: Arc<MockAuthStore>,
    pub identity: Arc<MockIdentityRegistry>,
    pub events: Arc<SpyEventPublisher>,
    pub tokens: Arc<TokenService>,
    pub settings: RegistrationSettings,
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MockAuthStore::new()),
            identity: Arc::new(MockIdentityRegistry::new()),
            events: Arc::new(SpyEventPublisher::new()),
            tokens: Arc::new(TokenService::new(
                TEST_JWT_SECRET,
                TEST_ISSUER.to_string(),
                Duration::hours(24),
            )),
            settings: RegistrationSettings {
                frontend_base_url: "http://localhost:3000".to_string(),
                pending_ttl: Duration::hours(24),
                identity_timeout: std::time::Duration::from_secs(5),
            },
        }
    }

    pub fn with_store(mut self, store: MockAuthStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_identity(mut self, identity: MockIdentityRegistry) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn with_events(mut self, events: SpyEventPublisher) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn with_identity_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.settings.identity_timeout = timeout;
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.identity.clone(),
            self.events.clone(),
            self.tokens.clone(),
            self.settings.clone(),
        )
    }
}
