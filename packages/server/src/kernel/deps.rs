//! Server dependencies for actions (using traits for testability)
//!
//! This module provides the central dependency container used by the auth
//! actions. All external services sit behind trait abstractions.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use identity_registry::RegistryService;
use std::sync::Arc;

use crate::domains::auth::TokenService;
use crate::kernel::{
    Availability, BaseAuthStore, BaseEventPublisher, BaseIdentityRegistry, RegisterIdentity,
    RegisteredIdentity,
};

// =============================================================================
// RegistryService Adapter (implements BaseIdentityRegistry trait)
// =============================================================================

/// Wrapper around RegistryService that implements BaseIdentityRegistry trait
pub struct RegistryAdapter(pub Arc<RegistryService>);

impl RegistryAdapter {
    pub fn new(service: Arc<RegistryService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseIdentityRegistry for RegistryAdapter {
    async fn validate_availability(&self, citizen_id: &str) -> Result<Availability> {
        self.0
            .validate_availability(citizen_id)
            .await
            .map_err(Into::into)
    }

    async fn register_identity(&self, request: &RegisterIdentity) -> Result<RegisteredIdentity> {
        self.0.register_identity(request).await.map_err(Into::into)
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Tunables of the registration flow
#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    /// Base of the link mailed to the citizen (`{base}/set-password?token=...`)
    pub frontend_base_url: String,
    pub pending_ttl: Duration,
    /// Upper bound for each identity registry call
    pub identity_timeout: std::time::Duration,
}

impl RegistrationSettings {
    pub fn verification_url(&self, token: &str) -> String {
        format!(
            "{}/set-password?token={}",
            self.frontend_base_url.trim_end_matches('/'),
            token
        )
    }
}

/// Server dependencies accessible to actions (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseAuthStore>,
    pub identity: Arc<dyn BaseIdentityRegistry>,
    pub events: Arc<dyn BaseEventPublisher>,
    pub tokens: Arc<TokenService>,
    pub settings: RegistrationSettings,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseAuthStore>,
        identity: Arc<dyn BaseIdentityRegistry>,
        events: Arc<dyn BaseEventPublisher>,
        tokens: Arc<TokenService>,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            store,
            identity,
            events,
            tokens,
            settings,
        }
    }
}
