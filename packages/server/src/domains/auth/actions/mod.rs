//! Auth domain actions - business logic functions
//!
//! Actions are async functions called directly from the HTTP routes and the
//! scheduler. They compose the kernel traits carried by [`ServerDeps`].

mod complete_registration;
mod initiate_registration;
mod login;
mod reconcile;
mod session;

pub use complete_registration::{complete_registration, CompleteRegistration, RegistrationComplete};
pub use initiate_registration::{initiate_registration, RegistrationInitiated};
pub use login::{login, Login, LoginResult};
pub use reconcile::{reconcile_registrations, ReconcileReport};
pub use session::{introspect, logout};

use std::future::Future;
use std::time::Duration;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::events::AuthEvent;
use crate::kernel::ServerDeps;

/// Run an identity registry call under the configured timeout.
async fn call_registry<T, F>(timeout: Duration, operation: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AuthError::Upstream(format!("{}: {}", operation, e))),
        Err(_) => Err(AuthError::Timeout(operation)),
    }
}

/// Publish without letting a broker failure reach the caller.
async fn publish_best_effort(deps: &ServerDeps, event: AuthEvent) {
    if let Err(e) = deps.events.publish(&event).await {
        tracing::warn!(
            event = event.kind().routing_key(),
            citizen_id = %event.citizen_id(),
            error = %e,
            "failed to publish event"
        );
    }
}
