//! Auth domain - citizen registration saga, credentials and sessions
//!
//! Responsibilities:
//! - Pending registration tokens (signed, never stored)
//! - Orchestrating the external identity registry and the local credential commit
//! - Login, logout and session introspection
//! - Publishing registration events for the notifications worker

pub mod actions;
pub mod events;
pub mod jwt;
pub mod models;
pub mod store;

pub use events::{AuthEvent, EventKind};
pub use jwt::{hash_opaque_token, PendingRegistration, SessionClaims, TokenService};
pub use store::PostgresAuthStore;
