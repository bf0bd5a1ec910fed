pub mod credential;
pub mod intent;
pub mod profile;
pub mod session;

pub use credential::{hash_password, verify_password, AuthCredential};
pub use intent::{IntentStatus, IntentUpdate, RegistrationIntent};
pub use profile::{looks_like_email, validate_password_strength, CitizenProfile};
pub use session::{NewSession, Session};
