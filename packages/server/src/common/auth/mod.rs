//! Error taxonomy shared by the auth domain, the store and the HTTP layer.

mod errors;

pub use errors::{AuthError, AuthResult, ErrorKind};
