// Carpeta Ciudadana - authentication core
//
// Citizen registration saga: pending-registration tokens, the external
// identity registry, credentials and sessions in Postgres, and auth events
// fanned out over NATS JetStream to the notifications worker.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
