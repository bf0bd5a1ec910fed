//! Notifications domain - turns registration events into emails
//!
//! Runs in the `notifications_worker` binary, separate from the HTTP server.

pub mod consumer;
pub mod handlers;
pub mod router;

pub use consumer::{run_consumer, ConsumerSettings, ConsumerStatus};
pub use handlers::NotificationSettings;
pub use router::{Disposition, NotificationRouter};
