//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod email;
pub mod nats;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::{RegistrationSettings, RegistryAdapter, ServerDeps};
pub use email::{ConsoleEmailGateway, HttpEmailGateway};
pub use nats::{
    BrokerConnection, BrokerTopology, JetStreamConnector, NatsEventPublisher, NatsPublisher,
    PublishedMessage, TestNats,
};
pub use scheduled_tasks::{start_scheduler, ScheduleSettings};
pub use test_dependencies::TestDependencies;
pub use traits::*;
