//! Test fixtures shared by the integration tests.

use auth_core::domains::auth::models::CitizenProfile;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Numeric citizen id unique within this test run.
///
/// Tests share one database, so ids must not collide across tests.
pub fn unique_citizen_id() -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() % 1_000_000_000_000)
        .unwrap_or(0);
    format!("{}{:04}", nanos, n % 10_000)
}

pub fn profile(citizen_id: &str) -> CitizenProfile {
    CitizenProfile {
        citizen_id: citizen_id.to_string(),
        email: "a@x.com".to_string(),
        full_name: "Ann".to_string(),
        phone: None,
        address: None,
    }
}
