use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Recorded, external registration not yet attempted or still in flight
    Pending,
    /// External registration succeeded, local credential not yet confirmed
    Registered,
    Committed,
    Failed,
    /// Registered externally but the local credential was never written
    Orphaned,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Registered => "registered",
            IntentStatus::Committed => "committed",
            IntentStatus::Failed => "failed",
            IntentStatus::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition applied to a recorded intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentUpdate {
    Registered { external_id: String, folder_id: String },
    Committed,
    Failed { error: String },
    Orphaned,
}

impl IntentUpdate {
    pub fn status(&self) -> IntentStatus {
        match self {
            IntentUpdate::Registered { .. } => IntentStatus::Registered,
            IntentUpdate::Committed => IntentStatus::Committed,
            IntentUpdate::Failed { .. } => IntentStatus::Failed,
            IntentUpdate::Orphaned => IntentStatus::Orphaned,
        }
    }
}

/// One attempt to register an identity with the external registry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RegistrationIntent {
    pub id: Uuid,
    pub citizen_id: String,
    pub nonce: Uuid,
    pub status: String,
    pub external_id: Option<String>,
    pub folder_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries
// =============================================================================

impl RegistrationIntent {
    pub async fn record(citizen_id: &str, nonce: Uuid, pool: &PgPool) -> sqlx::Result<Self> {
        sqlx::query_as::<_, RegistrationIntent>(
            r#"
            INSERT INTO registration_intents (id, citizen_id, nonce, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(citizen_id)
        .bind(nonce)
        .fetch_one(pool)
        .await
    }

    pub async fn apply(id: Uuid, update: &IntentUpdate, pool: &PgPool) -> sqlx::Result<()> {
        let (external_id, folder_id, error) = match update {
            IntentUpdate::Registered {
                external_id,
                folder_id,
            } => (Some(external_id.as_str()), Some(folder_id.as_str()), None),
            IntentUpdate::Failed { error } => (None, None, Some(error.as_str())),
            IntentUpdate::Committed | IntentUpdate::Orphaned => (None, None, None),
        };

        sqlx::query(
            r#"
            UPDATE registration_intents
            SET status = $2,
                external_id = COALESCE($3, external_id),
                folder_id = COALESCE($4, folder_id),
                error = COALESCE($5, error),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status().as_str())
        .bind(external_id)
        .bind(folder_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Intents left in `registered` since before `older_than`
    pub async fn find_stale_registered(
        older_than: DateTime<Utc>,
        pool: &PgPool,
    ) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, RegistrationIntent>(
            r#"
            SELECT * FROM registration_intents
            WHERE status = 'registered' AND updated_at < $1
            ORDER BY updated_at
            LIMIT 500
            "#,
        )
        .bind(older_than)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_citizen(citizen_id: &str, pool: &PgPool) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as::<_, RegistrationIntent>(
            "SELECT * FROM registration_intents WHERE citizen_id = $1 ORDER BY created_at",
        )
        .bind(citizen_id)
        .fetch_all(pool)
        .await
    }
}
