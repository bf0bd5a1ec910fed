use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// A login session owned by one credential.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub credential_id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Input for creating a session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub credential_id: String,
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

// =============================================================================
// SQL Queries
// =============================================================================

impl Session {
    pub async fn create(new: &NewSession, pool: &PgPool) -> sqlx::Result<Self> {
        sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO auth_sessions (id, credential_id, token_hash, expires_at, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.credential_id)
        .bind(&new.token_hash)
        .bind(new.expires_at)
        .bind(&new.user_agent)
        .bind(&new.ip_address)
        .fetch_one(pool)
        .await
    }

    /// Find a session that is neither expired nor revoked
    pub async fn find_active(id: Uuid, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM auth_sessions WHERE id = $1 AND expires_at > NOW() AND is_revoked = FALSE",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn touch(id: Uuid, pool: &PgPool) -> sqlx::Result<()> {
        sqlx::query("UPDATE auth_sessions SET last_used = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Returns true if a live session was revoked by this call
    pub async fn revoke(id: Uuid, pool: &PgPool) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET is_revoked = TRUE WHERE id = $1 AND is_revoked = FALSE",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete expired or revoked sessions. Returns rows deleted.
    pub async fn delete_expired(pool: &PgPool) -> sqlx::Result<u64> {
        let result =
            sqlx::query("DELETE FROM auth_sessions WHERE expires_at < NOW() OR is_revoked = TRUE")
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
