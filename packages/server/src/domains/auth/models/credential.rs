use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// Local credential for a citizen whose identity is registered externally.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuthCredential {
    pub citizen_id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

// =============================================================================
// SQL Queries
// =============================================================================

impl AuthCredential {
    /// Insert a verified, active credential. Fails with a unique violation on duplicates.
    pub async fn create(citizen_id: &str, password_hash: &str, pool: &PgPool) -> sqlx::Result<Self> {
        sqlx::query_as::<_, AuthCredential>(
            r#"
            INSERT INTO auth_credentials (citizen_id, password_hash, email_verified, is_active)
            VALUES ($1, $2, TRUE, TRUE)
            RETURNING *
            "#,
        )
        .bind(citizen_id)
        .bind(password_hash)
        .fetch_one(pool)
        .await
    }

    /// Find an active credential by citizen id
    pub async fn find_active(citizen_id: &str, pool: &PgPool) -> sqlx::Result<Option<Self>> {
        sqlx::query_as::<_, AuthCredential>(
            "SELECT * FROM auth_credentials WHERE citizen_id = $1 AND is_active = TRUE",
        )
        .bind(citizen_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn touch_last_login(citizen_id: &str, pool: &PgPool) -> sqlx::Result<()> {
        sqlx::query(
            "UPDATE auth_credentials SET last_login = NOW(), updated_at = NOW() WHERE citizen_id = $1",
        )
        .bind(citizen_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Password hashing
// =============================================================================

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Constant-time check of `password` against a stored PHC hash string.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("longpass1").unwrap();
        assert!(verify_password("longpass1", &hash));
        assert!(!verify_password("longpass2", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("longpass1").unwrap();
        let b = hash_password("longpass1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("longpass1", "not-a-phc-string"));
    }
}
