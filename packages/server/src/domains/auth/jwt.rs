use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::models::CitizenProfile;

/// Current claim layout version. Tokens carrying any other `ver` are rejected.
pub const TOKEN_VERSION: u32 = 1;

pub const PENDING_PURPOSE: &str = "email_verification";
pub const SESSION_PURPOSE: &str = "session";

/// Claims of a pending registration token.
///
/// The token is the only place a pending registration lives; nothing is
/// stored server-side until the citizen chooses a password.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PendingRegistrationClaims {
    pub citizen_id: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub nonce: Uuid,
    pub purpose: String,
    pub ver: u32,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
}

/// Session token claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub citizen_id: String,
    pub session_id: Uuid,
    pub folder_id: String,
    pub email: String,
    pub full_name: String,
    pub purpose: String,
    pub ver: u32,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
}

/// A validated pending registration, decoded from its token.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub profile: CitizenProfile,
    pub nonce: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies pending-registration and session tokens (HS256).
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    session_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, issuer: String, session_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Create a pending registration token embedding the full profile
    pub fn issue_pending(
        &self,
        profile: &CitizenProfile,
        nonce: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = PendingRegistrationClaims {
            citizen_id: profile.citizen_id.clone(),
            email: profile.email.clone(),
            full_name: profile.full_name.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            nonce,
            purpose: PENDING_PURPOSE.to_string(),
            ver: TOKEN_VERSION,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify a pending registration token and recover its profile.
    ///
    /// Fails on bad signature, wrong issuer, expiry, wrong purpose or unknown version.
    pub fn validate_pending(&self, token: &str) -> AuthResult<PendingRegistration> {
        let claims: PendingRegistrationClaims = self.decode_claims(token).map_err(|e| {
            tracing::debug!(error = %e, "pending token rejected");
            AuthError::InvalidToken
        })?;

        if claims.purpose != PENDING_PURPOSE || claims.ver != TOKEN_VERSION {
            tracing::debug!(purpose = %claims.purpose, ver = claims.ver, "pending token has wrong purpose or version");
            return Err(AuthError::InvalidToken);
        }

        Ok(PendingRegistration {
            profile: CitizenProfile {
                citizen_id: claims.citizen_id,
                email: claims.email,
                full_name: claims.full_name,
                phone: claims.phone,
                address: claims.address,
            },
            nonce: claims.nonce,
            issued_at: timestamp(claims.iat),
            expires_at: timestamp(claims.exp),
        })
    }

    /// Create a session token. Returns the token and its expiry.
    pub fn issue_session(
        &self,
        citizen_id: &str,
        session_id: Uuid,
        email: &str,
        folder_id: &str,
        full_name: &str,
    ) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        let claims = SessionClaims {
            citizen_id: citizen_id.to_string(),
            session_id,
            folder_id: folder_id.to_string(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            purpose: SESSION_PURPOSE.to_string(),
            ver: TOKEN_VERSION,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok((token, expires_at))
    }

    pub fn validate_session(&self, token: &str) -> AuthResult<SessionClaims> {
        let claims: SessionClaims = self.decode_claims(token).map_err(|e| {
            tracing::debug!(error = %e, "session token rejected");
            AuthError::SessionInvalid
        })?;

        if claims.purpose != SESSION_PURPOSE || claims.ver != TOKEN_VERSION {
            return Err(AuthError::SessionInvalid);
        }
        Ok(claims)
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// One-way SHA-256 hash of an opaque token, lowercase hex.
pub fn hash_opaque_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
