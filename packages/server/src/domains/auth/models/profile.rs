use serde::{Deserialize, Serialize};

use crate::common::{AuthError, AuthResult};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Profile submitted at registration time.
///
/// Never persisted locally: it travels inside the pending registration token
/// and is handed to the identity registry once the password is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenProfile {
    pub citizen_id: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl CitizenProfile {
    /// Trim surrounding whitespace and drop empty optional fields.
    pub fn normalized(self) -> Self {
        let optional = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        Self {
            citizen_id: self.citizen_id.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            full_name: self.full_name.trim().to_string(),
            phone: optional(self.phone),
            address: optional(self.address),
        }
    }

    pub fn validate(&self) -> AuthResult<()> {
        let id_len = self.citizen_id.chars().count();
        if id_len == 0 {
            return Err(AuthError::Validation("citizen_id is required".into()));
        }
        if !(3..=50).contains(&id_len) {
            return Err(AuthError::Validation(
                "citizen_id must be between 3 and 50 characters".into(),
            ));
        }
        if !self.citizen_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(AuthError::Validation("citizen_id must be numeric".into()));
        }
        // The identity registry keys citizens by a signed 64-bit number
        if self.citizen_id.parse::<i64>().is_err() {
            return Err(AuthError::Validation(
                "citizen_id is too large to be a registry id".into(),
            ));
        }

        if self.email.is_empty() {
            return Err(AuthError::Validation("email is required".into()));
        }
        if self.email.chars().count() > 255 || !looks_like_email(&self.email) {
            return Err(AuthError::Validation("email is not a valid address".into()));
        }

        let name_len = self.full_name.chars().count();
        if name_len == 0 {
            return Err(AuthError::Validation("full_name is required".into()));
        }
        if !(2..=255).contains(&name_len) {
            return Err(AuthError::Validation(
                "full_name must be between 2 and 255 characters".into(),
            ));
        }

        if let Some(phone) = &self.phone {
            if phone.chars().count() > 50 {
                return Err(AuthError::Validation("phone must be at most 50 characters".into()));
            }
        }
        if let Some(address) = &self.address {
            if address.chars().count() > 1000 {
                return Err(AuthError::Validation(
                    "address must be at most 1000 characters".into(),
                ));
            }
        }

        Ok(())
    }
}

pub fn validate_password_strength(password: &str) -> AuthResult<()> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "password must be between {} and {} characters",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Minimal address shape check: one `@` with text on both sides.
pub fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        }
        None => false,
    }
}
