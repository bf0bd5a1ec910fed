//! Registration, login and session endpoints.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::common::{AuthError, AuthResult};
use crate::domains::auth::actions::{
    complete_registration, initiate_registration, introspect, login, logout,
    CompleteRegistration, Login,
};
use crate::domains::auth::models::CitizenProfile;
use crate::server::app::AppState;
use crate::server::middleware::ClientContext;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub citizen_id: String,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub citizen_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub citizen_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileSummary>,
}

/// Contact details echoed back once registration completes
#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<CitizenProfile> for ProfileSummary {
    fn from(profile: CitizenProfile) -> Self {
        Self {
            email: profile.email,
            full_name: profile.full_name,
            phone: profile.phone,
            address: profile.address,
        }
    }
}

pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AuthResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AuthError::Validation(rejection.body_text()))
}

fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::SessionInvalid)
}

/// POST /auth/register
///
/// The pending token is mailed to the citizen and never returned here.
pub async fn register_handler(
    Extension(state): Extension<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let request = body(payload)?;
    let profile = CitizenProfile {
        citizen_id: request.citizen_id,
        email: request.email,
        full_name: request.full_name,
        phone: request.phone,
        address: request.address,
    };

    let initiated = initiate_registration(profile, &state.deps).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration started, check your email to set a password",
            "data": {
                "citizen_id": initiated.citizen_id,
                "expires_at": initiated.expires_at,
            }
        })),
    ))
}

/// POST /auth/set-password
pub async fn set_password_handler(
    Extension(state): Extension<AppState>,
    Extension(client): Extension<ClientContext>,
    payload: Result<Json<SetPasswordRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let request = body(payload)?;

    let complete = complete_registration(
        CompleteRegistration {
            token: request.token,
            password: request.password,
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_string(),
        },
        &state.deps,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Registration complete",
        "data": SessionResponse {
            session_token: complete.session_token,
            session_id: complete.session_id,
            expires_at: complete.expires_at,
            citizen_id: complete.profile.citizen_id.clone(),
            folder_id: Some(complete.folder_id),
            profile: Some(complete.profile.into()),
        }
    })))
}

/// POST /auth/login
pub async fn login_handler(
    Extension(state): Extension<AppState>,
    Extension(client): Extension<ClientContext>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<impl IntoResponse> {
    let request = body(payload)?;

    let result = login(
        Login {
            citizen_id: request.citizen_id,
            password: request.password,
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_string(),
        },
        &state.deps,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": SessionResponse {
            session_token: result.session_token,
            session_id: result.session_id,
            expires_at: result.expires_at,
            citizen_id: result.citizen_id,
            folder_id: None,
            profile: None,
        }
    })))
}

/// POST /auth/logout
pub async fn logout_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AuthResult<StatusCode> {
    logout(bearer_token(&headers)?, &state.deps).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/session
pub async fn introspect_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse> {
    let claims = introspect(bearer_token(&headers)?, &state.deps).await?;
    Ok(Json(json!({ "success": true, "data": claims })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::SessionInvalid)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }
}
