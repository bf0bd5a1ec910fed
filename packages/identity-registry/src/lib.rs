//! HTTP client for the citizen identity registry.
//!
//! Both calls are single-shot: no retry, no backoff. Any non-2xx status,
//! `success: false` envelope or undecodable body is a hard failure.

use std::time::Duration;

pub mod models;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use crate::models::{Availability, RegisterIdentity, RegisteredIdentity};
use crate::models::{ApiEnvelope, AvailabilityData, CitizenRecord, RegistrationRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("citizen id must be numeric, got {0:?}")]
    InvalidCitizenId(String),

    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registry returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("registry rejected request: {0}")]
    Rejected(String),

    #[error("registry response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub base_url: String,
    pub timeout: Duration,
}

impl RegistryOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryService {
    options: RegistryOptions,
    client: Client,
}

impl RegistryService {
    pub fn new(options: RegistryOptions) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self { options, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.options.base_url.trim_end_matches('/'), path)
    }

    /// Ask the registry whether `citizen_id` can still be registered.
    pub async fn validate_availability(
        &self,
        citizen_id: &str,
    ) -> Result<Availability, RegistryError> {
        let url = self.url(&format!("/api/v1/ciudadanos/validar/{}", citizen_id));
        tracing::debug!(citizen_id, "checking identity availability");

        let response = self.client.get(url).send().await?;
        let envelope: ApiEnvelope<AvailabilityData> = read_envelope(response).await?;

        let message = envelope.message.unwrap_or_default();
        let data = envelope
            .data
            .ok_or_else(|| RegistryError::Rejected(format!("no availability data: {}", message)))?;

        Ok(Availability {
            available: data.disponible,
            message: data.mensaje.unwrap_or(message),
        })
    }

    /// Register a citizen. Returns the registry's id and the assigned folder id.
    pub async fn register_identity(
        &self,
        request: &RegisterIdentity,
    ) -> Result<RegisteredIdentity, RegistryError> {
        let cedula: i64 = request
            .citizen_id
            .parse()
            .map_err(|_| RegistryError::InvalidCitizenId(request.citizen_id.clone()))?;

        let body = RegistrationRequest {
            cedula,
            nombre_completo: request.full_name.clone(),
            direccion: request.address.clone(),
        };

        let response = self
            .client
            .post(self.url("/api/v1/ciudadanos/registrar"))
            .json(&body)
            .send()
            .await?;
        let envelope: ApiEnvelope<CitizenRecord> = read_envelope(response).await?;

        let record = envelope.data.ok_or_else(|| {
            RegistryError::Rejected(format!(
                "no citizen data: {}",
                envelope.message.unwrap_or_default()
            ))
        })?;
        if record.carpeta_id.trim().is_empty() {
            return Err(RegistryError::Rejected("registry returned an empty folder id".into()));
        }

        tracing::info!(
            citizen_id = %request.citizen_id,
            external_id = %record.id,
            folder_id = %record.carpeta_id,
            "identity registered"
        );

        Ok(RegisteredIdentity {
            external_id: record.id,
            folder_id: record.carpeta_id,
        })
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<ApiEnvelope<T>, RegistryError> {
    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK && status != StatusCode::CREATED {
        tracing::warn!(%status, "identity registry returned an error");
        return Err(RegistryError::Status { status, body });
    }

    let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;
    if !envelope.success {
        return Err(RegistryError::Rejected(
            envelope.message.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(envelope)
}
