use serde::{Deserialize, Serialize};

/// Envelope every registry endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityData {
    pub disponible: bool,
    #[serde(default)]
    pub mensaje: Option<String>,
    #[serde(default)]
    pub codigo_respuesta: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub cedula: i64,
    pub nombre_completo: String,
    pub direccion: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitizenRecord {
    pub id: String,
    #[serde(default)]
    pub cedula: Option<i64>,
    #[serde(default)]
    pub nombre_completo: Option<String>,
    pub carpeta_id: String,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub activo: bool,
}

/// Outcome of an availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub message: String,
}

/// Data needed to register a citizen with the registry.
#[derive(Debug, Clone)]
pub struct RegisterIdentity {
    pub citizen_id: String,
    pub full_name: String,
    pub address: String,
}

/// Identifiers the registry assigns on successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredIdentity {
    pub external_id: String,
    pub folder_id: String,
}
