use std::time::Duration;

use identity_registry::{RegisterIdentity, RegistryError, RegistryOptions, RegistryService};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer) -> RegistryService {
    RegistryService::new(RegistryOptions {
        base_url: server.uri(),
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

fn request(citizen_id: &str) -> RegisterIdentity {
    RegisterIdentity {
        citizen_id: citizen_id.to_string(),
        full_name: "Ann Example".to_string(),
        address: "Calle 1".to_string(),
    }
}

#[tokio::test]
async fn availability_reports_registry_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/ciudadanos/validar/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "ok",
            "data": {
                "cedula": 123,
                "disponible": true,
                "mensaje": "Ciudadano disponible",
                "codigoRespuesta": 200
            },
            "timestamp": "2024-01-01T00:00:00"
        })))
        .mount(&server)
        .await;

    let availability = service(&server).validate_availability("123").await.unwrap();
    assert!(availability.available);
    assert_eq!(availability.message, "Ciudadano disponible");
}

#[tokio::test]
async fn availability_fails_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/ciudadanos/validar/123"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = service(&server).validate_availability("123").await.unwrap_err();
    match err {
        RegistryError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn register_sends_numeric_id_and_returns_folder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ciudadanos/registrar"))
        .and(body_json(json!({
            "cedula": 123,
            "nombreCompleto": "Ann Example",
            "direccion": "Calle 1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "message": "created",
            "data": {
                "id": "ext-9",
                "cedula": 123,
                "nombreCompleto": "Ann Example",
                "direccion": "Calle 1",
                "email": "",
                "carpetaId": "F1",
                "estado": "REGISTRADO",
                "activo": true
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registered = service(&server).register_identity(&request("123")).await.unwrap();
    assert_eq!(registered.external_id, "ext-9");
    assert_eq!(registered.folder_id, "F1");
}

#[tokio::test]
async fn register_treats_unsuccessful_envelope_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ciudadanos/registrar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "ya registrado",
            "data": null
        })))
        .mount(&server)
        .await;

    let err = service(&server).register_identity(&request("123")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Rejected(ref m) if m == "ya registrado"));
}

#[tokio::test]
async fn register_rejects_non_numeric_id_without_calling_registry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = service(&server).register_identity(&request("12a")).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidCitizenId(_)));
}

#[tokio::test]
async fn register_fails_on_garbage_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ciudadanos/registrar"))
        .respond_with(ResponseTemplate::new(201).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = service(&server).register_identity(&request("123")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Decode(_)));
}

#[tokio::test]
async fn register_requires_a_folder_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ciudadanos/registrar"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": { "id": "ext-9", "cedula": 123, "activo": true }
        })))
        .mount(&server)
        .await;

    let err = service(&server).register_identity(&request("123")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn register_rejects_blank_folder_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/ciudadanos/registrar"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "data": { "id": "ext-9", "carpetaId": "" }
        })))
        .mount(&server)
        .await;

    let err = service(&server).register_identity(&request("123")).await.unwrap_err();
    assert!(matches!(err, RegistryError::Rejected(_)), "got {err:?}");
}
