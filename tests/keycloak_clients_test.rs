// Integration tests for the portal application listing against a mock Keycloak

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use credential_broker::api::{create_router, BrokerAppState};
use credential_broker::config::KeycloakConfig;
use credential_broker::credentials::Cipher;
use credential_broker::database::Database;
use credential_broker::identity::{KeycloakClient, TokenCache};
use credential_broker::service::CredentialService;
use mockito::{Mock, Server, ServerGuard};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(server: &ServerGuard, realms: &[&str]) -> Router {
    let database = Arc::new(Database::open_in_memory().unwrap());
    let cipher = Arc::new(Cipher::from_passphrase("keycloak-tests").unwrap());
    let service = Arc::new(CredentialService::new(database, cipher, 8));

    let config = KeycloakConfig {
        url: server.url(),
        service_client_secret: "kc-secret".to_string(),
        realms: realms.iter().map(|r| r.to_string()).collect(),
        ..KeycloakConfig::default()
    };
    let keycloak = KeycloakClient::new(&config, Arc::new(TokenCache::new())).unwrap();

    create_router(BrokerAppState {
        service,
        identity: Arc::new(keycloak),
        realms: config.realms.clone(),
    })
}

async fn mock_token(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", "/realms/master/protocol/openid-connect/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"svc-token","expires_in":300}"#)
        .expect(hits)
        .create_async()
        .await
}

async fn get_clients(app: &Router) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/keycloak/clients")
                .header("X-Forwarded-User", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_portal_applications_listed() {
    let mut server = Server::new_async().await;
    let token = mock_token(&mut server, 1).await;
    let clients = server
        .mock("GET", "/admin/realms/oidc/clients")
        .match_header("authorization", "Bearer svc-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {
                    "clientId": "nextcloud",
                    "name": "Nextcloud",
                    "description": "Files",
                    "baseUrl": "https://cloud.example.com",
                    "attributes": {
                        "portal.visible": "true",
                        "portal.groups": "staff, admins",
                        "portal.order": "10"
                    }
                },
                {
                    "clientId": "gitea",
                    "attributes": {"portal.visible": "true", "portal.order": "1", "portal.icon": "G!"}
                },
                {"clientId": "realm-management", "attributes": {}},
                {"clientId": "broker"}
            ]"#,
        )
        .create_async()
        .await;

    let app = create_test_app(&server, &["oidc"]);
    let (status, json) = get_clients(&app).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.get("errors").is_none());

    let apps = json["applications"].as_array().unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[0]["id"], "gitea");
    assert_eq!(apps[0]["name"], "gitea");
    assert_eq!(apps[0]["icon"], "G!");
    assert_eq!(apps[0]["groups"], serde_json::json!(["tous"]));
    assert_eq!(apps[1]["id"], "nextcloud");
    assert_eq!(apps[1]["groups"], serde_json::json!(["staff", "admins"]));
    assert_eq!(apps[1]["url"], "https://cloud.example.com");
    assert_eq!(
        apps[1]["oidc"],
        serde_json::json!({
            "enabled": true,
            "realm": "oidc",
            "clientId": "nextcloud",
            "redirectUri": "https://cloud.example.com",
            "idpHint": "poga-idp"
        })
    );

    token.assert_async().await;
    clients.assert_async().await;
}

#[tokio::test]
async fn test_failed_realm_reported() {
    let mut server = Server::new_async().await;
    let _token = mock_token(&mut server, 1).await;
    let _good = server
        .mock("GET", "/admin/realms/oidc/clients")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"clientId":"wiki","attributes":{"portal.visible":"true"}}]"#)
        .create_async()
        .await;
    let _forbidden = server
        .mock("GET", "/admin/realms/partners/clients")
        .with_status(403)
        .create_async()
        .await;

    let app = create_test_app(&server, &["partners", "oidc"]);
    let (status, json) = get_clients(&app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["applications"].as_array().unwrap().len(), 1);
    assert_eq!(json["errors"], serde_json::json!(["partners: HTTP 403"]));
}

#[tokio::test]
async fn test_token_reused_across_requests() {
    let mut server = Server::new_async().await;
    let token = mock_token(&mut server, 1).await;
    let _clients = server
        .mock("GET", "/admin/realms/oidc/clients")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;

    let app = create_test_app(&server, &["oidc"]);
    get_clients(&app).await;
    let (status, json) = get_clients(&app).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["applications"], serde_json::json!([]));
    token.assert_async().await;
}

#[tokio::test]
async fn test_token_rejected_returns_503() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/realms/master/protocol/openid-connect/token")
        .with_status(401)
        .with_body(r#"{"error":"unauthorized_client"}"#)
        .create_async()
        .await;

    let app = create_test_app(&server, &["oidc"]);
    let (status, json) = get_clients(&app).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Keycloak API not configured");
}
