// HTTP API

mod clients;
mod connections;
mod credentials;
pub mod principal_middleware;

pub use credentials::{CredentialDetail, GetCredentialResponse, SaveCredentialResponse};
pub use principal_middleware::require_principal;

use crate::error::BrokerError;
use crate::identity::IdentityProvider;
use crate::service::CredentialService;
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};

/// Shared application state for the broker API
#[derive(Clone)]
pub struct BrokerAppState {
    pub service: Arc<CredentialService>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Realms queried for portal applications
    pub realms: Vec<String>,
}

/// Create the broker router
///
/// `/health` is open; every `/api/*` route requires a principal.
pub fn create_router(state: BrokerAppState) -> Router {
    let api = Router::new()
        .route("/api/connections", get(connections::list_connections))
        .route("/api/credentials", get(credentials::list_credentials))
        .route(
            "/api/credentials/:connection_id",
            get(credentials::get_credential)
                .post(credentials::save_credential)
                .delete(credentials::revoke_credential),
        )
        .route("/api/keycloak/clients", get(clients::list_clients))
        .route_layer(middleware::from_fn(require_principal))
        .with_state(Arc::new(state));

    Router::new().route("/health", get(health)).merge(api)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types
#[derive(Debug, PartialEq)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServiceUnavailable(String),
    /// Detail is logged, never returned
    InternalServerError,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<BrokerError> for AppError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Validation(msg) => AppError::BadRequest(msg),
            BrokerError::ConnectionNotFound(_) => {
                AppError::NotFound("Connection not found".to_string())
            }
            BrokerError::Unauthenticated => AppError::Unauthorized("Not authenticated".to_string()),
            BrokerError::IdentityProvider(msg) => {
                warn!(error = %msg, "Identity provider unavailable");
                AppError::ServiceUnavailable(msg)
            }
            other => {
                error!(error = %other, transient = other.is_transient(), "Request failed");
                AppError::InternalServerError
            }
        }
    }
}
