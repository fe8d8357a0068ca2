//! Credential endpoints.
//!
//! The principal comes from the request extension set by the principal
//! middleware; handlers never read identity headers themselves.

use super::{AppError, BrokerAppState};
use crate::auth::Principal;
use crate::credentials::CredentialView;
use crate::service::{CredentialLookup, SaveCredential};
use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Response for GET /api/credentials
#[derive(Serialize)]
pub struct ListCredentialsResponse {
    pub credentials: Vec<CredentialView>,
}

/// Credential metadata returned by GET /api/credentials/:connection_id
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CredentialDetail {
    pub id: i64,
    pub connection_id: i64,
    pub connection_name: String,
    pub ad_login: String,
    pub is_valid: bool,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<CredentialView> for CredentialDetail {
    fn from(view: CredentialView) -> Self {
        Self {
            id: view.id,
            connection_id: view.connection_id,
            connection_name: view.connection_name,
            ad_login: view.directory_login,
            is_valid: view.is_valid,
            updated_at: view.updated_at,
            expires_at: view.expires_at,
        }
    }
}

/// Response for GET /api/credentials/:connection_id
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum GetCredentialResponse {
    Found {
        has_credentials: bool,
        credential: CredentialDetail,
    },
    Missing {
        has_credentials: bool,
        connection_id: i64,
    },
}

impl From<CredentialLookup> for GetCredentialResponse {
    fn from(lookup: CredentialLookup) -> Self {
        match lookup {
            CredentialLookup::Found(view) => GetCredentialResponse::Found {
                has_credentials: true,
                credential: view.into(),
            },
            CredentialLookup::Missing { connection_id } => GetCredentialResponse::Missing {
                has_credentials: false,
                connection_id,
            },
        }
    }
}

/// Response for POST /api/credentials/:connection_id
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SaveCredentialResponse {
    pub success: bool,
    pub message: String,
    pub connection_id: i64,
    pub login: String,
    pub expires_in_hours: u32,
}

/// Response for DELETE /api/credentials/:connection_id
#[derive(Serialize)]
pub struct RevokeCredentialResponse {
    pub success: bool,
    pub message: &'static str,
}

/// GET /api/credentials - Active credentials of the caller
pub(super) async fn list_credentials(
    State(state): State<Arc<BrokerAppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ListCredentialsResponse>, AppError> {
    let credentials = state.service.list(&principal)?;
    Ok(Json(ListCredentialsResponse { credentials }))
}

/// GET /api/credentials/:connection_id - Credential metadata for one connection
pub(super) async fn get_credential(
    State(state): State<Arc<BrokerAppState>>,
    Extension(principal): Extension<Principal>,
    Path(connection_id): Path<i64>,
) -> Result<Json<GetCredentialResponse>, AppError> {
    let lookup = state.service.get(&principal, connection_id)?;
    Ok(Json(lookup.into()))
}

/// POST /api/credentials/:connection_id - Store and project a credential
///
/// A missing or malformed body is reported like missing fields.
pub(super) async fn save_credential(
    State(state): State<Arc<BrokerAppState>>,
    Extension(principal): Extension<Principal>,
    Path(connection_id): Path<i64>,
    body: Option<Json<SaveCredential>>,
) -> Result<Json<SaveCredentialResponse>, AppError> {
    let request = match body {
        Some(Json(request)) => request,
        None => {
            debug!(connection_id, "Save request without a usable JSON body");
            SaveCredential::default()
        }
    };

    let summary = state.service.save(&principal, connection_id, &request)?;

    Ok(Json(SaveCredentialResponse {
        success: true,
        message: summary.message,
        connection_id: summary.connection_id,
        login: summary.login,
        expires_in_hours: summary.expires_in_hours,
    }))
}

/// DELETE /api/credentials/:connection_id - Revoke and clear the gateway
pub(super) async fn revoke_credential(
    State(state): State<Arc<BrokerAppState>>,
    Extension(principal): Extension<Principal>,
    Path(connection_id): Path<i64>,
) -> Result<Json<RevokeCredentialResponse>, AppError> {
    state.service.revoke(&principal, connection_id)?;

    Ok(Json(RevokeCredentialResponse {
        success: true,
        message: "Credential revoked",
    }))
}
