use super::{ClientDescriptor, IdentityProvider, TokenCache};
use crate::config::KeycloakConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// HTTP client for the Keycloak token and admin APIs.
///
/// Authenticates with the `client_credentials` grant and caches the
/// resulting token in a shared [`TokenCache`].
pub struct KeycloakClient {
    base_url: String,
    auth_realm: String,
    client_id: String,
    client_secret: String,
    http_client: Client,
    cache: Arc<TokenCache>,
}

impl KeycloakClient {
    /// Every request issued by the client carries the configured timeout.
    pub fn new(config: &KeycloakConfig, cache: Arc<TokenCache>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_realm: config.auth_realm.clone(),
            client_id: config.service_client_id.clone(),
            client_secret: config.service_client_secret.clone(),
            http_client,
            cache,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.client_secret.is_empty()
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.auth_realm
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .context("Failed to send token request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {}", status.as_u16()));
        }

        response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token response")
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn service_token(&self) -> Option<String> {
        let now = Utc::now();
        if let Some(token) = self.cache.get(now) {
            return Some(token);
        }

        if !self.is_configured() {
            warn!("Keycloak service account not configured");
            return None;
        }

        match self.request_token().await {
            Ok(response) => {
                let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
                let expires_at = self.cache.store(response.access_token.clone(), lifetime, now);
                info!(
                    realm = %self.auth_realm,
                    expires_at = %expires_at,
                    "Keycloak service token obtained"
                );
                Some(response.access_token)
            }
            Err(e) => {
                warn!(realm = %self.auth_realm, error = %e, "Keycloak token request failed");
                None
            }
        }
    }

    async fn list_clients(&self, realm: &str, token: &str) -> Result<Vec<ClientDescriptor>> {
        if self.base_url.is_empty() {
            return Err(anyhow!("Keycloak URL not configured"));
        }

        let url = format!("{}/admin/realms/{}/clients", self.base_url, realm);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send clients request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP {}", status.as_u16()));
        }

        let clients = response
            .json::<Vec<ClientDescriptor>>()
            .await
            .context("Failed to parse clients response")?;

        debug!(realm, count = clients.len(), "Keycloak clients fetched");
        Ok(clients)
    }
}
