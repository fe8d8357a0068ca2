//! Identity provider integration.
//!
//! The broker talks to the identity provider with its own service account,
//! never on behalf of the principal. Only the portal application listing uses
//! it; credential operations do not depend on it.

mod keycloak;
pub mod portal;
mod token_cache;

pub use keycloak::KeycloakClient;
pub use portal::{collect_applications, OidcSettings, PortalApp, PortalListing};
pub use token_cache::TokenCache;

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// Client registration as returned by the identity provider admin API.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDescriptor {
    pub client_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Identity provider seen by the broker.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Service account access token, or `None` when unavailable.
    ///
    /// Failures are logged by the implementation and reported as `None`.
    async fn service_token(&self) -> Option<String>;

    /// Clients registered in `realm`.
    async fn list_clients(&self, realm: &str, token: &str) -> anyhow::Result<Vec<ClientDescriptor>>;
}
