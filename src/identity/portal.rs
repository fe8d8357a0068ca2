//! Portal application listing built from identity provider clients.
//!
//! A client is shown in the portal when its `portal.visible` attribute is
//! `"true"`. The remaining `portal.*` attributes tune how it is displayed:
//!
//! | attribute          | default                          |
//! |--------------------|----------------------------------|
//! | `portal.icon`      | first letter of the client id    |
//! | `portal.groups`    | `tous`                           |
//! | `portal.order`     | `99`                             |
//! | `portal.idp_hint`  | `poga-idp`                       |

use super::{ClientDescriptor, IdentityProvider};
use crate::error::{BrokerError, Result};
use serde::Serialize;
use tracing::{error, info, warn};

pub const VISIBLE_ATTRIBUTE: &str = "portal.visible";
pub const ICON_ATTRIBUTE: &str = "portal.icon";
pub const GROUPS_ATTRIBUTE: &str = "portal.groups";
pub const ORDER_ATTRIBUTE: &str = "portal.order";
pub const IDP_HINT_ATTRIBUTE: &str = "portal.idp_hint";

const DEFAULT_GROUP: &str = "tous";
const DEFAULT_ORDER: i64 = 99;
const DEFAULT_IDP_HINT: &str = "poga-idp";

/// Application tile shown by the portal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortalApp {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub url: String,
    pub groups: Vec<String>,
    pub order: i64,
    pub realm: String,
    pub oidc: OidcSettings,
}

/// Login parameters the portal uses to open the application.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcSettings {
    pub enabled: bool,
    pub realm: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub idp_hint: String,
}

/// Applications from every realm, plus the realms that could not be read.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PortalListing {
    pub applications: Vec<PortalApp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Collect the portal-visible clients of all `realms`, sorted by order.
///
/// A realm that fails is reported in `errors` as `"{realm}: {error}"` and
/// does not stop the others.
///
/// # Errors
/// `IdentityProvider` when no service token can be obtained.
pub async fn collect_applications(
    provider: &dyn IdentityProvider,
    realms: &[String],
) -> Result<PortalListing> {
    let token = provider
        .service_token()
        .await
        .ok_or_else(|| BrokerError::IdentityProvider("Keycloak API not configured".to_string()))?;

    let mut listing = PortalListing::default();

    for realm in realms {
        match provider.list_clients(realm, &token).await {
            Ok(clients) => {
                let before = listing.applications.len();
                listing
                    .applications
                    .extend(clients.iter().filter_map(|client| portal_app(realm, client)));
                info!(
                    realm = %realm,
                    count = listing.applications.len() - before,
                    "Portal applications collected"
                );
            }
            Err(e) => {
                error!(realm = %realm, error = %e, "Keycloak client listing failed");
                listing.errors.push(format!("{}: {}", realm, e));
            }
        }
    }

    listing.applications.sort_by_key(|app| app.order);

    info!(
        total = listing.applications.len(),
        realms = realms.len(),
        "Portal listing complete"
    );
    Ok(listing)
}

/// Portal tile for `client`, or `None` when the client is not portal-visible.
pub fn portal_app(realm: &str, client: &ClientDescriptor) -> Option<PortalApp> {
    let attributes = &client.attributes;
    if attributes.get(VISIBLE_ATTRIBUTE).map(String::as_str) != Some("true") {
        return None;
    }

    let name = client
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(client.client_id.as_str())
        .to_string();

    let icon = attributes
        .get(ICON_ATTRIBUTE)
        .cloned()
        .unwrap_or_else(|| initial(&client.client_id));

    let mut groups: Vec<String> = attributes
        .get(GROUPS_ATTRIBUTE)
        .map(|groups| {
            groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    if groups.is_empty() {
        groups.push(DEFAULT_GROUP.to_string());
    }

    let order = match attributes.get(ORDER_ATTRIBUTE) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                realm,
                client_id = %client.client_id,
                value = %raw,
                "Invalid portal.order, using default"
            );
            DEFAULT_ORDER
        }),
        None => DEFAULT_ORDER,
    };

    let url = client.base_url.clone().unwrap_or_default();

    Some(PortalApp {
        id: client.client_id.clone(),
        name,
        description: client.description.clone().unwrap_or_default(),
        icon,
        groups,
        order,
        realm: realm.to_string(),
        oidc: OidcSettings {
            enabled: true,
            realm: realm.to_string(),
            client_id: client.client_id.clone(),
            redirect_uri: url.clone(),
            idp_hint: attributes
                .get(IDP_HINT_ATTRIBUTE)
                .cloned()
                .unwrap_or_else(|| DEFAULT_IDP_HINT.to_string()),
        },
        url,
    })
}

/// Uppercased first character
fn initial(client_id: &str) -> String {
    client_id
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}
