use super::{AppError, BrokerAppState};
use crate::identity::{collect_applications, PortalListing};
use axum::{extract::State, response::Json};
use std::sync::Arc;

/// GET /api/keycloak/clients - Portal applications from every configured realm
///
/// 503 when no service token can be obtained. Realms that fail are listed
/// under `errors` next to the applications that could be read.
pub(super) async fn list_clients(
    State(state): State<Arc<BrokerAppState>>,
) -> Result<Json<PortalListing>, AppError> {
    let listing = collect_applications(state.identity.as_ref(), &state.realms).await?;
    Ok(Json(listing))
}
