use super::{AppError, BrokerAppState};
use crate::gateway::GatewayConnection;
use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Response for GET /api/connections
#[derive(Serialize)]
pub struct ListConnectionsResponse {
    pub connections: Vec<GatewayConnection>,
}

/// GET /api/connections - Gateway connections, ordered by name
pub(super) async fn list_connections(
    State(state): State<Arc<BrokerAppState>>,
) -> Result<Json<ListConnectionsResponse>, AppError> {
    let connections = state.service.connections()?;
    debug!(count = connections.len(), "Listing connections");
    Ok(Json(ListConnectionsResponse { connections }))
}
