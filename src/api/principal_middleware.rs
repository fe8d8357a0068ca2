use super::AppError;
use crate::auth::principal_from_headers;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Principal middleware: resolves the proxy-asserted user.
///
/// On success the [`Principal`](crate::auth::Principal) is attached as a
/// request extension for handlers to extract; otherwise the request is
/// rejected with 401 before any handler runs.
pub async fn require_principal(mut req: Request, next: Next) -> Response {
    match principal_from_headers(req.headers()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => {
            debug!(path = %req.uri().path(), "Rejected request without principal");
            AppError::from(e).into_response()
        }
    }
}
