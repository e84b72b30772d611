//! HTTP Basic authentication for `/admin` routes.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use crate::AppState;

const CHALLENGE: &str = "Basic realm=\"Restricted\"";

pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let credentials = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(http_common::parse_basic_auth);

    match credentials {
        Some((user, pass)) if state.admin.matches(&user, &pass) => next.run(req).await,
        Some((user, _)) => {
            warn!(user = %user, uri = %req.uri(), "admin auth failed: bad credentials");
            unauthorized()
        }
        None => {
            warn!(uri = %req.uri(), "admin auth failed: missing credentials");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        Json(http_common::json_err("unauthorized")),
    )
        .into_response()
}
