use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::service::Listing;
use domain::{CoreError, ShortUrl};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::AppState;

const SECS_PER_HOUR: u64 = 60 * 60;

#[derive(Deserialize)]
pub struct CreateUrlReq {
    url: String,
    /// Lifetime in hours; zero or negative means no expiry.
    #[serde(default)]
    expiry: i64,
}

#[derive(Serialize)]
struct CreateUrlOut {
    shorten_url: String,
}

#[derive(Serialize)]
struct UrlOut {
    short_code: String,
    full_url: String,
    expiry_date: Option<String>,
    hits: u64,
    is_deleted: bool,
}

impl From<ShortUrl> for UrlOut {
    fn from(rec: ShortUrl) -> Self {
        Self {
            short_code: rec.code.to_string(),
            full_url: rec.target_url,
            expiry_date: rec.expiry.and_then(http_common::system_time_to_rfc3339),
            hits: rec.hits,
            is_deleted: rec.deleted,
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    full_url: Option<String>,
}

/// Map a domain error to a status code and `{"error": ...}` body.
fn error_response(err: &CoreError) -> Response {
    let status = match err {
        CoreError::Validation(_) | CoreError::InvalidCode(_) | CoreError::InvalidExpiry => {
            StatusCode::BAD_REQUEST
        }
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::Gone => StatusCode::GONE,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Exhausted { .. } | CoreError::InvalidOptions(_) | CoreError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!(err = %err, "request failed");
        return (
            status,
            Json(http_common::json_err("internal server error")),
        )
            .into_response();
    }
    (status, Json(http_common::json_err(&err.to_string()))).into_response()
}

/// Hours to a lifetime, saturating. Range checks happen in the service,
/// after the URL itself has been validated.
fn expiry_from_hours(hours: i64) -> Option<Duration> {
    let hours = u64::try_from(hours).ok().filter(|h| *h > 0)?;
    Some(Duration::from_secs(hours.saturating_mul(SECS_PER_HOUR)))
}

pub async fn create_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateUrlReq>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            warn!(err = %rejection, "bad create body");
            return (
                StatusCode::BAD_REQUEST,
                Json(http_common::json_err(&rejection.body_text())),
            )
                .into_response();
        }
    };

    match state.service.create(&body.url, expiry_from_hours(body.expiry)) {
        Ok(rec) => {
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let shorten_url = http_common::build_short_url(
                state.shortlink_domain.as_deref(),
                host,
                rec.code.as_str(),
            );
            info!(code = %rec.code, target = %rec.target_url, "create ok");
            (StatusCode::CREATED, Json(CreateUrlOut { shorten_url })).into_response()
        }
        Err(e) => {
            if matches!(e, CoreError::Validation(_) | CoreError::InvalidExpiry) {
                warn!(url = %body.url, err = %e, "create rejected");
            }
            error_response(&e)
        }
    }
}

pub async fn redirect(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.service.redirect(&code) {
        Ok(target) => {
            info!(code = %code, redirect_to = %target, "resolve ok");
            (StatusCode::FOUND, [(header::LOCATION, target)]).into_response()
        }
        Err(e) => {
            if matches!(e, CoreError::NotFound | CoreError::Gone) {
                warn!(code = %code, err = %e, "resolve failed");
            }
            error_response(&e)
        }
    }
}

pub async fn list_urls(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    list_impl(&state, None, q.full_url.as_deref())
}

pub async fn get_url(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(q): Query<ListQuery>,
) -> Response {
    list_impl(&state, Some(&code), q.full_url.as_deref())
}

fn list_impl(state: &AppState, code: Option<&str>, full_url: Option<&str>) -> Response {
    match state.service.list(code, full_url) {
        Ok(Listing::One(rec)) => (StatusCode::OK, Json(UrlOut::from(rec))).into_response(),
        Ok(Listing::Many(recs)) => {
            let out: Vec<UrlOut> = recs.into_iter().map(UrlOut::from).collect();
            (StatusCode::OK, Json(out)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

pub async fn delete_url(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.service.soft_delete(&code) {
        Ok(()) => {
            info!(code = %code, "delete ok");
            (
                StatusCode::OK,
                Json(http_common::json_message(&format!("{} has been deleted", code))),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}
