//! api-server: HTTP API for the URL Shortener workspace.
//!
//! Public endpoints create short URLs and redirect them; `/admin` endpoints
//! list, inspect and soft-delete records behind HTTP Basic authentication.
//!
//! - Storage: SQLite file (default) or in-memory via `STORAGE_PROVIDER`.
//! - Logging: pretty or JSON via `LOG_FORMAT`, filtered by `RUST_LOG`.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # throwaway storage, custom admin login
//! STORAGE_PROVIDER=memory ADMIN_USERNAME=ops ADMIN_PASSWORD=secret \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod auth;
mod config;
mod handlers;
mod repo;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::code::RandomCodeGenerator;
use domain::service::UrlService;
use domain::Clock;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AdminCredentials;
use crate::repo::AnyRepo;

type Service = UrlService<AnyRepo, RandomCodeGenerator, StdClock>;

#[derive(Clone)]
pub struct AppState {
    service: Arc<Service>,
    shortlink_domain: Option<String>,
    admin: Arc<AdminCredentials>,
}

#[derive(Clone)]
struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    info!(about = %domain::about(), "starting");
    cfg.warn_if_insecure();

    let service = match UrlService::with_options(
        AnyRepo::from_config(&cfg),
        RandomCodeGenerator::new(),
        StdClock,
        cfg.validator.clone(),
        cfg.service_options,
    ) {
        Ok(s) => s,
        Err(e) => {
            error!(err = %e, "failed to build url service");
            std::process::exit(1);
        }
    };
    let state = AppState {
        service: Arc::new(service),
        shortlink_domain: cfg.shortlink_domain.clone(),
        admin: Arc::new(cfg.admin.clone()),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let app = router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
    info!("api-server stopped");
}

fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/admin/urls", get(handlers::list_urls))
        .route(
            "/admin/urls/:code",
            get(handlers::get_url).delete(handlers::delete_url),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/", post(handlers::create_url))
        .route("/:code", get(handlers::redirect))
        .merge(admin)
        .with_state(state)
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(err = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(err = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use domain::validate::Validator;
    use domain::{Repository, ShortCode, ShortUrl};
    use serde_json::Value;
    use tower::util::ServiceExt;

    // admin:demo
    const ADMIN_AUTH: &str = "Basic YWRtaW46ZGVtbw==";

    fn state() -> AppState {
        let service = UrlService::with_options(
            AnyRepo::memory(),
            RandomCodeGenerator::seeded(42),
            StdClock,
            Validator::default(),
            Default::default(),
        )
        .unwrap();
        AppState {
            service: Arc::new(service),
            shortlink_domain: None,
            admin: Arc::new(AdminCredentials {
                username: "admin".into(),
                password: "demo".into(),
            }),
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    fn create_req(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::HOST, "sho.rt")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn admin(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, ADMIN_AUTH)
            .body(Body::empty())
            .unwrap()
    }

    async fn create(router: &Router, url: &str) -> String {
        let (status, _, body) = send(router, create_req(&format!("{{\"url\":\"{url}\"}}"))).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let short = body["shorten_url"].as_str().unwrap();
        short.strip_prefix("https://sho.rt/").unwrap().to_string()
    }

    #[tokio::test]
    async fn create_then_redirect_counts_hits() {
        let state = state();
        let router = router(state.clone());

        let code = create(&router, "https://example.com/page").await;
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_alphabetic()));

        let (status, headers, _) = send(&router, get(&format!("/{code}"))).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(headers[header::LOCATION], "https://example.com/page");

        let (status, _, body) = send(&router, admin("GET", &format!("/admin/urls/{code}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["short_code"], code.as_str());
        assert_eq!(body["full_url"], "https://example.com/page");
        assert_eq!(body["hits"], 1);
        assert_eq!(body["is_deleted"], false);
        assert!(body["expiry_date"].is_null());
    }

    #[tokio::test]
    async fn shortlink_domain_overrides_host() {
        let mut state = state();
        state.shortlink_domain = Some("https://go.example/".into());
        let router = router(state);

        let (status, _, body) = send(&router, create_req("{\"url\":\"https://example.com\"}")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["shorten_url"]
            .as_str()
            .unwrap()
            .starts_with("https://go.example/"));
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let router = router(state());

        let (status, _, body) = send(&router, create_req("{\"url\":\"\"}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "cannot be blank");

        let (status, _, body) = send(&router, create_req("{\"url\":\"not a url\"}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "must be a valid URL");

        let (status, _, body) =
            send(&router, create_req("{\"url\":\"https://www.facebook.com/x\"}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "url is not allowed");

        let (status, _, body) = send(&router, create_req("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _, _) = send(&router, create_req("{\"expiry\":1}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expiry_hours_set_expiry_date() {
        let router = router(state());
        let (status, _, body) = send(
            &router,
            create_req("{\"url\":\"https://example.com\",\"expiry\":24}"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let code = body["shorten_url"]
            .as_str()
            .unwrap()
            .rsplit('/')
            .next()
            .unwrap()
            .to_string();

        let (_, _, body) = send(&router, admin("GET", &format!("/admin/urls/{code}"))).await;
        assert!(body["expiry_date"].as_str().unwrap().ends_with('Z'));

        // still within its lifetime
        let (status, _, _) = send(&router, get(&format!("/{code}"))).await;
        assert_eq!(status, StatusCode::FOUND);
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_rejected_and_listing_survives() {
        let router = router(state());
        let keep = create(&router, "https://example.com/keep").await;

        let (status, _, body) = send(
            &router,
            create_req("{\"url\":\"https://example.com\",\"expiry\":1000000000000}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "expiry is out of range");

        let (status, _, body) = send(&router, admin("GET", "/admin/urls")).await;
        assert_eq!(status, StatusCode::OK);
        let listed = body.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["short_code"], keep.as_str());
    }

    #[tokio::test]
    async fn blocked_url_reported_before_expiry_range() {
        let router = router(state());
        let (status, _, body) = send(
            &router,
            create_req("{\"url\":\"https://www.facebook.com/x\",\"expiry\":9223372036854775807}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "url is not allowed");
    }

    #[tokio::test]
    async fn expired_record_is_gone() {
        let state = state();
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        state
            .service
            .repo()
            .insert(ShortUrl::new(
                ShortCode::new("oldcode").unwrap(),
                "https://example.com".into(),
                Some(past),
            ))
            .unwrap();
        let router = router(state);

        let (status, _, body) = send(&router, get("/oldcode")).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"], "expired");
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let router = router(state());
        let (status, _, body) = send(&router, get("/nosuchcode")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found");

        let (status, _, _) = send(&router, get("/abc123")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn soft_delete_flow() {
        let state = state();
        let router = router(state.clone());
        let code = create(&router, "https://example.com/gone").await;

        let (status, _, body) = send(&router, admin("DELETE", &format!("/admin/urls/{code}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], format!("{code} has been deleted"));

        // repeat delete still succeeds
        let (status, _, _) = send(&router, admin("DELETE", &format!("/admin/urls/{code}"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&router, get(&format!("/{code}"))).await;
        assert_eq!(status, StatusCode::GONE);

        // deleted records remain visible to admins, hits untouched
        let (_, _, body) = send(&router, admin("GET", &format!("/admin/urls/{code}"))).await;
        assert_eq!(body["is_deleted"], true);
        assert_eq!(body["hits"], 0);

        let (status, _, _) = send(&router, admin("DELETE", "/admin/urls/nosuchcode")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_and_search() {
        let router = router(state());
        let a = create(&router, "https://alpha.example/one").await;
        let b = create(&router, "https://beta.example/two").await;

        let (status, _, body) = send(&router, admin("GET", "/admin/urls")).await;
        assert_eq!(status, StatusCode::OK);
        let codes: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["short_code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec![a.as_str(), b.as_str()]);

        let (_, _, body) = send(&router, admin("GET", "/admin/urls?full_url=beta")).await;
        let found = body.as_array().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["short_code"], b.as_str());

        // empty filter means no filter
        let (_, _, body) = send(&router, admin("GET", "/admin/urls?full_url=")).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _, body) = send(&router, admin("GET", "/admin/urls?full_url=nothing")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (status, _, _) = send(&router, admin("GET", "/admin/urls/nosuchcode")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_requires_basic_auth() {
        let router = router(state());

        let (status, headers, body) = send(&router, get("/admin/urls")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Basic realm=\"Restricted\"");
        assert_eq!(body["error"], "unauthorized");

        // admin:wrong
        let req = Request::builder()
            .method("DELETE")
            .uri("/admin/urls/abc")
            .header(header::AUTHORIZATION, "Basic YWRtaW46d3Jvbmc=")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/admin/urls")
            .header(header::AUTHORIZATION, "Bearer token")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&router, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn concurrent_redirects_count_every_hit() {
        let state = state();
        let router = router(state.clone());
        let code = create(&router, "https://example.com/hot").await;

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let router = router.clone();
            let uri = format!("/{code}");
            tasks.push(tokio::spawn(async move {
                router.oneshot(get(&uri)).await.unwrap().status()
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap(), StatusCode::FOUND);
        }

        let rec = state
            .service
            .repo()
            .find_by_code(&ShortCode::new(code).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(rec.hits, 50);
    }

    #[test]
    fn any_repo_clones_share_backend() {
        let repo = AnyRepo::memory();
        let other = repo.clone();
        repo.insert(ShortUrl::new(
            ShortCode::new("shared").unwrap(),
            "https://example.com".into(),
            None,
        ))
        .unwrap();
        assert!(other
            .exists_by_code(&ShortCode::new("shared").unwrap())
            .unwrap());
    }
}
