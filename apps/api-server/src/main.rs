//! api-server — HTTP API for the marketplace affiliate link service.
//!
//! Serves the short-link redirect (`/go/:short_code`) and the `/api/v1`
//! endpoints for accounts, marketplace credentials, products, campaigns, links
//! and the click dashboard.
//! - Auth: session token in the `session` cookie (or `Authorization: Bearer`).
//! - Storage: SQLite (default, `sqlite` feature) or in-memory.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN.
//!
//! Run:
//! ```bash
//! JWT_SECRET=change-me-to-something-long cargo run -p api-server
//!
//! # throwaway instance with JSON logs
//! JWT_SECRET=change-me-to-something-long STORAGE_PROVIDER=memory LOG_FORMAT=json \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod auth;
mod config;
mod errors;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use domain::account::AccountService;
use domain::adapters::memory_repo::InMemoryStore;
use domain::campaign::CampaignService;
use domain::catalog::ProductService;
use domain::dashboard::DashboardService;
use domain::gateway::GatewayRegistry;
use domain::service::LinkService;
use domain::short_code::UuidShortCodeGenerator;
use domain::{Clock, CoreError, SessionAuthority, Store};
use marketplace::GatewayConfig;
use session_auth::SessionAuth;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::auth::CookieSettings;
use crate::errors::REQUEST_ID_HEADER;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService<StdClock>>,
    pub products: Arc<ProductService<StdClock>>,
    pub campaigns: Arc<CampaignService<StdClock>>,
    pub links: Arc<LinkService<UuidShortCodeGenerator, StdClock>>,
    pub dashboard: Arc<DashboardService<StdClock>>,
    pub cookies: CookieSettings,
    pub shortlink_domain: Option<String>,
}

impl AppState {
    fn new(
        store: Arc<dyn Store>,
        gateways: GatewayRegistry,
        auth: Arc<dyn SessionAuthority>,
        cookies: CookieSettings,
        shortlink_domain: Option<String>,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(store.clone(), auth, StdClock)),
            products: Arc::new(ProductService::new(
                store.clone(),
                gateways.clone(),
                StdClock,
            )),
            campaigns: Arc::new(CampaignService::new(store.clone(), StdClock)),
            links: Arc::new(LinkService::new(
                store.clone(),
                gateways,
                UuidShortCodeGenerator::new(),
                StdClock,
            )),
            dashboard: Arc::new(DashboardService::new(store, StdClock)),
            cookies,
            shortlink_domain,
        }
    }
}

#[derive(Clone, Copy)]
pub struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let store = match build_store(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!(err = %e, "failed to open storage");
            std::process::exit(1);
        }
    };
    let gateways = match marketplace::build_registry(&GatewayConfig {
        lazada_api_url: cfg.lazada_api_url.clone(),
        shopee_api_url: cfg.shopee_api_url.clone(),
        timeout: cfg.marketplace_timeout,
    }) {
        Ok(g) => g,
        Err(e) => {
            error!(err = %e, "failed to build marketplace clients");
            std::process::exit(1);
        }
    };
    let auth = Arc::new(SessionAuth::new(cfg.jwt_secret.as_bytes(), cfg.session_ttl));

    let state = AppState::new(
        store,
        gateways,
        auth,
        CookieSettings {
            ttl: cfg.session_ttl,
            secure: cfg.cookie_secure,
        },
        cfg.shortlink_domain.clone(),
    );

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ])
            .allow_credentials(true)
    };
    let app = app(state).layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

/// Routes plus request-id and tracing layers.
fn app(state: AppState) -> Router {
    let x_request_id = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);

    routes::api_routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
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
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
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

// Construct the store selected by config and feature flags.
fn build_store(cfg: &config::Config) -> Result<Arc<dyn Store>, CoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            let store = sqlite_adapter::SqliteStore::open(&cfg.db_path)?;
            info!(path = %cfg.db_path.display(), "sqlite store opened");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => Err(CoreError::Repository(
            "built without the `sqlite` feature; set STORAGE_PROVIDER=memory".into(),
        )),
        config::StorageProvider::Memory => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(test)]
mod tests;
