//! HTTP routes. Everything below `/api/v1` answers with the JSON envelope.

use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::AppState;

pub mod campaign;
pub mod dashboard;
pub mod link;
pub mod product;
pub mod user;

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn api_routes() -> Router<AppState> {
    let user = Router::new()
        .route("/register", post(user::register))
        .route("/login", post(user::login))
        .route("/logout", post(user::logout))
        .route("/me", get(user::me))
        .route("/market-credential", post(user::save_credential))
        .route(
            "/market-credential/:platform",
            get(user::check_credential).delete(user::delete_credential),
        );

    let product = Router::new()
        .route("/", post(product::create).get(product::list))
        .route("/:id", get(product::get_one).delete(product::delete))
        .route("/:id/offer", get(product::offer));

    let campaign = Router::new()
        .route("/", post(campaign::create).get(campaign::list))
        .route("/available", get(campaign::available))
        .route("/:id", axum::routing::delete(campaign::delete));

    let link = Router::new()
        .route("/", post(link::create))
        .route("/:id", get(link::get_one).delete(link::delete))
        .route("/short-code/:code", get(link::by_short_code))
        .route("/campaign/:campaign_id", get(link::by_campaign))
        .route("/redirect/:short_code", get(link::redirect));

    let dashboard = Router::new().route("/metrics", get(dashboard::metrics));

    Router::new()
        .route("/health", get(health))
        .route("/go/:short_code", get(link::redirect))
        .nest(
            "/api/v1",
            Router::new()
                .nest("/user", user)
                .nest("/product", product)
                .nest("/campaign", campaign)
                .nest("/link", link)
                .nest("/dashboard", dashboard),
        )
}
