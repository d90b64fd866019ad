use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::Link;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::{done, json_body, ok, parse_id, ApiError, Op, OrApiError, TxnId};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateLinkReq {
    product_id: Uuid,
    campaign_id: Uuid,
}

#[derive(Serialize)]
pub struct LinkOut {
    #[serde(flatten)]
    link: Link,
    short_url: String,
}

fn link_to_out(link: Link, headers: &HeaderMap, shortlink_domain: Option<&str>) -> LinkOut {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    LinkOut {
        short_url: http_common::build_short_url(shortlink_domain, host, &link.short_code),
        link,
    }
}

pub async fn create(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    body: Result<Json<CreateLinkReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(&txn, body)?;
    let link = state
        .links
        .create(user_id, req.product_id, req.campaign_id)
        .await
        .or_api(&txn, Op::CreateLink)?;
    let out = link_to_out(link, &headers, state.shortlink_domain.as_deref());
    Ok(ok(&txn, "Link created successfully", out))
}

pub async fn get_one(
    State(state): State<AppState>,
    txn: TxnId,
    headers: HeaderMap,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&txn, &raw)?;
    let link = state.links.resolve_by_id(id).or_api(&txn, Op::GetLink)?;
    let out = link_to_out(link, &headers, state.shortlink_domain.as_deref());
    Ok(ok(&txn, "Link fetched successfully", out))
}

pub async fn by_short_code(
    State(state): State<AppState>,
    txn: TxnId,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let link = state
        .links
        .resolve_by_short_code(&code)
        .or_api(&txn, Op::GetLink)?;
    let out = link_to_out(link, &headers, state.shortlink_domain.as_deref());
    Ok(ok(&txn, "Link fetched successfully", out))
}

pub async fn by_campaign(
    State(state): State<AppState>,
    txn: TxnId,
    headers: HeaderMap,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let campaign_id = parse_id(&txn, &raw)?;
    let links = state
        .links
        .list_by_campaign(campaign_id)
        .or_api(&txn, Op::GetLink)?;
    let domain = state.shortlink_domain.as_deref();
    let out: Vec<LinkOut> = links
        .into_iter()
        .map(|l| link_to_out(l, &headers, domain))
        .collect();
    Ok(ok(&txn, "Links fetched successfully", out))
}

/// Record the visit and send the client to the affiliate URL.
pub async fn redirect(
    State(state): State<AppState>,
    txn: TxnId,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let link = state
        .links
        .click_by_short_code(&code)
        .or_api(&txn, Op::Redirect)?;
    info!(short_code = %link.short_code, link_id = %link.id, "redirect");
    Ok((StatusCode::FOUND, [(header::LOCATION, link.target_url)]).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&txn, &raw)?;
    state
        .links
        .delete(user_id, id)
        .or_api(&txn, Op::DeleteLink)?;
    Ok(done(&txn, "Link deleted successfully"))
}
