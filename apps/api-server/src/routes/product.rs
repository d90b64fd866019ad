use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use domain::Marketplace;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::{done, json_body, ok, parse_id, ApiError, Op, OrApiError, TxnId};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateProductReq {
    marketplace: String,
    source_url: String,
}

pub async fn create(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CreateProductReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(&txn, body)?;
    let marketplace = Marketplace::parse(&req.marketplace).ok_or_else(|| {
        ApiError::validation(&txn, "marketplace must be one of lazada, shopee")
    })?;
    let products = state
        .products
        .import(user_id, marketplace, &req.source_url)
        .await
        .or_api(&txn, Op::CreateProduct)?;
    Ok(ok(&txn, "Product created successfully", products))
}

pub async fn list(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError> {
    let products = state.products.list(user_id).or_api(&txn, Op::ListProducts)?;
    Ok(ok(&txn, "Products fetched successfully", products))
}

pub async fn get_one(
    State(state): State<AppState>,
    txn: TxnId,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&txn, &raw)?;
    let product = state.products.get(id).or_api(&txn, Op::GetProduct)?;
    Ok(ok(&txn, "Product fetched successfully", product))
}

pub async fn offer(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&txn, &raw)?;
    let offer = state
        .products
        .first_offer(user_id, id)
        .or_api(&txn, Op::GetProduct)?;
    Ok(ok(&txn, "Offers fetched successfully", offer))
}

pub async fn delete(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&txn, &raw)?;
    state
        .products
        .delete(user_id, id)
        .or_api(&txn, Op::DeleteProduct)?;
    Ok(done(&txn, "Product deleted successfully"))
}
