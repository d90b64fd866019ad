use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::CookieJar;
use domain::{CredentialInput, Marketplace};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::errors::{done, json_body, ok, ApiError, Op, OrApiError, TxnId};
use crate::AppState;

#[derive(Deserialize)]
pub struct AuthReq {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct CredentialReq {
    platform: String,
    #[serde(flatten)]
    credential: CredentialInput,
}

fn platform(txn: &TxnId, raw: &str) -> Result<Marketplace, ApiError> {
    Marketplace::parse(raw).ok_or_else(|| {
        ApiError::validation(txn, &format!("platform must be one of lazada, shopee; got '{raw}'"))
    })
}

pub async fn register(
    State(state): State<AppState>,
    txn: TxnId,
    jar: CookieJar,
    body: Result<Json<AuthReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(&txn, body)?;
    let session = state
        .accounts
        .register(&req.email, &req.password)
        .or_api(&txn, Op::Register)?;
    let jar = jar.add(state.cookies.session(session.token.clone()));
    Ok((jar, ok(&txn, "User registered successfully", session.token)).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    txn: TxnId,
    jar: CookieJar,
    body: Result<Json<AuthReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(&txn, body)?;
    let session = state
        .accounts
        .login(&req.email, &req.password)
        .or_api(&txn, Op::Login)?;
    info!(user_id = session.user.id, "user logged in");
    let jar = jar.add(state.cookies.session(session.token.clone()));
    Ok((jar, ok(&txn, "User logged in successfully", session.token)).into_response())
}

pub async fn logout(State(state): State<AppState>, txn: TxnId, jar: CookieJar) -> Response {
    let jar = jar.add(state.cookies.removal());
    (jar, done(&txn, "Logged out successfully")).into_response()
}

pub async fn me(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError> {
    let user = state.accounts.me(user_id).or_api(&txn, Op::Me)?;
    Ok(ok(&txn, "User retrieved successfully", user))
}

pub async fn save_credential(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CredentialReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(&txn, body)?;
    let marketplace = platform(&txn, &req.platform)?;
    state
        .accounts
        .save_credential(user_id, marketplace, &req.credential)
        .or_api(&txn, Op::SaveCredential)?;
    Ok(done(&txn, "Marketplace credential saved successfully"))
}

pub async fn check_credential(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let marketplace = platform(&txn, &raw)?;
    state
        .accounts
        .check_credential(user_id, marketplace)
        .or_api(&txn, Op::CheckCredential)?;
    Ok(ok(&txn, "Marketplace credential found", true))
}

pub async fn delete_credential(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let marketplace = platform(&txn, &raw)?;
    state
        .accounts
        .delete_credential(user_id, marketplace)
        .or_api(&txn, Op::DeleteCredential)?;
    Ok(done(&txn, "Marketplace credential deleted successfully"))
}
