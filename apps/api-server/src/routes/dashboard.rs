use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::{ok, ApiError, Op, OrApiError, TxnId};
use crate::AppState;

#[derive(Deserialize)]
pub struct MetricsParams {
    start_at: Option<String>,
    end_at: Option<String>,
}

pub async fn metrics(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|r| ApiError::validation(&txn, &r.body_text()))?;
    let start = http_common::parse_date_param(params.start_at.as_deref())
        .map_err(|m| ApiError::validation(&txn, &format!("start_at: {m}")))?;
    let end = http_common::parse_date_param(params.end_at.as_deref())
        .map_err(|m| ApiError::validation(&txn, &format!("end_at: {m}")))?;
    let metrics = state
        .dashboard
        .metrics_for_dates(user_id, start, end)
        .or_api(&txn, Op::Dashboard)?;
    Ok(ok(&txn, "Dashboard metrics fetched successfully", metrics))
}
