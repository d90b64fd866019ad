use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use domain::{CampaignQuery, NewCampaign};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::{done, json_body, ok, parse_id, ApiError, Op, OrApiError, TxnId};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateCampaignReq {
    name: String,
    utm_campaign: String,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    name: Option<String>,
    start_at: Option<String>,
    end_at: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
fn parse_instant(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| Some(d.and_time(chrono::NaiveTime::MIN).and_utc()))
        .map_err(|_| format!("{field} must be an RFC 3339 timestamp or YYYY-MM-DD"))
}

impl ListParams {
    fn into_query(self) -> Result<CampaignQuery, String> {
        let defaults = CampaignQuery::default();
        Ok(CampaignQuery {
            name: self.name.filter(|n| !n.trim().is_empty()),
            start_at: parse_instant("start_at", self.start_at.as_deref())?,
            end_at: parse_instant("end_at", self.end_at.as_deref())?,
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CreateCampaignReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = json_body(&txn, body)?;
    let campaign = state
        .campaigns
        .create(
            user_id,
            NewCampaign {
                name: req.name,
                utm_campaign: req.utm_campaign,
                start_at: req.start_at,
                end_at: req.end_at,
            },
        )
        .or_api(&txn, Op::CreateCampaign)?;
    Ok(ok(&txn, "Campaign created successfully", campaign))
}

pub async fn list(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|r| ApiError::validation(&txn, &r.body_text()))?;
    let query = params
        .into_query()
        .map_err(|m| ApiError::validation(&txn, &m))?;
    let campaigns = state
        .campaigns
        .query(user_id, query)
        .or_api(&txn, Op::ListCampaigns)?;
    Ok(ok(&txn, "Campaigns fetched successfully", campaigns))
}

pub async fn available(State(state): State<AppState>, txn: TxnId) -> Result<Response, ApiError> {
    let campaigns = state.campaigns.available().or_api(&txn, Op::ListCampaigns)?;
    Ok(ok(&txn, "Campaigns fetched successfully", campaigns))
}

pub async fn delete(
    State(state): State<AppState>,
    txn: TxnId,
    AuthUser(user_id): AuthUser,
    Path(raw): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&txn, &raw)?;
    state
        .campaigns
        .delete(user_id, id)
        .or_api(&txn, Op::DeleteCampaign)?;
    Ok(done(&txn, "Campaign deleted successfully"))
}
