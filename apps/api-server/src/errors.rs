//! Response envelope plumbing: request transaction ids, success bodies and the
//! mapping from domain errors to HTTP status and stable error codes.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::{CoreError, Resource};
use http_common::{Envelope, VALIDATION_CODE};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The request id assigned by `SetRequestIdLayer`, echoed as `txn_id`.
#[derive(Clone, Debug)]
pub struct TxnId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for TxnId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(TxnId(id))
    }
}

/// Operation a handler performs; selects the error codes reported for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Register,
    Login,
    Me,
    SaveCredential,
    DeleteCredential,
    CheckCredential,
    CreateProduct,
    GetProduct,
    ListProducts,
    DeleteProduct,
    CreateCampaign,
    ListCampaigns,
    DeleteCampaign,
    CreateLink,
    GetLink,
    DeleteLink,
    Redirect,
    Dashboard,
}

impl Op {
    /// Code and message reported when the operation fails unexpectedly.
    fn internal(self) -> (u32, &'static str) {
        match self {
            Op::Register => (1002, "Failed to create user"),
            Op::Login => (1002, "Failed to log in"),
            Op::Me => (1008, "Failed to get user"),
            Op::SaveCredential => (1005, "Failed to save marketplace credential"),
            Op::DeleteCredential => (1006, "Failed to delete marketplace credential"),
            Op::CheckCredential => (1007, "Failed to check marketplace credential"),
            Op::CreateProduct => (2001, "Failed to save product"),
            Op::GetProduct => (2002, "Failed to fetch product"),
            Op::ListProducts => (2005, "Failed to fetch products"),
            Op::DeleteProduct => (2006, "Failed to delete product"),
            Op::CreateCampaign => (3001, "Failed to create campaign"),
            Op::ListCampaigns => (3002, "Failed to fetch campaigns"),
            Op::DeleteCampaign => (3003, "Failed to delete campaign"),
            Op::CreateLink | Op::GetLink => (4001, "Failed to process link"),
            Op::DeleteLink => (4012, "Failed to delete link"),
            Op::Redirect => (4013, "Failed to record click"),
            Op::Dashboard => (5001, "Failed to load dashboard metrics"),
        }
    }
}

/// Map a domain error raised by `op` to `(status, code, message)`.
pub fn classify(op: Op, err: &CoreError) -> (StatusCode, u32, String) {
    use CoreError as E;
    use StatusCode as S;

    let (status, code, message) = match (op, err) {
        (_, E::InvalidInput(msg)) => return (S::BAD_REQUEST, VALIDATION_CODE, msg.clone()),

        (Op::Register, E::AlreadyExists(_)) => (S::BAD_REQUEST, 1001, "User already exists"),
        (Op::Login, E::NotFound(_)) => (S::BAD_REQUEST, 1003, "User not found"),
        (Op::Login, E::Unauthorized) => (S::UNAUTHORIZED, 1004, "Invalid credentials"),
        (Op::Me, E::NotFound(_)) => (S::NOT_FOUND, 1008, "User not found"),
        (Op::DeleteCredential, E::NotFound(_)) => {
            (S::NOT_FOUND, 1006, "Marketplace credential not found")
        }
        (Op::CheckCredential, E::NotFound(_)) => {
            (S::NOT_FOUND, 1007, "Marketplace credential not found")
        }

        (Op::CreateProduct, E::CredentialMissing(_)) => {
            (S::BAD_GATEWAY, 2001, "Marketplace credential not found")
        }
        (Op::CreateProduct, E::Upstream(_)) => {
            (S::BAD_GATEWAY, 2001, "Failed to fetch product from marketplace")
        }
        (Op::GetProduct, E::NotFound(Resource::Offer)) => {
            (S::NOT_FOUND, 2004, "Offer not found for this product")
        }
        (Op::GetProduct | Op::DeleteProduct, E::NotFound(_)) => {
            (S::NOT_FOUND, 2002, "Product not found")
        }
        (Op::GetProduct | Op::DeleteProduct, E::Forbidden(_)) => {
            (S::FORBIDDEN, 2003, "You do not have access to this product")
        }

        (Op::DeleteCampaign, E::NotFound(_)) => (S::NOT_FOUND, 3004, "Campaign not found"),
        (Op::DeleteCampaign, E::Forbidden(_)) => (
            S::FORBIDDEN,
            3005,
            "You do not have permission to delete this campaign",
        ),

        (Op::CreateLink, E::NotFound(Resource::Product)) => {
            (S::NOT_FOUND, 4002, "Product not found")
        }
        (Op::CreateLink, E::NotFound(Resource::Campaign)) => {
            (S::NOT_FOUND, 4004, "Campaign not found")
        }
        (Op::CreateLink, E::NotFound(_)) => {
            (S::NOT_FOUND, 4006, "Offer not found for this product")
        }
        (Op::CreateLink, E::Forbidden(Resource::Campaign)) => (
            S::FORBIDDEN,
            4005,
            "You are not allowed to create link for this campaign",
        ),
        (Op::CreateLink, E::Forbidden(_)) => (
            S::FORBIDDEN,
            4003,
            "You are not allowed to create link for this product",
        ),
        (Op::CreateLink, E::CredentialMissing(_)) => {
            (S::BAD_GATEWAY, 4009, "Marketplace credentials not found")
        }
        (Op::CreateLink, E::Upstream(_)) => {
            (S::BAD_GATEWAY, 4007, "Failed to generate affiliate link")
        }
        (Op::GetLink | Op::DeleteLink | Op::Redirect, E::NotFound(_)) => {
            (S::NOT_FOUND, 4010, "Link not found")
        }
        (Op::DeleteLink, E::Forbidden(_)) => (
            S::FORBIDDEN,
            4011,
            "You do not have permission to delete this link",
        ),

        (op, E::Unauthorized) => (S::UNAUTHORIZED, op.internal().0, "Unauthorized"),
        (op, E::AlreadyExists(_)) => (S::CONFLICT, op.internal().0, "Resource already exists"),
        (op, E::Upstream(_) | E::CredentialMissing(_)) => {
            (S::BAD_GATEWAY, op.internal().0, "Marketplace request failed")
        }
        (op, _) => {
            let (code, message) = op.internal();
            (S::INTERNAL_SERVER_ERROR, code, message)
        }
    };
    (status, code, message.to_string())
}

/// A failed request rendered as an error envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Envelope<()>,
}

impl ApiError {
    pub fn new(txn: &TxnId, status: StatusCode, code: u32, message: &str) -> Self {
        Self {
            status,
            body: Envelope::fail(&txn.0, code, message),
        }
    }

    /// Malformed request input that never reached a service.
    pub fn validation(txn: &TxnId, message: &str) -> Self {
        warn!(txn_id = %txn.0, %message, "request rejected");
        Self::new(txn, StatusCode::BAD_REQUEST, VALIDATION_CODE, message)
    }

    pub fn from_core(txn: &TxnId, op: Op, err: CoreError) -> Self {
        let (status, code, message) = classify(op, &err);
        if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(txn_id = %txn.0, ?op, code, err = ?err, "request failed");
        } else {
            warn!(txn_id = %txn.0, ?op, code, err = %err, "request failed");
        }
        Self::new(txn, status, code, &message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Extension to tag a domain result with the failing operation.
pub trait OrApiError<T> {
    fn or_api(self, txn: &TxnId, op: Op) -> Result<T, ApiError>;
}

impl<T> OrApiError<T> for Result<T, CoreError> {
    fn or_api(self, txn: &TxnId, op: Op) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from_core(txn, op, e))
    }
}

/// 200 with a data payload.
pub fn ok<T: Serialize>(txn: &TxnId, message: &str, data: T) -> Response {
    (StatusCode::OK, Json(Envelope::ok(&txn.0, message, data))).into_response()
}

/// 200 without payload.
pub fn done(txn: &TxnId, message: &str) -> Response {
    (StatusCode::OK, Json(Envelope::done(&txn.0, message))).into_response()
}

/// Unwrap a JSON body, reporting decode failures as validation errors.
pub fn json_body<T>(txn: &TxnId, body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| ApiError::validation(txn, &rejection.body_text()))
}

/// Parse a path segment as a record id.
pub fn parse_id(txn: &TxnId, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation(txn, &format!("invalid id '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Marketplace;

    fn code(op: Op, err: CoreError) -> (StatusCode, u32) {
        let (s, c, _) = classify(op, &err);
        (s, c)
    }

    #[test]
    fn account_errors() {
        assert_eq!(
            code(Op::Register, CoreError::AlreadyExists(Resource::User)),
            (StatusCode::BAD_REQUEST, 1001)
        );
        assert_eq!(
            code(Op::Register, CoreError::Repository("x".into())),
            (StatusCode::INTERNAL_SERVER_ERROR, 1002)
        );
        assert_eq!(
            code(Op::Login, CoreError::NotFound(Resource::User)),
            (StatusCode::BAD_REQUEST, 1003)
        );
        assert_eq!(
            code(Op::Login, CoreError::Unauthorized),
            (StatusCode::UNAUTHORIZED, 1004)
        );
        assert_eq!(
            code(Op::CheckCredential, CoreError::NotFound(Resource::Credential)),
            (StatusCode::NOT_FOUND, 1007)
        );
    }

    #[test]
    fn link_creation_errors_are_specific() {
        let cases = [
            (CoreError::NotFound(Resource::Product), 4002),
            (CoreError::Forbidden(Resource::Product), 4003),
            (CoreError::NotFound(Resource::Campaign), 4004),
            (CoreError::Forbidden(Resource::Campaign), 4005),
            (CoreError::NotFound(Resource::Offer), 4006),
            (CoreError::Upstream("down".into()), 4007),
            (CoreError::CredentialMissing(Marketplace::Shopee), 4009),
            (CoreError::Repository("db".into()), 4001),
        ];
        for (err, expected) in cases {
            assert_eq!(code(Op::CreateLink, err).1, expected);
        }
        assert_eq!(
            code(Op::CreateLink, CoreError::Upstream("down".into())).0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn ownership_and_lookup_errors() {
        assert_eq!(
            code(Op::DeleteCampaign, CoreError::Forbidden(Resource::Campaign)),
            (StatusCode::FORBIDDEN, 3005)
        );
        assert_eq!(
            code(Op::GetProduct, CoreError::NotFound(Resource::Offer)),
            (StatusCode::NOT_FOUND, 2004)
        );
        assert_eq!(
            code(Op::DeleteLink, CoreError::Forbidden(Resource::Link)),
            (StatusCode::FORBIDDEN, 4011)
        );
        assert_eq!(
            code(Op::Redirect, CoreError::NotFound(Resource::Link)),
            (StatusCode::NOT_FOUND, 4010)
        );
        assert_eq!(
            code(Op::Redirect, CoreError::Repository("locked".into())),
            (StatusCode::INTERNAL_SERVER_ERROR, 4013)
        );
    }

    #[test]
    fn invalid_input_is_a_validation_error() {
        let (status, c, message) = classify(
            Op::Dashboard,
            &CoreError::InvalidInput("end_at must not be before start_at".into()),
        );
        assert_eq!((status, c), (StatusCode::BAD_REQUEST, VALIDATION_CODE));
        assert_eq!(message, "end_at must not be before start_at");
    }
}
