//! Session handling: the `session` cookie and the authenticated-caller
//! extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::RequestPartsExt;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use domain::UserId;
use tracing::debug;

use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Attributes of the session cookie.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    pub ttl: chrono::Duration,
    pub secure: bool,
}

impl CookieSettings {
    pub fn session(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    /// Cookie whose addition to the jar expires the session.
    pub fn removal(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::ZERO)
            .build()
    }
}

/// The caller's user id, taken from the `session` cookie or, failing that,
/// an `Authorization: Bearer` header. Rejects with a bare 401.
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookie_token = CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty());

        let token = match cookie_token {
            Some(t) => t,
            None => {
                let TypedHeader(Authorization(bearer)) = parts
                    .extract::<TypedHeader<Authorization<Bearer>>>()
                    .await
                    .map_err(|_| {
                        debug!("no session cookie or bearer token");
                        StatusCode::UNAUTHORIZED
                    })?;
                bearer.token().to_string()
            }
        };

        state
            .accounts
            .authenticate(&token)
            .map(AuthUser)
            .map_err(|_| StatusCode::UNAUTHORIZED)
    }
}
