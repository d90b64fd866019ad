use super::*;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use domain::{ImportedOffer, ImportedProduct, Marketplace, MarketplaceCredential, MarketplaceGateway, UserId};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::util::ServiceExt;

struct PlainAuthority;

impl SessionAuthority for PlainAuthority {
    fn hash_password(&self, plain: &str) -> Result<String, CoreError> {
        Ok(format!("plain:{plain}"))
    }

    fn verify_password(&self, plain: &str, hash: &str) -> Result<bool, CoreError> {
        Ok(hash == format!("plain:{plain}"))
    }

    fn issue_token(&self, user_id: UserId) -> Result<String, CoreError> {
        Ok(format!("tok-{user_id}"))
    }

    fn verify_token(&self, token: &str) -> Result<UserId, CoreError> {
        token
            .strip_prefix("tok-")
            .and_then(|id| id.parse().ok())
            .ok_or(CoreError::Unauthorized)
    }
}

struct StubShopee;

#[async_trait]
impl MarketplaceGateway for StubShopee {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Shopee
    }

    async fn create_affiliate_link(
        &self,
        _credential: &MarketplaceCredential,
        _source_url: &str,
        campaign_tag: &str,
    ) -> Result<String, CoreError> {
        Ok(format!("https://s.shopee.co.th/aff?sub_id={campaign_tag}"))
    }

    async fn fetch_product_info(
        &self,
        _credential: &MarketplaceCredential,
        _source_url: &str,
    ) -> Result<Vec<ImportedProduct>, CoreError> {
        Ok(vec![ImportedProduct {
            title: "Rice cooker".into(),
            image_url: "https://img.example/rc.jpg".into(),
            offers: vec![ImportedOffer {
                store_name: "Home Store".into(),
                price: Decimal::new(129900, 2),
            }],
        }])
    }
}

fn test_app() -> Router {
    app(AppState::new(
        Arc::new(InMemoryStore::new()),
        GatewayRegistry::new().with(Arc::new(StubShopee)),
        Arc::new(PlainAuthority),
        CookieSettings {
            ttl: chrono::Duration::minutes(60),
            secure: false,
        },
        Some("https://go.example".into()),
    ))
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::COOKIE, format!("session={t}"));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, value)
}

async fn register(router: &Router, email: &str) -> String {
    let (status, _, body) = send(
        router,
        "POST",
        "/api/v1/user/register",
        None,
        Some(json!({"email": email, "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"].as_str().unwrap().to_string()
}

/// Registers a seller with Shopee credentials, one product and one campaign.
async fn seed_seller(router: &Router, email: &str) -> (String, String, String) {
    let token = register(router, email).await;
    let (status, _, _) = send(
        router,
        "POST",
        "/api/v1/user/market-credential",
        Some(&token),
        Some(json!({"platform": "shopee", "app_id": "123", "app_secret": "s3cret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(
        router,
        "POST",
        "/api/v1/product",
        Some(&token),
        Some(json!({"marketplace": "shopee", "source_url": "https://shopee.co.th/product/11/22"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let product_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        router,
        "POST",
        "/api/v1/campaign",
        Some(&token),
        Some(json!({
            "name": "Payday sale",
            "utm_campaign": "payday",
            "start_at": "2024-01-01T00:00:00Z",
            "end_at": "2099-12-31T00:00:00Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let campaign_id = body["data"]["id"].as_str().unwrap().to_string();

    (token, product_id, campaign_id)
}

#[tokio::test]
async fn health_is_not_enveloped() {
    let (status, _, body) = send(&test_app(), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn register_sets_session_cookie_and_me_hides_hash() {
    let router = test_app();
    let (status, headers, body) = send(
        &router,
        "POST",
        "/api/v1/user/register",
        None,
        Some(json!({"email": "Seller@Example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["code"], 0);
    let token = body["data"].as_str().unwrap();
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with(&format!("session={token}")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=3600"));

    let (status, _, body) = send(&router, "GET", "/api/v1/user/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "seller@example.com");
    assert!(body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn bearer_header_is_accepted_and_missing_auth_is_401() {
    let router = test_app();
    let token = register(&router, "a@example.com").await;

    let req = Request::builder()
        .uri("/api/v1/user/me")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, _, _) = send(&router, "GET", "/api/v1/user/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&router, "GET", "/api/v1/product", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_errors_and_duplicate_register() {
    let router = test_app();
    register(&router, "a@example.com").await;

    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/user/register",
        None,
        Some(json!({"email": "a@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(1001)));

    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/user/login",
        None,
        Some(json!({"email": "a@example.com", "password": "wrong-pw"})),
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::UNAUTHORIZED, json!(1004)));

    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/user/login",
        None,
        Some(json!({"email": "nobody@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(1003)));

    let (status, headers, _) = send(
        &router,
        "POST",
        "/api/v1/user/login",
        None,
        Some(json!({"email": "a@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::SET_COOKIE).is_some());
}

#[tokio::test]
async fn logout_expires_cookie() {
    let (status, headers, body) =
        send(&test_app(), "POST", "/api/v1/user/logout", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn malformed_input_is_validation_error() {
    let router = test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/user/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], 9000);
    assert_eq!(body["success"], false);

    let (status, _, body) = send(&router, "GET", "/api/v1/product/not-a-uuid", None, None).await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(9000)));

    let token = register(&router, "a@example.com").await;
    let (status, _, body) = send(
        &router,
        "GET",
        "/api/v1/user/market-credential/amazon",
        Some(&token),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(9000)));
}

#[tokio::test]
async fn txn_id_matches_request_id_header() {
    let (_, headers, body) = send(&test_app(), "GET", "/go/nope", None, None).await;
    let request_id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(body["txn_id"], request_id);
}

#[tokio::test]
async fn credential_check_and_delete() {
    let router = test_app();
    let token = register(&router, "a@example.com").await;
    let uri = "/api/v1/user/market-credential/lazada";

    let (status, _, body) = send(&router, "GET", uri, Some(&token), None).await;
    assert_eq!((status, body["code"].clone()), (StatusCode::NOT_FOUND, json!(1007)));

    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/user/market-credential",
        Some(&token),
        Some(json!({"platform": "lazada", "app_key": "k", "app_secret": "s", "user_token": "t"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _, body) = send(&router, "GET", uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], true);

    let (status, _, _) = send(&router, "DELETE", uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, body) = send(&router, "DELETE", uri, Some(&token), None).await;
    assert_eq!((status, body["code"].clone()), (StatusCode::NOT_FOUND, json!(1006)));
}

#[tokio::test]
async fn link_redirect_and_dashboard_flow() {
    let router = test_app();
    let (token, product_id, campaign_id) = seed_seller(&router, "seller@example.com").await;

    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/link",
        Some(&token),
        Some(json!({"product_id": product_id, "campaign_id": campaign_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let link = &body["data"];
    let code = link["short_code"].as_str().unwrap().to_string();
    assert_eq!(link["target_url"], "https://s.shopee.co.th/aff?sub_id=payday");
    assert_eq!(link["short_url"], format!("https://go.example/go/{code}"));

    let (status, _, body) = send(
        &router,
        "GET",
        &format!("/api/v1/link/campaign/{campaign_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _, body) = send(
        &router,
        "GET",
        &format!("/api/v1/link/short-code/{code}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["campaign_id"], campaign_id);

    for uri in [format!("/go/{code}"), format!("/api/v1/link/redirect/{code}")] {
        let (status, headers, _) = send(&router, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(
            headers.get(header::LOCATION).unwrap(),
            "https://s.shopee.co.th/aff?sub_id=payday"
        );
    }

    let (status, _, body) =
        send(&router, "GET", "/api/v1/dashboard/metrics", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let metrics = body["data"]["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["click_count"], 2);
    assert_eq!(metrics[0]["campaign"], campaign_id);
    assert_eq!(metrics[0]["marketplace"], "shopee");
    assert_eq!(body["data"]["top_product"]["clicks"], 2);
    assert_eq!(body["data"]["top_product"]["product"]["id"], product_id);
}

#[tokio::test]
async fn ownership_is_enforced() {
    let router = test_app();
    let (owner, product_id, campaign_id) = seed_seller(&router, "owner@example.com").await;
    let (_, _, body) = send(
        &router,
        "POST",
        "/api/v1/link",
        Some(&owner),
        Some(json!({"product_id": product_id, "campaign_id": campaign_id})),
    )
    .await;
    let link_id = body["data"]["id"].as_str().unwrap().to_string();

    let intruder = register(&router, "intruder@example.com").await;
    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/link",
        Some(&intruder),
        Some(json!({"product_id": product_id, "campaign_id": campaign_id})),
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::FORBIDDEN, json!(4003)));

    let (status, _, body) = send(
        &router,
        "DELETE",
        &format!("/api/v1/link/{link_id}"),
        Some(&intruder),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::FORBIDDEN, json!(4011)));

    let (status, _, body) = send(
        &router,
        "DELETE",
        &format!("/api/v1/campaign/{campaign_id}"),
        Some(&intruder),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::FORBIDDEN, json!(3005)));

    let (status, _, body) = send(
        &router,
        "GET",
        &format!("/api/v1/product/{product_id}/offer"),
        Some(&intruder),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::FORBIDDEN, json!(2003)));
}

#[tokio::test]
async fn deleting_campaign_cascades_to_links() {
    let router = test_app();
    let (token, product_id, campaign_id) = seed_seller(&router, "seller@example.com").await;
    let (_, _, body) = send(
        &router,
        "POST",
        "/api/v1/link",
        Some(&token),
        Some(json!({"product_id": product_id, "campaign_id": campaign_id})),
    )
    .await;
    let code = body["data"]["short_code"].as_str().unwrap().to_string();

    let (status, _, _) = send(
        &router,
        "DELETE",
        &format!("/api/v1/campaign/{campaign_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send(&router, "GET", &format!("/go/{code}"), None, None).await;
    assert_eq!((status, body["code"].clone()), (StatusCode::NOT_FOUND, json!(4010)));
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn link_without_credential_is_rejected() {
    let router = test_app();
    let (token, product_id, campaign_id) = seed_seller(&router, "seller@example.com").await;
    send(
        &router,
        "DELETE",
        "/api/v1/user/market-credential/shopee",
        Some(&token),
        None,
    )
    .await;

    let (status, _, body) = send(
        &router,
        "POST",
        "/api/v1/link",
        Some(&token),
        Some(json!({"product_id": product_id, "campaign_id": campaign_id})),
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_GATEWAY, json!(4009)));
}

#[tokio::test]
async fn campaigns_list_and_available() {
    let router = test_app();
    let (token, _, campaign_id) = seed_seller(&router, "seller@example.com").await;

    let (status, _, body) = send(
        &router,
        "GET",
        "/api/v1/campaign?name=Payday&page=1&limit=10",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"][0]["id"], campaign_id);

    let (status, _, body) = send(
        &router,
        "GET",
        "/api/v1/campaign?limit=500",
        Some(&token),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(9000)));

    let (status, _, body) = send(&router, "GET", "/api/v1/campaign/available", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn dashboard_rejects_bad_dates() {
    let router = test_app();
    let token = register(&router, "a@example.com").await;
    let (status, _, body) = send(
        &router,
        "GET",
        "/api/v1/dashboard/metrics?start_at=2024-13-01",
        Some(&token),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(9000)));

    let (status, _, body) = send(
        &router,
        "GET",
        "/api/v1/dashboard/metrics?start_at=2024-05-10&end_at=2024-05-01",
        Some(&token),
        None,
    )
    .await;
    assert_eq!((status, body["code"].clone()), (StatusCode::BAD_REQUEST, json!(9000)));

    let (status, _, body) = send(
        &router,
        "GET",
        "/api/v1/dashboard/metrics?start_at=2024-05-01&end_at=2024-05-10",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["metrics"], json!([]));
    assert_eq!(body["data"]["top_product"]["clicks"], 0);
}

#[tokio::test]
async fn dashboard_malformed_query_uses_envelope() {
    let router = test_app();
    let token = register(&router, "a@example.com").await;
    let (status, headers, body) = send(
        &router,
        "GET",
        "/api/v1/dashboard/metrics?start_at=2024-05-01&start_at=2024-05-02",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!(9000));
    let request_id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(body["txn_id"], request_id);
}
