//! Shopee affiliate open API client (GraphQL).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    CoreError, ImportedOffer, ImportedProduct, Marketplace, MarketplaceCredential,
    MarketplaceGateway,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::GatewayError;

/// `Authorization` header value: SHA256 over app id, timestamp, payload and secret.
pub fn authorization(app_id: &str, secret: &str, timestamp: i64, payload: &str) -> String {
    let digest = Sha256::digest(format!("{app_id}{timestamp}{payload}{secret}").as_bytes());
    format!(
        "SHA256 Credential={app_id}, Timestamp={timestamp}, Signature={}",
        hex::encode(digest)
    )
}

/// Extract `(shop_id, item_id)` from a product URL such as
/// `https://shopee.co.th/product/123/456` or `https://shopee.co.th/name-i.123.456`.
pub fn parse_product_url(raw: &str) -> Result<(u64, u64), GatewayError> {
    let bad = || GatewayError::BadProductUrl(raw.to_string());
    let url = Url::parse(raw).map_err(|_| bad())?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    if let Some(pos) = segments.iter().position(|s| *s == "product") {
        if let (Some(shop), Some(item)) = (segments.get(pos + 1), segments.get(pos + 2)) {
            return Ok((shop.parse().map_err(|_| bad())?, item.parse().map_err(|_| bad())?));
        }
    }

    let last = segments.last().ok_or_else(bad)?;
    let ids = match last.rfind("-i.") {
        Some(idx) => &last[idx + 3..],
        None => last.strip_prefix("i.").ok_or_else(bad)?,
    };
    let (shop, item) = ids.split_once('.').ok_or_else(bad)?;
    Ok((shop.parse().map_err(|_| bad())?, item.parse().map_err(|_| bad())?))
}

/// Render a string as a quoted GraphQL literal.
fn literal(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortLinkData {
    generate_short_link: ShortLink,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortLink {
    #[serde(default)]
    short_link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferData {
    product_offer_v2: OfferConnection,
}

#[derive(Debug, Deserialize)]
struct OfferConnection {
    #[serde(default)]
    nodes: Vec<OfferNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferNode {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub shop_name: String,
}

pub struct ShopeeGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl ShopeeGateway {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        cred: &MarketplaceCredential,
        query: String,
    ) -> Result<T, GatewayError> {
        let payload = serde_json::json!({ "query": query }).to_string();
        let timestamp = Utc::now().timestamp();
        debug!(endpoint = %self.endpoint, "calling shopee");
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(
                AUTHORIZATION,
                authorization(&cred.app_id, &cred.app_secret, timestamp, &payload),
            )
            .body(payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                marketplace: Marketplace::Shopee,
                status: resp.status().as_u16(),
            });
        }
        let body: GraphqlResponse<T> = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(Marketplace::Shopee, e.to_string()))?;
        if let Some(first) = body.errors.into_iter().next() {
            let code = first
                .extensions
                .as_ref()
                .and_then(|x| x.get("code"))
                .map(|c| c.to_string())
                .unwrap_or_default();
            warn!(%code, message = %first.message, "shopee rejected request");
            return Err(GatewayError::Api {
                marketplace: Marketplace::Shopee,
                code,
                message: first.message,
            });
        }
        body.data
            .ok_or_else(|| GatewayError::Decode(Marketplace::Shopee, "missing data".into()))
    }

    pub async fn short_link(
        &self,
        cred: &MarketplaceCredential,
        origin_url: &str,
        sub_id: &str,
    ) -> Result<String, GatewayError> {
        let query = format!(
            "mutation{{generateShortLink(input:{{originUrl:{},subIds:[{}]}}){{shortLink}}}}",
            literal(origin_url),
            literal(sub_id)
        );
        let data: ShortLinkData = self.graphql(cred, query).await?;
        Ok(data.generate_short_link.short_link)
    }

    pub async fn product_offers(
        &self,
        cred: &MarketplaceCredential,
        shop_id: u64,
        item_id: u64,
    ) -> Result<Vec<OfferNode>, GatewayError> {
        let query = format!(
            "{{productOfferV2(shopId:{shop_id},itemId:{item_id}){{nodes{{productName imageUrl price shopName}}}}}}"
        );
        let data: OfferData = self.graphql(cred, query).await?;
        Ok(data.product_offer_v2.nodes)
    }
}

fn parse_price(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or_else(|_| {
        warn!(price = raw, "unparseable shopee price, storing zero");
        Decimal::ZERO
    })
}

#[async_trait]
impl MarketplaceGateway for ShopeeGateway {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Shopee
    }

    async fn create_affiliate_link(
        &self,
        credential: &MarketplaceCredential,
        source_url: &str,
        campaign_tag: &str,
    ) -> Result<String, CoreError> {
        Ok(self.short_link(credential, source_url, campaign_tag).await?)
    }

    async fn fetch_product_info(
        &self,
        credential: &MarketplaceCredential,
        source_url: &str,
    ) -> Result<Vec<ImportedProduct>, CoreError> {
        let (shop_id, item_id) = parse_product_url(source_url)?;
        let nodes = self.product_offers(credential, shop_id, item_id).await?;
        let Some(first) = nodes.first() else {
            return Ok(Vec::new());
        };
        let product = ImportedProduct {
            title: first.product_name.clone(),
            image_url: first.image_url.clone(),
            offers: nodes
                .iter()
                .map(|n| ImportedOffer {
                    store_name: n.shop_name.clone(),
                    price: parse_price(&n.price),
                })
                .collect(),
        };
        Ok(vec![product])
    }
}
