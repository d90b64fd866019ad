//! Lazada open platform client (affiliate marketing endpoints).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    CoreError, ImportedOffer, ImportedProduct, Marketplace, MarketplaceCredential,
    MarketplaceGateway,
};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::GatewayError;

const GET_LINK_PATH: &str = "/marketing/getlink";
const PRODUCT_FEED_PATH: &str = "/marketing/product/feed";
const FALLBACK_STORE_NAME: &str = "Lazada Official Store";

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over the API path followed by every sorted key/value pair,
/// rendered as upper-case hex.
pub fn sign(secret: &str, api_path: &str, params: &BTreeMap<String, String>) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| GatewayError::Signing)?;
    mac.update(api_path.as_bytes());
    for (k, v) in params {
        mac.update(k.as_bytes());
        mac.update(v.as_bytes());
    }
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: Option<String>,
    result: Option<ResultBody<T>>,
}

#[derive(Debug, Deserialize)]
struct ResultBody<T> {
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchLinkData {
    #[serde(default)]
    url_batch_get_link_info_list: Vec<LinkInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub regular_promotion_link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub pictures: Vec<String>,
    #[serde(default)]
    pub discount_price: f64,
    #[serde(default)]
    pub brand_name: String,
}

pub struct LazadaGateway {
    client: reqwest::Client,
    base_url: String,
}

impl LazadaGateway {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        cred: &MarketplaceCredential,
        api_path: &str,
        extra: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("app_key".into(), cred.app_key.clone());
        params.insert("timestamp".into(), Utc::now().timestamp_millis().to_string());
        params.insert("sign_method".into(), "sha256".into());
        params.insert("userToken".into(), cred.user_token.clone());
        for (k, v) in extra {
            params.insert((*k).to_string(), v.clone());
        }
        let signature = sign(&cred.app_secret, api_path, &params)?;
        params.insert("sign".into(), signature);

        debug!(api_path, "calling lazada");
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, api_path))
            .query(&params)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                marketplace: Marketplace::Lazada,
                status: resp.status().as_u16(),
            });
        }
        let body: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(Marketplace::Lazada, e.to_string()))?;
        if !body.code.is_empty() && body.code != "0" {
            warn!(code = %body.code, api_path, "lazada rejected request");
            return Err(GatewayError::Api {
                marketplace: Marketplace::Lazada,
                code: body.code,
                message: body.message.unwrap_or_default(),
            });
        }
        Ok(body.result.and_then(|r| r.data).unwrap_or_default())
    }

    /// Resolve a product URL into promotion links, tagged with `sub_id` when given.
    pub async fn batch_link(
        &self,
        cred: &MarketplaceCredential,
        url: &str,
        sub_id: Option<&str>,
    ) -> Result<Vec<LinkInfo>, GatewayError> {
        let mut extra = vec![("inputType", "url".to_string()), ("inputValue", url.to_string())];
        if let Some(tag) = sub_id {
            extra.push(("subId1", tag.to_string()));
        }
        let data: BatchLinkData = self.call(cred, GET_LINK_PATH, &extra).await?;
        Ok(data.url_batch_get_link_info_list)
    }

    pub async fn product_feed(
        &self,
        cred: &MarketplaceCredential,
        product_id: &str,
    ) -> Result<Vec<FeedItem>, GatewayError> {
        let extra = [
            ("productIds", product_id.to_string()),
            ("page", "1".to_string()),
            ("limit", "1".to_string()),
        ];
        self.call(cred, PRODUCT_FEED_PATH, &extra).await
    }
}

fn to_imported(item: FeedItem) -> Result<ImportedProduct, GatewayError> {
    let price = Decimal::try_from(item.discount_price)
        .map_err(|e| GatewayError::Decode(Marketplace::Lazada, format!("price: {e}")))?;
    let store_name = if item.brand_name.trim().is_empty() {
        FALLBACK_STORE_NAME.to_string()
    } else {
        item.brand_name
    };
    Ok(ImportedProduct {
        title: item.product_name,
        image_url: item.pictures.into_iter().next().unwrap_or_default(),
        offers: vec![ImportedOffer { store_name, price }],
    })
}

#[async_trait]
impl MarketplaceGateway for LazadaGateway {
    fn marketplace(&self) -> Marketplace {
        Marketplace::Lazada
    }

    async fn create_affiliate_link(
        &self,
        credential: &MarketplaceCredential,
        source_url: &str,
        campaign_tag: &str,
    ) -> Result<String, CoreError> {
        let links = self
            .batch_link(credential, source_url, Some(campaign_tag))
            .await?;
        links
            .into_iter()
            .map(|l| l.regular_promotion_link)
            .find(|l| !l.is_empty())
            .ok_or_else(|| CoreError::Upstream("lazada returned no promotion link".into()))
    }

    async fn fetch_product_info(
        &self,
        credential: &MarketplaceCredential,
        source_url: &str,
    ) -> Result<Vec<ImportedProduct>, CoreError> {
        let links = self.batch_link(credential, source_url, None).await?;
        let mut out = Vec::new();
        for info in links {
            let feed = self.product_feed(credential, &info.product_id).await?;
            if feed.is_empty() {
                return Err(GatewayError::NotAvailable.into());
            }
            for item in feed {
                out.push(to_imported(item)?);
            }
        }
        Ok(out)
    }
}
