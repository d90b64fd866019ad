//! marketplace — HTTP gateways to the Lazada and Shopee affiliate APIs.
//!
//! Purpose
//! - Implement `domain::MarketplaceGateway` for each supported marketplace:
//!   minting tracked affiliate URLs and looking up product metadata.
//! - Sign every request with the caller's stored credentials.
//!
//! API
//! - `build_registry(&GatewayConfig)` → a `GatewayRegistry` holding both
//!   gateways over one shared `reqwest::Client`.
//!
//! Notes
//! - Every call is bounded by the configured timeout; transport, status and
//!   payload failures surface as `CoreError::Upstream`.

use std::sync::Arc;
use std::time::Duration;

use domain::gateway::GatewayRegistry;
use domain::{CoreError, Marketplace};

pub mod lazada;
pub mod shopee;

pub use lazada::LazadaGateway;
pub use shopee::ShopeeGateway;

pub const DEFAULT_LAZADA_API_URL: &str = "https://api.lazada.co.th/rest";
pub const DEFAULT_SHOPEE_API_URL: &str = "https://open-api.affiliate.shopee.co.th/graphql";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
    #[error("{marketplace} responded with status {status}")]
    Status { marketplace: Marketplace, status: u16 },
    #[error("{marketplace} api error {code}: {message}")]
    Api {
        marketplace: Marketplace,
        code: String,
        message: String,
    },
    #[error("unexpected {0} response: {1}")]
    Decode(Marketplace, String),
    #[error("unsupported product url: {0}")]
    BadProductUrl(String),
    #[error("this product is not available for affiliation")]
    NotAvailable,
    #[error("request signing failed")]
    Signing,
}

impl From<GatewayError> for CoreError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::BadProductUrl(_) => CoreError::InvalidInput(e.to_string()),
            other => CoreError::Upstream(other.to_string()),
        }
    }
}

/// Endpoints and limits for the marketplace clients.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub lazada_api_url: String,
    pub shopee_api_url: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            lazada_api_url: DEFAULT_LAZADA_API_URL.to_string(),
            shopee_api_url: DEFAULT_SHOPEE_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub fn build_registry(cfg: &GatewayConfig) -> Result<GatewayRegistry, GatewayError> {
    let client = http_client(cfg.timeout)?;
    Ok(GatewayRegistry::new()
        .with(Arc::new(LazadaGateway::new(
            client.clone(),
            &cfg.lazada_api_url,
        )))
        .with(Arc::new(ShopeeGateway::new(client, &cfg.shopee_api_url))))
}
