//! Test doubles and fixtures shared by the service tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::adapters::memory_repo::InMemoryStore;
use crate::{
    Campaign, CampaignRepository, Clock, CoreError, CredentialInput, CredentialRepository,
    ImportedProduct, Marketplace, MarketplaceCredential, MarketplaceGateway, Offer, Product,
    ProductRepository, ShortCode, ShortCodeGenerator, UserId,
};

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

#[derive(Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Hands out the scripted codes in order, then repeats the last one.
pub struct SequenceCodes(Mutex<Vec<&'static str>>);

impl SequenceCodes {
    pub fn new(codes: &[&'static str]) -> Self {
        let mut v = codes.to_vec();
        v.reverse();
        Self(Mutex::new(v))
    }
}

impl ShortCodeGenerator for SequenceCodes {
    fn next_code(&self) -> ShortCode {
        let mut v = self.0.lock().unwrap();
        let code = if v.len() > 1 { v.pop() } else { v.last().copied() };
        ShortCode::new(code.unwrap_or("fallback")).unwrap()
    }
}

pub struct StubGateway {
    pub marketplace: Marketplace,
    pub link: Result<String, String>,
    pub products: Vec<ImportedProduct>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl StubGateway {
    pub fn new(marketplace: Marketplace, link: &str) -> Self {
        Self {
            marketplace,
            link: Ok(link.to_string()),
            products: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(marketplace: Marketplace, message: &str) -> Self {
        Self {
            link: Err(message.to_string()),
            ..Self::new(marketplace, "")
        }
    }

    pub fn with_products(mut self, products: Vec<ImportedProduct>) -> Self {
        self.products = products;
        self
    }
}

#[async_trait]
impl MarketplaceGateway for StubGateway {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    async fn create_affiliate_link(
        &self,
        _credential: &MarketplaceCredential,
        source_url: &str,
        campaign_tag: &str,
    ) -> Result<String, CoreError> {
        self.calls
            .lock()
            .unwrap()
            .push((source_url.to_string(), campaign_tag.to_string()));
        self.link.clone().map_err(CoreError::Upstream)
    }

    async fn fetch_product_info(
        &self,
        _credential: &MarketplaceCredential,
        _source_url: &str,
    ) -> Result<Vec<ImportedProduct>, CoreError> {
        self.link.clone().map_err(CoreError::Upstream)?;
        Ok(self.products.clone())
    }
}

pub fn seed_credential(store: &InMemoryStore, user_id: UserId, marketplace: Marketplace) {
    let input = CredentialInput {
        app_key: "key".into(),
        app_secret: "secret".into(),
        app_id: "app".into(),
        user_token: "token".into(),
    };
    store
        .upsert_credential(user_id, marketplace, &input, noon())
        .unwrap();
}

pub fn seed_product(store: &InMemoryStore, user_id: UserId, marketplace: Option<Marketplace>) -> Product {
    let product = Product {
        id: Uuid::now_v7(),
        title: "Rice cooker".into(),
        image_url: "https://img.example/rc.jpg".into(),
        source_url: "https://shopee.co.th/product/11/22".into(),
        user_id,
        created_at: noon(),
        updated_at: noon(),
    };
    let offers: Vec<Offer> = marketplace
        .map(|m| Offer {
            id: Uuid::now_v7(),
            product_id: product.id,
            marketplace: m,
            store_name: "Home Store".into(),
            price: Decimal::new(129900, 2),
            last_checked_at: noon(),
            created_at: noon(),
        })
        .into_iter()
        .collect();
    store.create_product(&product, &offers).unwrap();
    product
}

pub fn seed_campaign(store: &InMemoryStore, user_id: UserId) -> Campaign {
    let campaign = Campaign {
        id: Uuid::now_v7(),
        name: "Payday sale".into(),
        utm_campaign: "payday".into(),
        start_at: noon() - Duration::days(1),
        end_at: noon() + Duration::days(5),
        user_id,
        created_at: noon(),
        updated_at: noon(),
    };
    store.create_campaign(&campaign).unwrap();
    campaign
}
