//! Domain library for the marketplace affiliate link service.
//!
//! Holds the domain types, ports (traits), error definitions and the
//! application services that orchestrate them. Storage engines, HTTP clients
//! for the marketplaces and token/password crypto live in adapter crates and
//! plug in through the traits defined here.

use std::error::Error;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric identifier of a registered user.
pub type UserId = i64;

/// Email address of a registered user.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Email(String);

impl Email {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into().trim().to_lowercase();
        let valid = match val.split_once('@') {
            Some((local, host)) => {
                !local.is_empty()
                    && host.contains('.')
                    && !host.starts_with('.')
                    && !host.ends_with('.')
                    && !host.contains('@')
                    && !val.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(CoreError::InvalidInput("invalid email".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A URL-safe token identifying a link in public redirect URLs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() || val.len() > 64 {
            return Err(CoreError::InvalidInput("invalid short code length".into()));
        }
        if !val
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidInput(
                "invalid short code characters".into(),
            ));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Online retail platforms links and products can be sourced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Lazada,
    Shopee,
}

impl Marketplace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Lazada => "lazada",
            Marketplace::Shopee => "shopee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lazada" => Some(Marketplace::Lazada),
            "shopee" => Some(Marketplace::Shopee),
            _ => None,
        }
    }
}

impl Display for Marketplace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account. The password hash never leaves the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input data for registering a user; the id is assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// API credentials a user holds for one marketplace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketplaceCredential {
    pub id: i64,
    pub user_id: UserId,
    pub marketplace: Marketplace,
    pub app_key: String,
    pub app_secret: String,
    pub app_id: String,
    pub user_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential fields supplied by the user; upserted on (user, marketplace).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialInput {
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub user_token: String,
}

/// A product imported from a marketplace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub image_url: String,
    pub source_url: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A marketplace listing (store + price) for a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Offer {
    pub id: Uuid,
    pub product_id: Uuid,
    pub marketplace: Marketplace,
    pub store_name: String,
    pub price: Decimal,
    pub last_checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A named promotion window owned by a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub utm_campaign: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether `today` falls inside the campaign window, both ends inclusive.
    pub fn is_available_on(&self, today: NaiveDate) -> bool {
        self.start_at.date_naive() <= today && today <= self.end_at.date_naive()
    }
}

/// Input data for creating a campaign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCampaign {
    pub name: String,
    pub utm_campaign: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Filters for listing a user's campaigns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CampaignQuery {
    /// Substring match on the campaign name.
    pub name: Option<String>,
    /// Only campaigns starting at or after this instant.
    pub start_at: Option<DateTime<Utc>>,
    /// Only campaigns ending at or before this instant.
    pub end_at: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl Default for CampaignQuery {
    fn default() -> Self {
        Self {
            name: None,
            start_at: None,
            end_at: None,
            page: 1,
            limit: 20,
        }
    }
}

impl CampaignQuery {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Stored short link: a short code bound to an affiliate URL for a
/// (product, campaign) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Link {
    pub id: Uuid,
    pub product_id: Uuid,
    pub campaign_id: Uuid,
    pub short_code: String,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded visit to a short code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Click {
    pub id: Uuid,
    pub link_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Daily click count for one campaign and marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricItem {
    pub date: NaiveDate,
    pub click_count: i64,
    #[serde(rename = "campaign")]
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub marketplace: Marketplace,
}

/// The most clicked product in a window. Zero-valued when nothing was clicked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TopProduct {
    pub product: Product,
    pub clicks: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardMetrics {
    pub top_product: TopProduct,
    pub metrics: Vec<MetricItem>,
}

/// Product metadata returned by a marketplace lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedProduct {
    pub title: String,
    pub image_url: String,
    pub offers: Vec<ImportedOffer>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedOffer {
    pub store_name: String,
    pub price: Decimal,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Short code generator; must not depend on request content.
pub trait ShortCodeGenerator: Send + Sync {
    fn next_code(&self) -> ShortCode;
}

/// Password hashing and session token handling.
pub trait SessionAuthority: Send + Sync {
    fn hash_password(&self, plain: &str) -> Result<String, CoreError>;
    fn verify_password(&self, plain: &str, hash: &str) -> Result<bool, CoreError>;
    fn issue_token(&self, user_id: UserId) -> Result<String, CoreError>;
    /// Resolve a token to its user id; `Unauthorized` when invalid or expired.
    fn verify_token(&self, token: &str) -> Result<UserId, CoreError>;
}

/// Remote marketplace capability: mint affiliate URLs and look up products.
#[async_trait::async_trait]
pub trait MarketplaceGateway: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    async fn create_affiliate_link(
        &self,
        credential: &MarketplaceCredential,
        source_url: &str,
        campaign_tag: &str,
    ) -> Result<String, CoreError>;

    async fn fetch_product_info(
        &self,
        credential: &MarketplaceCredential,
        source_url: &str,
    ) -> Result<Vec<ImportedProduct>, CoreError>;
}

/// Repository port for user accounts.
pub trait UserRepository: Send + Sync {
    /// Insert a user; `AlreadyExists(User)` when the email is taken.
    fn create_user(&self, user: NewUser) -> Result<User, CoreError>;
    fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError>;
    fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, CoreError>;
}

/// Repository port for marketplace credentials.
pub trait CredentialRepository: Send + Sync {
    /// Insert or update the credential keyed on (user, marketplace).
    fn upsert_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
        input: &CredentialInput,
        now: DateTime<Utc>,
    ) -> Result<MarketplaceCredential, CoreError>;
    fn get_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
    ) -> Result<Option<MarketplaceCredential>, CoreError>;
    /// Returns whether a row was removed.
    fn delete_credential(&self, user_id: UserId, marketplace: Marketplace)
        -> Result<bool, CoreError>;
}

/// Repository port for products and their offers.
pub trait ProductRepository: Send + Sync {
    /// Persist a product together with its offers in one unit of work.
    fn create_product(&self, product: &Product, offers: &[Offer]) -> Result<(), CoreError>;
    fn get_product(&self, id: Uuid) -> Result<Option<Product>, CoreError>;
    fn list_products(&self, user_id: UserId) -> Result<Vec<Product>, CoreError>;
    /// All offers of a product, oldest first. Adapters may build
    /// `first_offer` on top of it.
    fn list_offers(&self, product_id: Uuid) -> Result<Vec<Offer>, CoreError>;
    /// The earliest created offer of a product.
    fn first_offer(&self, product_id: Uuid) -> Result<Option<Offer>, CoreError>;
    /// Remove the product, its offers, its links and their clicks atomically.
    fn delete_product_cascade(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Repository port for campaigns.
pub trait CampaignRepository: Send + Sync {
    fn create_campaign(&self, campaign: &Campaign) -> Result<(), CoreError>;
    fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, CoreError>;
    fn query_campaigns(
        &self,
        user_id: UserId,
        query: &CampaignQuery,
    ) -> Result<Vec<Campaign>, CoreError>;
    /// Campaigns of any user whose window contains `today`.
    fn list_available_campaigns(&self, today: NaiveDate) -> Result<Vec<Campaign>, CoreError>;
    /// Remove the campaign, its links and their clicks atomically.
    fn delete_campaign_cascade(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Repository port for short links.
pub trait LinkRepository: Send + Sync {
    /// Insert a link; `AlreadyExists(Link)` when the short code is taken.
    fn insert_link(&self, link: &Link) -> Result<(), CoreError>;
    fn get_link(&self, id: Uuid) -> Result<Option<Link>, CoreError>;
    fn get_link_by_short_code(&self, code: &ShortCode) -> Result<Option<Link>, CoreError>;
    fn list_links_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<Link>, CoreError>;
    /// Remove the link and its clicks atomically.
    fn delete_link_cascade(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Repository port for the click ledger.
pub trait ClickRepository: Send + Sync {
    /// Append a click; `NotFound(Link)` when the link does not exist.
    fn record_click(&self, click: &Click) -> Result<(), CoreError>;
    /// Standalone form of the click removal that `delete_link_cascade` runs
    /// inside its transaction. Returns the number of clicks removed.
    fn delete_clicks_by_link(&self, link_id: Uuid) -> Result<usize, CoreError>;
    /// Daily counts per campaign and marketplace for links on products owned
    /// by `user_id`, with `start <= created_at <= end`, ordered by date.
    fn count_clicks_by_date_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricItem>, CoreError>;
    /// Product with the most clicks in the window; ties are broken arbitrarily.
    fn top_product_by_date_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(Uuid, i64)>, CoreError>;
}

/// Everything a storage backend provides.
pub trait Store:
    UserRepository
    + CredentialRepository
    + ProductRepository
    + CampaignRepository
    + LinkRepository
    + ClickRepository
{
}

impl<T> Store for T where
    T: UserRepository
        + CredentialRepository
        + ProductRepository
        + CampaignRepository
        + LinkRepository
        + ClickRepository
{
}

/// Kind of record an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    User,
    Credential,
    Product,
    Offer,
    Campaign,
    Link,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::User => "user",
            Resource::Credential => "marketplace credential",
            Resource::Product => "product",
            Resource::Offer => "offer",
            Resource::Campaign => "campaign",
            Resource::Link => "link",
        }
    }
}

/// Core domain errors (no external error crates in this crate).
#[derive(Debug, PartialEq, Eq)]
pub enum CoreError {
    InvalidInput(String),
    NotFound(Resource),
    Forbidden(Resource),
    AlreadyExists(Resource),
    CredentialMissing(Marketplace),
    Upstream(String),
    Unauthorized,
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CoreError::NotFound(r) => write!(f, "{} not found", r.as_str()),
            CoreError::Forbidden(r) => write!(f, "access to {} denied", r.as_str()),
            CoreError::AlreadyExists(r) => write!(f, "{} already exists", r.as_str()),
            CoreError::CredentialMissing(m) => write!(f, "no {} credentials configured", m),
            CoreError::Upstream(msg) => write!(f, "marketplace error: {}", msg),
            CoreError::Unauthorized => write!(f, "invalid credentials"),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Reject callers that do not own the record.
pub fn assert_owner(owner_id: UserId, caller_id: UserId, resource: Resource) -> Result<(), CoreError> {
    if owner_id == caller_id {
        Ok(())
    } else {
        Err(CoreError::Forbidden(resource))
    }
}

pub mod account;
pub mod adapters;
pub mod base62;
pub mod campaign;
pub mod catalog;
pub mod dashboard;
pub mod gateway;
pub mod service;
pub mod short_code;
pub mod validate;

#[cfg(test)]
mod testing;
