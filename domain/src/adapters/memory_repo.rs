use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    Campaign, CampaignQuery, CampaignRepository, Click, ClickRepository, CoreError,
    CredentialInput, CredentialRepository, Email, Link, LinkRepository, Marketplace,
    MarketplaceCredential, MetricItem, NewUser, Offer, Product, ProductRepository, Resource,
    ShortCode, User, UserId, UserRepository,
};

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    users: BTreeMap<UserId, User>,
    next_credential_id: i64,
    credentials: BTreeMap<(UserId, Marketplace), MarketplaceCredential>,
    products: BTreeMap<Uuid, Product>,
    offers: Vec<Offer>,
    campaigns: BTreeMap<Uuid, Campaign>,
    links: BTreeMap<Uuid, Link>,
    clicks: Vec<Click>,
}

impl Tables {
    fn remove_links_where(&mut self, pred: impl Fn(&Link) -> bool) {
        let doomed: Vec<Uuid> = self
            .links
            .values()
            .filter(|l| pred(l))
            .map(|l| l.id)
            .collect();
        self.clicks.retain(|c| !doomed.contains(&c.link_id));
        for id in doomed {
            self.links.remove(&id);
        }
    }

    fn product_marketplace(&self, product_id: Uuid) -> Option<Marketplace> {
        self.offers
            .iter()
            .filter(|o| o.product_id == product_id)
            .map(|o| o.marketplace)
            .min()
    }

    /// Clicks in the window on links whose product belongs to `user_id`.
    fn owned_clicks<'a>(
        &'a self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = (&'a Click, &'a Link)> + 'a {
        self.clicks
            .iter()
            .filter(move |c| c.created_at >= start && c.created_at <= end)
            .filter_map(move |c| {
                let link = self.links.get(&c.link_id)?;
                let product = self.products.get(&link.product_id)?;
                (product.user_id == user_id).then_some((c, link))
            })
    }
}

/// In-memory store implementing every repository port. A single mutex guards
/// all tables so multi-table operations are atomic.
pub struct InMemoryStore {
    inner: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables {
                next_user_id: 1,
                next_credential_id: 1,
                ..Tables::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, CoreError> {
        self.inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryStore {
    fn create_user(&self, user: NewUser) -> Result<User, CoreError> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email == user.email.as_str()) {
            return Err(CoreError::AlreadyExists(Resource::User));
        }
        let id = t.next_user_id;
        t.next_user_id += 1;
        let created = User {
            id,
            email: user.email.as_str().to_string(),
            password_hash: user.password_hash,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        t.users.insert(id, created.clone());
        Ok(created)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &Email) -> Result<Option<User>, CoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email == email.as_str())
            .cloned())
    }
}

impl CredentialRepository for InMemoryStore {
    fn upsert_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
        input: &CredentialInput,
        now: DateTime<Utc>,
    ) -> Result<MarketplaceCredential, CoreError> {
        let mut t = self.lock()?;
        let (id, created_at) = match t.credentials.get(&(user_id, marketplace)) {
            Some(existing) => (existing.id, existing.created_at),
            None => {
                let id = t.next_credential_id;
                t.next_credential_id += 1;
                (id, now)
            }
        };
        let cred = MarketplaceCredential {
            id,
            user_id,
            marketplace,
            app_key: input.app_key.clone(),
            app_secret: input.app_secret.clone(),
            app_id: input.app_id.clone(),
            user_token: input.user_token.clone(),
            created_at,
            updated_at: now,
        };
        t.credentials.insert((user_id, marketplace), cred.clone());
        Ok(cred)
    }

    fn get_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
    ) -> Result<Option<MarketplaceCredential>, CoreError> {
        Ok(self.lock()?.credentials.get(&(user_id, marketplace)).cloned())
    }

    fn delete_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
    ) -> Result<bool, CoreError> {
        Ok(self
            .lock()?
            .credentials
            .remove(&(user_id, marketplace))
            .is_some())
    }
}

impl ProductRepository for InMemoryStore {
    fn create_product(&self, product: &Product, offers: &[Offer]) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if t.products.contains_key(&product.id) {
            return Err(CoreError::AlreadyExists(Resource::Product));
        }
        t.products.insert(product.id, product.clone());
        t.offers.extend(offers.iter().cloned());
        Ok(())
    }

    fn get_product(&self, id: Uuid) -> Result<Option<Product>, CoreError> {
        Ok(self.lock()?.products.get(&id).cloned())
    }

    fn list_products(&self, user_id: UserId) -> Result<Vec<Product>, CoreError> {
        let t = self.lock()?;
        let mut items: Vec<Product> = t
            .products
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    fn list_offers(&self, product_id: Uuid) -> Result<Vec<Offer>, CoreError> {
        let t = self.lock()?;
        let mut items: Vec<Offer> = t
            .offers
            .iter()
            .filter(|o| o.product_id == product_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    fn first_offer(&self, product_id: Uuid) -> Result<Option<Offer>, CoreError> {
        Ok(self.list_offers(product_id)?.into_iter().next())
    }

    fn delete_product_cascade(&self, id: Uuid) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if !t.products.contains_key(&id) {
            return Err(CoreError::NotFound(Resource::Product));
        }
        t.remove_links_where(|l| l.product_id == id);
        t.offers.retain(|o| o.product_id != id);
        t.products.remove(&id);
        Ok(())
    }
}

impl CampaignRepository for InMemoryStore {
    fn create_campaign(&self, campaign: &Campaign) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if t.campaigns.contains_key(&campaign.id) {
            return Err(CoreError::AlreadyExists(Resource::Campaign));
        }
        t.campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, CoreError> {
        Ok(self.lock()?.campaigns.get(&id).cloned())
    }

    fn query_campaigns(
        &self,
        user_id: UserId,
        query: &CampaignQuery,
    ) -> Result<Vec<Campaign>, CoreError> {
        let t = self.lock()?;
        let needle = query.name.as_ref().map(|n| n.to_lowercase());
        let mut items: Vec<Campaign> = t
            .campaigns
            .values()
            .filter(|c| {
                if c.user_id != user_id {
                    return false;
                }
                if let Some(ref n) = needle {
                    if !c.name.to_lowercase().contains(n) {
                        return false;
                    }
                }
                if let Some(start) = query.start_at {
                    if c.start_at < start {
                        return false;
                    }
                }
                if let Some(end) = query.end_at {
                    if c.end_at > end {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect())
    }

    fn list_available_campaigns(&self, today: NaiveDate) -> Result<Vec<Campaign>, CoreError> {
        let t = self.lock()?;
        let mut items: Vec<Campaign> = t
            .campaigns
            .values()
            .filter(|c| c.is_available_on(today))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.start_at.cmp(&b.start_at));
        Ok(items)
    }

    fn delete_campaign_cascade(&self, id: Uuid) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if !t.campaigns.contains_key(&id) {
            return Err(CoreError::NotFound(Resource::Campaign));
        }
        t.remove_links_where(|l| l.campaign_id == id);
        t.campaigns.remove(&id);
        Ok(())
    }
}

impl LinkRepository for InMemoryStore {
    fn insert_link(&self, link: &Link) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if t.links.contains_key(&link.id)
            || t.links.values().any(|l| l.short_code == link.short_code)
        {
            return Err(CoreError::AlreadyExists(Resource::Link));
        }
        if !t.products.contains_key(&link.product_id) {
            return Err(CoreError::NotFound(Resource::Product));
        }
        if !t.campaigns.contains_key(&link.campaign_id) {
            return Err(CoreError::NotFound(Resource::Campaign));
        }
        t.links.insert(link.id, link.clone());
        Ok(())
    }

    fn get_link(&self, id: Uuid) -> Result<Option<Link>, CoreError> {
        Ok(self.lock()?.links.get(&id).cloned())
    }

    fn get_link_by_short_code(&self, code: &ShortCode) -> Result<Option<Link>, CoreError> {
        Ok(self
            .lock()?
            .links
            .values()
            .find(|l| l.short_code == code.as_str())
            .cloned())
    }

    fn list_links_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<Link>, CoreError> {
        let t = self.lock()?;
        let mut items: Vec<Link> = t
            .links
            .values()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    fn delete_link_cascade(&self, id: Uuid) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if !t.links.contains_key(&id) {
            return Err(CoreError::NotFound(Resource::Link));
        }
        t.remove_links_where(|l| l.id == id);
        Ok(())
    }
}

impl ClickRepository for InMemoryStore {
    fn record_click(&self, click: &Click) -> Result<(), CoreError> {
        let mut t = self.lock()?;
        if !t.links.contains_key(&click.link_id) {
            return Err(CoreError::NotFound(Resource::Link));
        }
        t.clicks.push(click.clone());
        Ok(())
    }

    fn delete_clicks_by_link(&self, link_id: Uuid) -> Result<usize, CoreError> {
        let mut t = self.lock()?;
        let before = t.clicks.len();
        t.clicks.retain(|c| c.link_id != link_id);
        Ok(before - t.clicks.len())
    }

    fn count_clicks_by_date_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricItem>, CoreError> {
        let t = self.lock()?;
        // (date, campaign name, campaign id, marketplace) keeps the output ordered
        let mut groups: BTreeMap<(NaiveDate, String, Uuid, Marketplace), i64> = BTreeMap::new();
        for (click, link) in t.owned_clicks(user_id, start, end) {
            let Some(campaign) = t.campaigns.get(&link.campaign_id) else {
                continue;
            };
            let Some(marketplace) = t.product_marketplace(link.product_id) else {
                continue;
            };
            let key = (
                click.created_at.date_naive(),
                campaign.name.clone(),
                campaign.id,
                marketplace,
            );
            *groups.entry(key).or_insert(0) += 1;
        }
        Ok(groups
            .into_iter()
            .map(
                |((date, campaign_name, campaign_id, marketplace), click_count)| MetricItem {
                    date,
                    click_count,
                    campaign_id,
                    campaign_name,
                    marketplace,
                },
            )
            .collect())
    }

    fn top_product_by_date_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(Uuid, i64)>, CoreError> {
        let t = self.lock()?;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for (_, link) in t.owned_clicks(user_id, start, end) {
            *counts.entry(link.product_id).or_insert(0) += 1;
        }
        Ok(counts.into_iter().max_by_key(|(_, n)| *n))
    }
}
