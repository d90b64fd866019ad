use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::GatewayRegistry;
use crate::{
    assert_owner, Click, Clock, CoreError, Link, Resource, ShortCode, ShortCodeGenerator, Store,
    UserId,
};

/// Attempts at minting an unused short code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Application service orchestrating creation, resolution and click
/// attribution of short links.
///
/// Generic over short code generator and clock so tests can script both.
/// Uniqueness of short codes is enforced by the store; a collision on insert
/// is retried with a fresh code, bounded by [`MAX_CODE_ATTEMPTS`].
pub struct LinkService<G: ShortCodeGenerator, C: Clock> {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
    codes: G,
    clock: C,
}

impl<G: ShortCodeGenerator, C: Clock> LinkService<G, C> {
    pub fn new(store: Arc<dyn Store>, gateways: GatewayRegistry, codes: G, clock: C) -> Self {
        Self {
            store,
            gateways,
            codes,
            clock,
        }
    }

    /// Create a short link for a product and campaign both owned by `user_id`.
    pub async fn create(
        &self,
        user_id: UserId,
        product_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Link, CoreError> {
        let product = self
            .store
            .get_product(product_id)?
            .ok_or(CoreError::NotFound(Resource::Product))?;
        assert_owner(product.user_id, user_id, Resource::Product)?;

        let campaign = self
            .store
            .get_campaign(campaign_id)?
            .ok_or(CoreError::NotFound(Resource::Campaign))?;
        assert_owner(campaign.user_id, user_id, Resource::Campaign)?;

        let offer = self
            .store
            .first_offer(product.id)?
            .ok_or(CoreError::NotFound(Resource::Offer))?;
        let credential = self
            .store
            .get_credential(user_id, offer.marketplace)?
            .ok_or(CoreError::CredentialMissing(offer.marketplace))?;

        let gateway = self.gateways.get(offer.marketplace)?;
        let target_url = gateway
            .create_affiliate_link(&credential, &product.source_url, &campaign.utm_campaign)
            .await?;
        if target_url.trim().is_empty() {
            return Err(CoreError::Upstream(format!(
                "{} returned an empty affiliate link",
                offer.marketplace
            )));
        }

        let now = self.clock.now();
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let link = Link {
                id: Uuid::now_v7(),
                product_id: product.id,
                campaign_id: campaign.id,
                short_code: self.codes.next_code().as_str().to_string(),
                target_url: target_url.clone(),
                created_at: now,
                updated_at: now,
            };
            match self.store.insert_link(&link) {
                Ok(()) => {
                    info!(link_id = %link.id, short_code = %link.short_code, "link created");
                    return Ok(link);
                }
                Err(CoreError::AlreadyExists(Resource::Link)) => {
                    warn!(attempt, short_code = %link.short_code, "short code collision");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::Repository(
            "failed to generate unique short code".into(),
        ))
    }

    /// Resolve a short code to its link. Malformed codes cannot exist and
    /// resolve as not found.
    pub fn resolve_by_short_code(&self, code: &str) -> Result<Link, CoreError> {
        let code = ShortCode::new(code).map_err(|_| CoreError::NotFound(Resource::Link))?;
        self.store
            .get_link_by_short_code(&code)?
            .ok_or(CoreError::NotFound(Resource::Link))
    }

    pub fn resolve_by_id(&self, id: Uuid) -> Result<Link, CoreError> {
        self.store
            .get_link(id)?
            .ok_or(CoreError::NotFound(Resource::Link))
    }

    pub fn list_by_campaign(&self, campaign_id: Uuid) -> Result<Vec<Link>, CoreError> {
        self.store.list_links_by_campaign(campaign_id)
    }

    /// Delete a link and its clicks. Only the owner of the link's product may
    /// do so.
    pub fn delete(&self, user_id: UserId, link_id: Uuid) -> Result<(), CoreError> {
        let link = self.resolve_by_id(link_id)?;
        let product = self
            .store
            .get_product(link.product_id)?
            .ok_or(CoreError::NotFound(Resource::Link))?;
        assert_owner(product.user_id, user_id, Resource::Link)?;
        self.store.delete_link_cascade(link.id)?;
        info!(link_id = %link.id, "link deleted");
        Ok(())
    }

    /// Resolve a short code and record the visit. The link is returned only
    /// once the click is stored.
    pub fn click_by_short_code(&self, code: &str) -> Result<Link, CoreError> {
        let link = self.resolve_by_short_code(code)?;
        self.store.record_click(&Click {
            id: Uuid::now_v7(),
            link_id: link.id,
            created_at: self.clock.now(),
        })?;
        Ok(link)
    }
}
