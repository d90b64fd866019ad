//! Product import from marketplaces and ownership-checked product access.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::gateway::GatewayRegistry;
use crate::validate::validate_source_url;
use crate::{
    assert_owner, Clock, CoreError, Marketplace, Offer, Product, Resource, Store, UserId,
};

pub struct ProductService<C: Clock> {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
    clock: C,
}

impl<C: Clock> ProductService<C> {
    pub fn new(store: Arc<dyn Store>, gateways: GatewayRegistry, clock: C) -> Self {
        Self {
            store,
            gateways,
            clock,
        }
    }

    /// Look up `source_url` on the marketplace and store every product it
    /// describes, each with its offers, under `user_id`.
    pub async fn import(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
        source_url: &str,
    ) -> Result<Vec<Product>, CoreError> {
        validate_source_url(source_url)?;
        let source_url = source_url.trim();
        let credential = self
            .store
            .get_credential(user_id, marketplace)?
            .ok_or(CoreError::CredentialMissing(marketplace))?;
        let gateway = self.gateways.get(marketplace)?;
        let imported = gateway.fetch_product_info(&credential, source_url).await?;
        if imported.is_empty() {
            return Err(CoreError::Upstream(
                "this product is not available for affiliation".into(),
            ));
        }

        let now = self.clock.now();
        let mut created = Vec::with_capacity(imported.len());
        for item in imported {
            let product = Product {
                id: Uuid::now_v7(),
                title: item.title,
                image_url: item.image_url,
                source_url: source_url.to_string(),
                user_id,
                created_at: now,
                updated_at: now,
            };
            let offers: Vec<Offer> = item
                .offers
                .into_iter()
                .map(|o| Offer {
                    id: Uuid::now_v7(),
                    product_id: product.id,
                    marketplace,
                    store_name: o.store_name,
                    price: o.price.round_dp(2),
                    last_checked_at: now,
                    created_at: now,
                })
                .collect();
            self.store.create_product(&product, &offers)?;
            info!(product_id = %product.id, %marketplace, offers = offers.len(), "product imported");
            created.push(product);
        }
        Ok(created)
    }

    /// Public product lookup.
    pub fn get(&self, id: Uuid) -> Result<Product, CoreError> {
        self.store
            .get_product(id)?
            .ok_or(CoreError::NotFound(Resource::Product))
    }

    pub fn list(&self, user_id: UserId) -> Result<Vec<Product>, CoreError> {
        self.store.list_products(user_id)
    }

    /// The first offer of a product owned by `user_id`.
    pub fn first_offer(&self, user_id: UserId, product_id: Uuid) -> Result<Offer, CoreError> {
        let product = self.get(product_id)?;
        assert_owner(product.user_id, user_id, Resource::Product)?;
        self.store
            .first_offer(product.id)?
            .ok_or(CoreError::NotFound(Resource::Offer))
    }

    /// Delete a product with its offers, links and clicks.
    pub fn delete(&self, user_id: UserId, product_id: Uuid) -> Result<(), CoreError> {
        let product = self.get(product_id)?;
        assert_owner(product.user_id, user_id, Resource::Product)?;
        self.store.delete_product_cascade(product.id)?;
        info!(product_id = %product.id, "product deleted");
        Ok(())
    }
}
