//! Selection of the marketplace gateway for a stored marketplace value.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{CoreError, Marketplace, MarketplaceGateway};

/// Gateways keyed by the marketplace they serve.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<Marketplace, Arc<dyn MarketplaceGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gateway under the marketplace it reports.
    pub fn with(mut self, gateway: Arc<dyn MarketplaceGateway>) -> Self {
        self.gateways.insert(gateway.marketplace(), gateway);
        self
    }

    pub fn get(&self, marketplace: Marketplace) -> Result<Arc<dyn MarketplaceGateway>, CoreError> {
        self.gateways.get(&marketplace).cloned().ok_or_else(|| {
            CoreError::Upstream(format!("marketplace {} is not supported", marketplace))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubGateway;

    #[test]
    fn registry_dispatches_by_marketplace() {
        let reg = GatewayRegistry::new().with(Arc::new(StubGateway::new(
            Marketplace::Shopee,
            "https://s.shopee/x",
        )));
        assert_eq!(
            reg.get(Marketplace::Shopee).unwrap().marketplace(),
            Marketplace::Shopee
        );
        assert!(matches!(
            reg.get(Marketplace::Lazada),
            Err(CoreError::Upstream(_))
        ));
    }
}
