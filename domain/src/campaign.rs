use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::validate::validate_campaign;
use crate::{
    assert_owner, Campaign, CampaignQuery, Clock, CoreError, NewCampaign, Resource, Store, UserId,
};

/// Upper bound on a single page of campaigns.
pub const MAX_PAGE_SIZE: u32 = 100;

pub struct CampaignService<C: Clock> {
    store: Arc<dyn Store>,
    clock: C,
}

impl<C: Clock> CampaignService<C> {
    pub fn new(store: Arc<dyn Store>, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn create(&self, user_id: UserId, input: NewCampaign) -> Result<Campaign, CoreError> {
        validate_campaign(&input)?;
        let now = self.clock.now();
        let campaign = Campaign {
            id: Uuid::now_v7(),
            name: input.name.trim().to_string(),
            utm_campaign: input.utm_campaign.trim().to_string(),
            start_at: input.start_at,
            end_at: input.end_at,
            user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.create_campaign(&campaign)?;
        info!(campaign_id = %campaign.id, user_id, "campaign created");
        Ok(campaign)
    }

    /// List the caller's campaigns, filtered and paged.
    pub fn query(&self, user_id: UserId, query: CampaignQuery) -> Result<Vec<Campaign>, CoreError> {
        if query.page == 0 {
            return Err(CoreError::InvalidInput("page starts at 1".into()));
        }
        if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
            return Err(CoreError::InvalidInput(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        self.store.query_campaigns(user_id, &query)
    }

    /// Campaigns of every user whose window contains today.
    pub fn available(&self) -> Result<Vec<Campaign>, CoreError> {
        self.store
            .list_available_campaigns(self.clock.now().date_naive())
    }

    /// Delete a campaign with its links and their clicks.
    pub fn delete(&self, user_id: UserId, campaign_id: Uuid) -> Result<(), CoreError> {
        let campaign = self
            .store
            .get_campaign(campaign_id)?
            .ok_or(CoreError::NotFound(Resource::Campaign))?;
        assert_owner(campaign.user_id, user_id, Resource::Campaign)?;
        self.store.delete_campaign_cascade(campaign.id)?;
        info!(campaign_id = %campaign.id, "campaign deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryStore;
    use crate::testing::{noon, seed_campaign, seed_product, FixedClock};
    use crate::{CampaignRepository, Click, ClickRepository, Link, LinkRepository, Marketplace};
    use chrono::Duration;

    fn input(name: &str, days: i64) -> NewCampaign {
        NewCampaign {
            name: name.into(),
            utm_campaign: format!("{}-utm", name.to_lowercase()),
            start_at: noon(),
            end_at: noon() + Duration::days(days),
        }
    }

    #[test]
    fn create_and_query_with_filters() {
        let store = Arc::new(InMemoryStore::new());
        let svc = CampaignService::new(store, FixedClock(noon()));
        svc.create(1, input("Summer", 10)).unwrap();
        svc.create(1, input("Winter", 40)).unwrap();
        svc.create(2, input("Summer", 10)).unwrap();

        let all = svc.query(1, CampaignQuery::default()).unwrap();
        assert_eq!(all.len(), 2);

        let named = svc
            .query(
                1,
                CampaignQuery {
                    name: Some("sum".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].name, "Summer");

        let ending_soon = svc
            .query(
                1,
                CampaignQuery {
                    end_at: Some(noon() + Duration::days(20)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ending_soon.len(), 1);

        let page_two = svc
            .query(
                1,
                CampaignQuery {
                    page: 2,
                    limit: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page_two.len(), 1);
    }

    #[test]
    fn invalid_input_is_rejected() {
        let svc = CampaignService::new(Arc::new(InMemoryStore::new()), FixedClock(noon()));
        assert!(matches!(
            svc.create(1, input("ab", 1)),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.create(1, input("Backwards", -1)),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.query(
                1,
                CampaignQuery {
                    limit: 500,
                    ..Default::default()
                }
            ),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn available_uses_todays_date() {
        let store = Arc::new(InMemoryStore::new());
        let svc = CampaignService::new(store, FixedClock(noon()));
        svc.create(1, input("Running", 2)).unwrap();
        let future = NewCampaign {
            start_at: noon() + Duration::days(3),
            end_at: noon() + Duration::days(5),
            ..input("Future", 0)
        };
        svc.create(2, future).unwrap();

        let names: Vec<String> = svc.available().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Running".to_string()]);
    }

    #[test]
    fn foreign_delete_is_forbidden_and_mutates_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let product = seed_product(&store, 1, Some(Marketplace::Shopee));
        let campaign = seed_campaign(&store, 1);
        let link = Link {
            id: Uuid::now_v7(),
            product_id: product.id,
            campaign_id: campaign.id,
            short_code: "keep".into(),
            target_url: "https://s.shopee.co.th/k".into(),
            created_at: noon(),
            updated_at: noon(),
        };
        store.insert_link(&link).unwrap();
        store
            .record_click(&Click {
                id: Uuid::now_v7(),
                link_id: link.id,
                created_at: noon(),
            })
            .unwrap();
        let svc = CampaignService::new(store.clone(), FixedClock(noon()));

        assert_eq!(
            svc.delete(2, campaign.id).unwrap_err(),
            CoreError::Forbidden(Resource::Campaign)
        );
        assert!(store.get_campaign(campaign.id).unwrap().is_some());
        assert!(store.get_link(link.id).unwrap().is_some());
        let window = (noon() - Duration::days(1), noon() + Duration::days(1));
        assert_eq!(
            store
                .count_clicks_by_date_range(1, window.0, window.1)
                .unwrap()[0]
                .click_count,
            1
        );

        svc.delete(1, campaign.id).unwrap();
        assert!(store.get_campaign(campaign.id).unwrap().is_none());
        assert!(store.get_link(link.id).unwrap().is_none());
        assert!(store
            .count_clicks_by_date_range(1, window.0, window.1)
            .unwrap()
            .is_empty());
        assert_eq!(
            svc.delete(1, campaign.id).unwrap_err(),
            CoreError::NotFound(Resource::Campaign)
        );
    }
}
