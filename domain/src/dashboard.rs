//! Read-only click analytics for the dashboard.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::{Clock, CoreError, DashboardMetrics, Store, TopProduct, UserId};

/// Days before today covered when no start date is given.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

pub struct DashboardService<C: Clock> {
    store: Arc<dyn Store>,
    clock: C,
}

/// Resolve optional dates into the `[start 00:00, end 00:00]` UTC window.
/// Missing bounds default to a week ago and tomorrow.
pub fn resolve_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CoreError> {
    let start = start.unwrap_or_else(|| today - Days::new(DEFAULT_LOOKBACK_DAYS));
    let end = end.unwrap_or_else(|| today + Days::new(1));
    if end < start {
        return Err(CoreError::InvalidInput(
            "end_at must not be before start_at".into(),
        ));
    }
    Ok((
        start.and_time(chrono::NaiveTime::MIN).and_utc(),
        end.and_time(chrono::NaiveTime::MIN).and_utc(),
    ))
}

impl<C: Clock> DashboardService<C> {
    pub fn new(store: Arc<dyn Store>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Click metrics for `user_id` between two calendar dates.
    pub fn metrics_for_dates(
        &self,
        user_id: UserId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DashboardMetrics, CoreError> {
        let (start, end) = resolve_window(start, end, self.clock.now().date_naive())?;
        self.metrics(user_id, start, end)
    }

    /// Daily counts plus the most clicked product. An empty window yields an
    /// empty list and a zero-valued top product.
    pub fn metrics(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DashboardMetrics, CoreError> {
        let metrics = self.store.count_clicks_by_date_range(user_id, start, end)?;
        let top_product = match self.store.top_product_by_date_range(user_id, start, end)? {
            Some((product_id, clicks)) => match self.store.get_product(product_id)? {
                Some(product) => TopProduct { product, clicks },
                None => TopProduct::default(),
            },
            None => TopProduct::default(),
        };
        Ok(DashboardMetrics {
            top_product,
            metrics,
        })
    }
}
