use crate::core::influx::InfluxService;
use crate::core::scheduler::DailySchedule;
use crate::domain::model::local_now;
use crate::domain::ports::GridPriceSource;
use crate::utils::error::Result;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::sync::Arc;

/// Days fetched when no price has been stored yet.
pub const BACKFILL_DAYS: i64 = 40;

/// Day-ahead results are published around noon; poll every hour after that.
pub fn update_schedule() -> DailySchedule {
    DailySchedule::new(12..=23, 47)
}

/// Keeps the `belpex` measurement in sync with the published day-ahead prices.
pub struct BelpexService {
    influx: Arc<InfluxService>,
    source: Arc<dyn GridPriceSource>,
}

impl BelpexService {
    pub fn new(influx: Arc<InfluxService>, source: Arc<dyn GridPriceSource>) -> Self {
        Self { influx, source }
    }

    pub async fn update(&self) -> Result<usize> {
        self.update_grid_prices(local_now().date_naive()).await
    }

    /// Fetches every day after the last stored price up to tomorrow and
    /// stores what was published. Returns the number of prices written.
    pub async fn update_grid_prices(&self, today: NaiveDate) -> Result<usize> {
        let date_from = match self.influx.last_grid_price().await? {
            Some(last) => last.timestamp.date_naive() + ChronoDuration::days(1),
            None => today - ChronoDuration::days(BACKFILL_DAYS),
        };
        let date_to = today + ChronoDuration::days(1);

        tracing::info!(from = %date_from, to = %date_to, "updating grid prices");

        let mut written = 0;
        let mut day = date_from;
        while day <= date_to {
            let prices = self.source.grid_prices(day).await?;
            if prices.is_empty() {
                tracing::debug!(date = %day, "no grid prices published");
            } else {
                self.influx.save_grid_prices(&prices).await?;
                tracing::debug!(date = %day, count = prices.len(), "grid prices stored");
                written += prices.len();
            }
            day += ChronoDuration::days(1);
        }

        tracing::info!(written, "grid prices up to date");
        Ok(written)
    }
}
