use crate::domain::model::TimeData;
use crate::domain::series::ResultSet;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Time-series backend the live-data and price services read from.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn query(&self, query: &str) -> Result<ResultSet>;
    async fn write(&self, measurement: &str, points: &[TimeData]) -> Result<()>;
}

/// Source of day-ahead grid prices for a single delivery day.
#[async_trait]
pub trait GridPriceSource: Send + Sync {
    async fn grid_prices(&self, date: NaiveDate) -> Result<Vec<TimeData>>;
}
