use crate::domain::model::{to_local, TimeData, GRID_PRICE_UNIT};
use crate::domain::ports::GridPriceSource;
use crate::utils::error::{HabError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

pub const DEFAULT_GRIDDATA_URL: &str =
    "https://griddata.elia.be/eliabecontrols.prod/interface/Interconnections/daily/auctionresultsqh";

#[derive(Debug, Deserialize)]
struct AuctionResult {
    #[serde(rename = "dateTime")]
    date_time: String,
    price: Option<f64>,
}

/// Day-ahead auction results published by Elia.
#[derive(Debug, Clone)]
pub struct GridDataClient {
    client: Client,
    base_url: String,
}

impl GridDataClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GridPriceSource for GridDataClient {
    async fn grid_prices(&self, date: NaiveDate) -> Result<Vec<TimeData>> {
        let url = format!("{}/{}", self.base_url, date.format("%Y-%m-%d"));
        tracing::debug!("Fetching grid prices from: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HabError::GridDataError {
                message: format!("{} returned status {}", url, status),
            });
        }

        let results: Vec<AuctionResult> = response.json().await?;
        results.into_iter().map(to_time_data).filter_map(Result::transpose).collect()
    }
}

/// Converts one auction result (€/MWh, UTC) into a local c€/kWh point.
/// Results without a price yet are skipped.
fn to_time_data(result: AuctionResult) -> Result<Option<TimeData>> {
    let Some(price) = result.price else {
        return Ok(None);
    };

    let timestamp = parse_utc(&result.date_time).ok_or_else(|| HabError::GridDataError {
        message: format!("unreadable dateTime '{}'", result.date_time),
    })?;

    Ok(Some(TimeData::new(
        to_local(timestamp),
        price / 10.0,
        GRID_PRICE_UNIT,
    )))
}

fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|t| t.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_mwh_price_to_local_cents() {
        let point = to_time_data(AuctionResult {
            date_time: "2024-05-01T22:00:00Z".to_string(),
            price: Some(95.3),
        })
        .unwrap()
        .unwrap();

        assert!((point.value - 9.53).abs() < 1e-9);
        assert_eq!(point.unit, "c€/kWh");
        assert_eq!(point.timestamp.to_rfc3339(), "2024-05-02T00:00:00+02:00");
    }

    #[test]
    fn test_skips_missing_price_and_rejects_bad_time() {
        assert!(to_time_data(AuctionResult {
            date_time: "2024-05-01T22:00:00Z".to_string(),
            price: None,
        })
        .unwrap()
        .is_none());

        assert!(to_time_data(AuctionResult {
            date_time: "yesterday".to_string(),
            price: Some(1.0),
        })
        .is_err());
    }

    #[test]
    fn test_parse_utc_without_zone() {
        let parsed = parse_utc("2024-01-01T23:00:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T23:00:00+00:00");
    }
}
