//! Grafana "simple JSON" datasource.
//!
//! Grafana lists the available targets through `/metrics` and then posts the
//! panel range and selected targets to `/query`. Every answer is a list of
//! `{target, datapoints}` where a datapoint is `[value, epoch_ms]`.

use super::error::{ApiErrorResponse, ApiResult};
use super::AppState;
use crate::domain::model::{local_midnight, HeatPumpStatus, PriceBreakdown, PricePoint, LOCAL_TZ};
use crate::utils::error::{HabError, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Target names and labels offered to Grafana.
pub const METRICS: [(&str, &str); 11] = [
    ("Heatpump status", "heatpump_status"),
    ("Baseline consumption", "baseline_consumption"),
    ("Electricity price last 10 days (daily)", "price_daily"),
    ("Electricity price (hourly)", "price_hourly"),
    ("Electricity price this month", "price_this_month"),
    ("Electricity invoice peak this month", "invoice_peak"),
    ("Electricity peak this month", "current_month_peak"),
    ("Electricity price detail this month", "price_detail_this_month"),
    ("Electricity price detail previous month", "price_detail_previous_month"),
    ("Belpex this month", "belpex_this_month"),
    ("Belpex previous month", "belpex_previous_month"),
];

const RANGE_MARGIN_MINUTES: i64 = 10;
const DAILY_PRICE_DAYS: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub range: QueryRange,
    #[serde(default)]
    pub targets: Vec<QueryTarget>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryTarget {
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub label: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSeries {
    pub target: String,
    pub datapoints: Vec<(Value, i64)>,
}

impl TargetSeries {
    fn new(target: &str, datapoints: Vec<(Value, i64)>) -> Self {
        Self {
            target: target.to_string(),
            datapoints,
        }
    }
}

impl QueryRange {
    /// Panel range in local time, widened by ten minutes on both sides.
    pub fn widened(&self) -> Result<(DateTime<Tz>, DateTime<Tz>)> {
        let margin = ChronoDuration::minutes(RANGE_MARGIN_MINUTES);
        Ok((
            parse_range_bound(&self.from)? - margin,
            parse_range_bound(&self.to)? + margin,
        ))
    }
}

fn parse_range_bound(raw: &str) -> Result<DateTime<Tz>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&LOCAL_TZ))
        .map_err(|e| HabError::BadRequestError {
            message: format!("invalid range bound '{}': {}", raw, e),
        })
}

/// Grafana routes, registered with and without the trailing slash on the
/// datasource root.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/grafana", get(test_connection))
        .route("/grafana/", get(test_connection))
        .route("/grafana/metrics", post(metrics))
        .route("/grafana/metric-payload-options", post(metric_payload_options))
        .route("/grafana/query", post(query))
}

async fn test_connection() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics() -> Json<Vec<Metric>> {
    Json(
        METRICS
            .iter()
            .map(|&(label, value)| Metric { label, value })
            .collect(),
    )
}

async fn metric_payload_options() -> Json<Vec<Value>> {
    Json(Vec::new())
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<Vec<TargetSeries>>> {
    let (date_from, date_to) = request.range.widened().map_err(ApiErrorResponse::from)?;
    tracing::debug!(from = %date_from, to = %date_to, targets = request.targets.len(), "grafana query");

    let mut result = Vec::new();
    for target in &request.targets {
        answer(&state, &target.target, date_from, date_to, &mut result).await?;
    }

    Ok(Json(result))
}

async fn answer(
    state: &AppState,
    target: &str,
    date_from: DateTime<Tz>,
    date_to: DateTime<Tz>,
    result: &mut Vec<TargetSeries>,
) -> Result<()> {
    let month_start = first_of_month(date_to.date_naive());

    match target {
        "heatpump_status" => {
            let status = state.influx.current_heatpump_status().await?;
            let now = Utc::now().timestamp() * 1000;
            result.push(TargetSeries::new(target, vec![(json!(status_symbol(&status)), now)]));
        }
        "baseline_consumption" => {
            let stats = state.influx.baseline_consumption().await?;
            let line = stats.q50 + (1.5 * stats.stddev) / 1000.0;
            result.push(TargetSeries::new(target, constant_line(line, date_from, date_to)));
        }
        "price_hourly" => {
            let prices = state
                .price
                .hourly_price(date_from.date_naive(), date_to.date_naive() + ChronoDuration::days(1))
                .await?;
            result.push(TargetSeries::new(target, total_series(&prices)));
        }
        "price_daily" => {
            let end = date_to.date_naive() + ChronoDuration::days(1);
            let start = date_to.date_naive() - ChronoDuration::days(DAILY_PRICE_DAYS);
            let prices = state.price.daily_price(start, end).await?;
            result.push(TargetSeries::new(target, total_series(&prices)));
        }
        "price_this_month" => {
            let prices = state
                .price
                .monthly_price(month_start, add_months(month_start, 1)?)
                .await?;
            result.push(TargetSeries::new(target, total_series(&prices)));
        }
        "price_detail_this_month" => {
            let prices = state
                .price
                .monthly_price(month_start, add_months(month_start, 1)?)
                .await?;
            result.extend(price_details(&prices, month_start));
        }
        "price_detail_previous_month" => {
            let previous = sub_months(month_start, 1)?;
            let prices = state.price.monthly_price(previous, month_start).await?;
            result.extend(price_details(&prices, previous));
        }
        "current_month_peak" => {
            let peak = state.influx.current_month_peak().await?;
            result.push(TargetSeries::new(target, constant_line(peak, date_from, date_to)));
        }
        "invoice_peak" => {
            let peak = state
                .influx
                .invoice_peak(month_start.year(), month_start.month())
                .await?;
            result.push(TargetSeries::new(target, vec![(json!(peak), date_millis(month_start))]));
        }
        "belpex_this_month" => {
            let belpex = state
                .influx
                .monthly_belpex(month_start.year(), month_start.month())
                .await?;
            result.push(TargetSeries::new(target, vec![(json!(belpex), date_millis(month_start))]));
        }
        "belpex_previous_month" => {
            let previous = sub_months(month_start, 1)?;
            let belpex = state
                .influx
                .monthly_belpex(previous.year(), previous.month())
                .await?;
            result.push(TargetSeries::new(target, vec![(json!(belpex), date_millis(previous))]));
        }
        other => tracing::debug!(name = other, "ignoring unknown grafana target"),
    }

    Ok(())
}

/// One glyph string summarising the heat pump state for a stat panel.
pub fn status_symbol(status: &HeatPumpStatus) -> String {
    if status.defrost_status != "Normal" {
        return defrost_symbol(&status.defrost_status).unwrap_or("?").to_string();
    }
    if status.operating_mode == "Stop" {
        return operating_mode_symbol(&status.operating_mode)
            .unwrap_or("?")
            .to_string();
    }
    if status.heat_source == "Heatpump pause" {
        return heat_source_symbol(&status.heat_source)
            .unwrap_or("?")
            .to_string();
    }

    format!(
        "{} {}",
        operating_mode_symbol(&status.operating_mode).unwrap_or("?"),
        heat_source_symbol(&status.heat_source).unwrap_or("?")
    )
}

fn operating_mode_symbol(mode: &str) -> Option<&'static str> {
    match mode {
        "Stop" => Some("⏻"),
        "Heating" => Some("🏡"),
        "Heating eco" => Some("🛖"),
        "Hot water" => Some("🛀"),
        "Freeze stat" => Some("❄"),
        "Legionella" => Some("🌶"),
        _ => None,
    }
}

fn heat_source_symbol(source: &str) -> Option<&'static str> {
    match source {
        "Heatpump" => Some("✇"),
        "Heatpump pause" => Some("\u{23FC}\u{FE0E}"),
        "Immersion heater" | "Backup heater" | "Immersion and backup heater" => Some("⚡"),
        "Boiler" => Some("🔥"),
        _ => None,
    }
}

fn defrost_symbol(status: &str) -> Option<&'static str> {
    match status {
        "Standby" | "Waiting restart" => Some("\u{23FC}\u{FE0E}❄"),
        "Defrost" => Some("❄"),
        _ => None,
    }
}

fn constant_line(value: f64, from: DateTime<Tz>, to: DateTime<Tz>) -> Vec<(Value, i64)> {
    vec![
        (json!(value), from.timestamp() * 1000),
        (json!(value), to.timestamp() * 1000),
    ]
}

fn total_series(prices: &[PricePoint]) -> Vec<(Value, i64)> {
    prices
        .iter()
        .map(|p| (json!(p.price.total), p.start.timestamp() * 1000))
        .collect()
}

/// One target per price component, taken from the first bucket.
pub fn price_details(prices: &[PricePoint], month_start: NaiveDate) -> Vec<TargetSeries> {
    let Some(first) = prices.first() else {
        return Vec::new();
    };

    PriceBreakdown::COMPONENTS
        .iter()
        .filter_map(|name| {
            first.price.component(name).map(|value| {
                TargetSeries::new(name, vec![(json!(value), date_millis(month_start))])
            })
        })
        .collect()
}

fn date_millis(date: NaiveDate) -> i64 {
    local_midnight(date).timestamp() * 1000
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| HabError::BadRequestError {
            message: format!("date out of range: {} + {} months", date, months),
        })
}

fn sub_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| HabError::BadRequestError {
            message: format!("date out of range: {} - {} months", date, months),
        })
}
