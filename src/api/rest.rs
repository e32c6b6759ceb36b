use super::error::ApiResult;
use super::AppState;
use crate::domain::model::{HeatPumpSetpoint, HeatPumpStatus, TimeData, TimePeriodStats};
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeDataBody {
    pub timestamp: String,
    pub value: f64,
    pub unit: String,
}

impl From<TimeData> for TimeDataBody {
    fn from(data: TimeData) -> Self {
        Self {
            timestamp: isoformat(&data.timestamp),
            value: data.value,
            unit: data.unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStatsBody {
    pub start: String,
    pub end: String,
    pub unit: String,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub stddev: f64,
}

impl From<TimePeriodStats> for PeriodStatsBody {
    fn from(stats: TimePeriodStats) -> Self {
        Self {
            start: isoformat(&stats.start),
            end: isoformat(&stats.end),
            unit: stats.unit,
            q25: stats.q25,
            q50: stats.q50,
            q75: stats.q75,
            stddev: stats.stddev,
        }
    }
}

/// ISO 8601 with the local offset, fractional seconds only when present.
pub fn isoformat(time: &DateTime<Tz>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/power/fromgrid/current", get(current_power_fromgrid))
        .route("/power/net/current", get(current_power_net))
        .route("/production/current", get(current_production))
        .route("/consumption/current", get(current_consumption))
        .route("/consumption/baseline", get(baseline_consumption))
        .route("/legionella/last", get(last_legionella_start))
        .route("/dhw/temp", get(current_dhw_temp))
        .route("/heatpump/status", get(current_heatpump_status))
        .route("/heatpump/setpoint", get(heatpump_setpoint))
}

async fn current_power_fromgrid(State(state): State<AppState>) -> ApiResult<Json<TimeDataBody>> {
    Ok(Json(state.influx.current_power_fromgrid().await?.into()))
}

async fn current_power_net(State(state): State<AppState>) -> ApiResult<Json<TimeDataBody>> {
    Ok(Json(state.influx.current_power_net().await?.into()))
}

async fn current_production(State(state): State<AppState>) -> ApiResult<Json<TimeDataBody>> {
    Ok(Json(state.influx.current_production().await?.into()))
}

async fn current_consumption(State(state): State<AppState>) -> ApiResult<Json<TimeDataBody>> {
    Ok(Json(state.influx.current_consumption().await?.into()))
}

async fn baseline_consumption(State(state): State<AppState>) -> ApiResult<Json<PeriodStatsBody>> {
    Ok(Json(state.influx.baseline_consumption().await?.into()))
}

async fn last_legionella_start(State(state): State<AppState>) -> ApiResult<Json<TimeDataBody>> {
    Ok(Json(state.influx.last_legionella_start().await?.into()))
}

async fn current_dhw_temp(State(state): State<AppState>) -> ApiResult<Json<TimeDataBody>> {
    Ok(Json(state.influx.current_dhw_temp().await?.into()))
}

async fn current_heatpump_status(State(state): State<AppState>) -> ApiResult<Json<HeatPumpStatus>> {
    Ok(Json(state.influx.current_heatpump_status().await?))
}

async fn heatpump_setpoint(State(state): State<AppState>) -> ApiResult<Json<HeatPumpSetpoint>> {
    Ok(Json(state.influx.heatpump_setpoint().await?))
}
