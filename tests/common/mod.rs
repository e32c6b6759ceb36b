#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use chrono::NaiveDate;
use hab_data_api::config::AuthConfig;
use hab_data_api::core::TariffBook;
use hab_data_api::domain::model::TimeData;
use hab_data_api::domain::ports::{GridPriceSource, SeriesStore};
use hab_data_api::domain::series::{ResultSet, Series};
use hab_data_api::{router, AppState, HabError, InfluxService, PriceService, Result, TtlCache};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const PASSWORD: &str = "secret";
/// `admin:secret`
pub const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

/// Series store answering queries from canned results, matched by substring.
#[derive(Default)]
pub struct MockStore {
    rules: Vec<(String, ResultSet)>,
    pub queries: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<(String, Vec<TimeData>)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries containing `fragment` get `series`; first match wins.
    pub fn on(mut self, fragment: &str, series: Vec<Series>) -> Self {
        self.rules.push((fragment.to_string(), ResultSet::new(series)));
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl SeriesStore for MockStore {
    async fn query(&self, query: &str) -> Result<ResultSet> {
        self.queries.lock().unwrap().push(query.to_string());

        Ok(self
            .rules
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, rs)| rs.clone())
            .unwrap_or_default())
    }

    async fn write(&self, measurement: &str, points: &[TimeData]) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((measurement.to_string(), points.to_vec()));
        Ok(())
    }
}

/// Grid price source serving fixed days.
#[derive(Default)]
pub struct MockGridSource {
    days: HashMap<NaiveDate, Vec<TimeData>>,
    failing: Option<NaiveDate>,
    pub requested: Mutex<Vec<NaiveDate>>,
}

impl MockGridSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, date: NaiveDate, prices: Vec<TimeData>) -> Self {
        self.days.insert(date, prices);
        self
    }

    pub fn failing_on(mut self, date: NaiveDate) -> Self {
        self.failing = Some(date);
        self
    }

    pub fn requested(&self) -> Vec<NaiveDate> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl GridPriceSource for MockGridSource {
    async fn grid_prices(&self, date: NaiveDate) -> Result<Vec<TimeData>> {
        self.requested.lock().unwrap().push(date);
        if self.failing == Some(date) {
            return Err(HabError::GridDataError {
                message: format!("{} unavailable", date),
            });
        }
        Ok(self.days.get(&date).cloned().unwrap_or_default())
    }
}

pub fn series(name: &str, tags: &[(&str, &str)], columns: &[&str], rows: Vec<Vec<Value>>) -> Series {
    Series {
        name: name.to_string(),
        tags: tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        values: rows,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn influx_service(store: Arc<MockStore>) -> Arc<InfluxService> {
    Arc::new(InfluxService::new(store, Arc::new(TtlCache::new())))
}

pub fn app(store: Arc<MockStore>) -> Router {
    let influx = influx_service(store);
    let price = Arc::new(PriceService::new(influx.clone(), TariffBook::builtin()));

    router(
        AppState { influx, price },
        AuthConfig {
            username: "admin".to_string(),
            password: PASSWORD.to_string(),
        },
    )
}

pub async fn send(app: &Router, request: Request<Body>) -> (Response<Body>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (Response::from_parts(parts, Body::empty()), json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, BASIC_AUTH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// `(rate1, rate2)` series of one `difference(last(value))` field.
pub fn rate_series(name: &str, field: &str, rows: &[(&str, f64, f64)]) -> Vec<Series> {
    let rate = |tag: &str, pick: fn(&(&str, f64, f64)) -> f64| {
        series(
            name,
            &[("rate", tag)],
            &["time", field],
            rows.iter()
                .map(|row| vec![serde_json::json!(row.0), serde_json::json!(pick(row))])
                .collect(),
        )
    };
    vec![rate("rate1", |row| row.1), rate("rate2", |row| row.2)]
}

/// Three complete 5-minute buckets consuming 375, 750 and 1500 W, followed by
/// an incomplete one that must be ignored.
pub fn baseline_store() -> MockStore {
    let times = [
        "2024-05-14T10:00:00Z",
        "2024-05-14T10:05:00Z",
        "2024-05-14T10:10:00Z",
        "2024-05-14T10:15:00Z",
    ];

    MockStore::new()
        .on(
            "AS fromgrid FROM p1_elec_total_fromgrid",
            rate_series(
                "p1_elec_total_fromgrid",
                "fromgrid",
                &[(times[0], 0.03125, 0.0), (times[1], 0.0, 0.0625), (times[2], 0.0, 0.0), (times[3], 1.0, 0.0)],
            ),
        )
        .on(
            "AS togrid FROM p1_elec_total_togrid",
            rate_series(
                "p1_elec_total_togrid",
                "togrid",
                &[(times[0], 0.0, 0.0), (times[1], 0.0, 0.0), (times[2], 0.125, 0.0), (times[3], 0.0, 0.0)],
            ),
        )
        .on(
            "AS production FROM accumulated_yield_energy",
            vec![series(
                "accumulated_yield_energy",
                &[],
                &["time", "production"],
                vec![
                    vec![serde_json::json!(times[0]), serde_json::json!(0.0)],
                    vec![serde_json::json!(times[1]), serde_json::json!(0.0)],
                    vec![serde_json::json!(times[2]), serde_json::json!(0.25)],
                    vec![serde_json::json!(times[3]), serde_json::json!(0.0)],
                ],
            )],
        )
}

/// Sample standard deviation of the baseline buckets, in W.
pub fn baseline_stddev() -> f64 {
    // mean 875 W, squared deviations 250000 + 15625 + 390625, n - 1 = 2
    (656250.0f64 / 2.0).sqrt()
}
