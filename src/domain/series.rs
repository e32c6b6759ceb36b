//! InfluxDB 1.x query results.
//!
//! The `/query` endpoint answers with one result per statement, each holding
//! zero or more series (one per tag group). Rows are positional and line up
//! with the `columns` list; the `time` column is RFC 3339.

use crate::domain::model::LOCAL_TZ;
use crate::utils::error::{HabError, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub series: Vec<Series>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// A single row with its series tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub time: DateTime<Tz>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, Value>,
}

impl Point {
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    pub fn value(&self) -> Option<f64> {
        self.field("value")
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    series: Vec<Series>,
}

impl ResultSet {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    /// Flattens every statement of a response, failing on the first
    /// statement-level error.
    pub fn from_response(response: QueryResponse) -> Result<Self> {
        if let Some(error) = response.error {
            return Err(HabError::influx(error));
        }

        let mut series = Vec::new();
        for statement in response.results {
            if let Some(error) = statement.error {
                return Err(HabError::influx(format!(
                    "statement {}: {}",
                    statement.statement_id, error
                )));
            }
            series.extend(statement.series);
        }

        Ok(Self { series })
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.values.is_empty())
    }

    pub fn points(&self) -> Vec<Point> {
        self.collect(|_| true)
    }

    /// Points of the series whose tag `key` equals `value`.
    pub fn points_tagged(&self, key: &str, value: &str) -> Vec<Point> {
        self.collect(|series| series.tags.get(key).map(String::as_str) == Some(value))
    }

    fn collect(&self, keep: impl Fn(&Series) -> bool) -> Vec<Point> {
        let mut points = Vec::new();

        for series in self.series.iter().filter(|s| keep(s)) {
            let Some(time_index) = series.columns.iter().position(|c| c == "time") else {
                tracing::warn!(series = %series.name, "series without time column skipped");
                continue;
            };

            for row in &series.values {
                let Some(time) = row.get(time_index).and_then(parse_time) else {
                    tracing::warn!(series = %series.name, "row with unreadable time skipped");
                    continue;
                };

                let fields = series
                    .columns
                    .iter()
                    .zip(row.iter())
                    .filter(|(column, _)| column.as_str() != "time")
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();

                points.push(Point {
                    time,
                    tags: series.tags.clone(),
                    fields,
                });
            }
        }

        points
    }
}

fn parse_time(value: &Value) -> Option<DateTime<Tz>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc).with_timezone(&LOCAL_TZ))
}
