use crate::config::InfluxConfig;
use crate::domain::model::TimeData;
use crate::domain::ports::SeriesStore;
use crate::domain::series::{QueryResponse, ResultSet};
use crate::utils::error::{HabError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};

/// HTTP client for the InfluxDB 1.x API.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    client: Client,
    base_url: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl InfluxClient {
    pub fn new(config: &InfluxConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &InfluxConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    /// Credentials travel in the `Authorization` header so they never end up
    /// in a URL.
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_ref()),
            None => request,
        }
    }

    /// Sends the request; transport errors are stripped of their URL.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| HabError::from(e.without_url()))
    }

    async fn ensure_success(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(HabError::influx(format!(
            "{} failed with status {}: {}",
            action,
            status,
            body.trim()
        )))
    }
}

#[async_trait]
impl SeriesStore for InfluxClient {
    async fn query(&self, query: &str) -> Result<ResultSet> {
        tracing::debug!(query = %query.trim(), "influx query");

        let request = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[("db", self.database.as_str()), ("q", query)]);
        let response = self.send(request).await?;

        let response = Self::ensure_success(response, "query").await?;
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| HabError::from(e.without_url()))?;
        ResultSet::from_response(body)
    }

    async fn write(&self, measurement: &str, points: &[TimeData]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        tracing::debug!(measurement, count = points.len(), "influx write");

        let request = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(line_protocol(measurement, points));
        let response = self.send(request).await?;

        Self::ensure_success(response, "write").await?;
        Ok(())
    }
}

/// Renders points as `measurement value=<v> <epoch seconds>` lines.
pub fn line_protocol(measurement: &str, points: &[TimeData]) -> String {
    let measurement = measurement
        .replace(',', "\\,")
        .replace(' ', "\\ ");

    points
        .iter()
        .map(|p| format!("{} value={} {}", measurement, p.value, p.timestamp.timestamp()))
        .collect::<Vec<_>>()
        .join("\n")
}
