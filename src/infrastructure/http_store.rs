// HTTP adapter for the telemetry store's range-query API
use crate::application::telemetry_repository::{QueryPage, TelemetryStore};
use crate::domain::telemetry::TelemetryRecord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpTelemetryStore {
    host: String,
    token: String,
    page_limit: usize,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeResponse {
    #[serde(default)]
    items: Vec<TelemetryRecord>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatteryListResponse {
    #[serde(default)]
    batteries: Vec<String>,
}

impl HttpTelemetryStore {
    pub fn new(
        host: String,
        token: String,
        page_limit: usize,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            page_limit,
            client,
        })
    }

    fn build_range_url(
        &self,
        battery_id: &str,
        start_time: i64,
        end_time: i64,
        continuation: Option<&str>,
    ) -> String {
        let mut url = format!(
            "{}/api/records?battery={}&start={}&end={}&limit={}",
            self.host,
            urlencoding::encode(battery_id),
            start_time,
            end_time,
            self.page_limit
        );
        if let Some(cursor) = continuation {
            url.push_str("&cursor=");
            url.push_str(&urlencoding::encode(cursor));
        }
        url
    }

    async fn get_authorized(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to the telemetry store")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telemetry store request failed with status {}: {}", status, body);
        }

        Ok(response)
    }
}

#[async_trait]
impl TelemetryStore for HttpTelemetryStore {
    async fn list_battery_ids(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/batteries", self.host);
        let response = self.get_authorized(&url).await?;

        let data = response
            .json::<BatteryListResponse>()
            .await
            .context("Failed to parse battery list response")?;

        Ok(data.batteries)
    }

    async fn query_range(
        &self,
        battery_id: &str,
        start_time: i64,
        end_time: i64,
        continuation: Option<String>,
    ) -> Result<QueryPage> {
        let url = self.build_range_url(battery_id, start_time, end_time, continuation.as_deref());
        tracing::debug!("querying {}..{} for {}", start_time, end_time, battery_id);

        let response = self.get_authorized(&url).await?;
        let data = response
            .json::<RangeResponse>()
            .await
            .context("Failed to parse range query response")?;

        // The store reports query-level failures inside a 200 response.
        if let Some(error) = data.error {
            anyhow::bail!("Telemetry store query error: {}", error);
        }

        Ok(QueryPage {
            items: data.items,
            next_token: data.next_cursor,
        })
    }
}
