// Repository trait for the external telemetry store
use crate::domain::telemetry::TelemetryRecord;
use async_trait::async_trait;

/// One page of a range query. `next_token` is the store's opaque
/// continuation cursor; `None` means the range is exhausted.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<TelemetryRecord>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// List all battery IDs known to the store
    async fn list_battery_ids(&self) -> anyhow::Result<Vec<String>>;

    /// Fetch one page of records for a battery within `[start_time, end_time]`
    /// (epoch seconds, inclusive). Pass the previous page's token to continue;
    /// the cursor format is opaque to callers and crosses the trait by value.
    async fn query_range(
        &self,
        battery_id: &str,
        start_time: i64,
        end_time: i64,
        continuation: Option<String>,
    ) -> anyhow::Result<QueryPage>;
}

#[cfg(test)]
mockall::mock! {
    pub TelemetryStore {}

    #[async_trait]
    impl TelemetryStore for TelemetryStore {
        async fn list_battery_ids(&self) -> anyhow::Result<Vec<String>>;

        async fn query_range(
            &self,
            battery_id: &str,
            start_time: i64,
            end_time: i64,
            continuation: Option<String>,
        ) -> anyhow::Result<QueryPage>;
    }
}
