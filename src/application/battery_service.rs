// Battery service - Use case for listing batteries
use crate::application::telemetry_repository::TelemetryStore;
use crate::domain::battery::Battery;
use std::sync::Arc;

#[derive(Clone)]
pub struct BatteryService {
    store: Arc<dyn TelemetryStore>,
}

impl BatteryService {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn list_batteries(&self) -> anyhow::Result<Vec<Battery>> {
        let ids = self.store.list_battery_ids().await?;
        Ok(ids.into_iter().map(Battery::new).collect())
    }
}
