// Application state for HTTP handlers
use crate::application::battery_service::BatteryService;
use crate::application::collection_service::CollectionService;

#[derive(Clone)]
pub struct AppState {
    pub battery_service: BatteryService,
    pub collection_service: CollectionService,
}
