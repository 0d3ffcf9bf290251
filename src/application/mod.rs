// Application layer - Services and the collection pipeline
pub mod aggregation_service;
pub mod battery_service;
pub mod chunk_fetcher;
pub mod collection_service;
pub mod error;
pub mod progress;
pub mod result_cache;
pub mod telemetry_repository;
