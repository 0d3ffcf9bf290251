// Domain layer - Battery telemetry value types and pure domain logic
pub mod battery;
pub mod summary;
pub mod telemetry;
pub mod time_range;
