// Telemetry record domain model
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const FIELD_VOLTAGE: &str = "voltage";
pub const FIELD_CURRENT: &str = "current";
pub const FIELD_TEMPERATURE: &str = "temperature";
pub const FIELD_SOC: &str = "soc";
pub const FIELD_CYCLE_COUNT: &str = "cycle_count";

/// Measurement channels the aggregation tasks read. Records may carry any
/// number of extra fields; those ride along untouched.
pub const MEASUREMENT_FIELDS: [&str; 5] = [
    FIELD_VOLTAGE,
    FIELD_CURRENT,
    FIELD_TEMPERATURE,
    FIELD_SOC,
    FIELD_CYCLE_COUNT,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Observation time in epoch seconds.
    pub timestamp: i64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl TelemetryRecord {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Read a measurement channel as a finite number. Missing, non-numeric
    /// and non-finite values all read as 0.0 so downstream statistics never
    /// see a NaN.
    pub fn metric(&self, name: &str) -> f64 {
        self.fields.get(name).map(coerce_numeric).unwrap_or(0.0)
    }

    /// Rewrite the known measurement channels as finite JSON numbers. Chunk
    /// fetches run this on every record before it joins the combined set.
    pub fn normalize_measurements(&mut self) {
        for field in MEASUREMENT_FIELDS {
            let coerced = self.metric(field);
            self.fields.insert(field.to_string(), json_number(coerced));
        }
    }
}

fn coerce_numeric(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if parsed.is_finite() { parsed } else { 0.0 }
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_coerces_values() {
        let record = TelemetryRecord::new(1000)
            .with_field("voltage", json!(48.2))
            .with_field("current", json!("12.5"))
            .with_field("temperature", json!("not a number"))
            .with_field("soc", json!(true));

        assert_eq!(record.metric("voltage"), 48.2);
        assert_eq!(record.metric("current"), 12.5);
        assert_eq!(record.metric("temperature"), 0.0);
        assert_eq!(record.metric("soc"), 0.0);
        assert_eq!(record.metric("cycle_count"), 0.0);
    }

    #[test]
    fn test_normalize_rewrites_measurement_channels() {
        let mut record = TelemetryRecord::new(1000)
            .with_field("voltage", json!("47.9"))
            .with_field("soc", json!(null))
            .with_field("note", json!("manual reading"));

        record.normalize_measurements();

        assert_eq!(record.fields["voltage"], json!(47.9));
        assert_eq!(record.fields["soc"], json!(0.0));
        assert_eq!(record.fields["current"], json!(0.0));
        // Unknown fields are preserved as-is.
        assert_eq!(record.fields["note"], json!("manual reading"));
    }

    #[test]
    fn test_record_deserializes_flattened_fields() {
        let record: TelemetryRecord =
            serde_json::from_value(json!({"timestamp": 1700000000, "voltage": 48.1, "soc": 91}))
                .unwrap();

        assert_eq!(record.timestamp, 1700000000);
        assert_eq!(record.metric("voltage"), 48.1);
        assert_eq!(record.metric("soc"), 91.0);
    }
}
