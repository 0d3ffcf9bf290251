// Aggregation task types and summary models
use serde::Serialize;
use std::collections::BTreeMap;

/// The aggregation tasks a collection can run over its combined record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    BatteryHealth,
    AnomalyDetection,
    EnergyOptimization,
    PredictiveMaintenance,
}

impl TaskType {
    pub fn parse(task: &str) -> Option<Self> {
        match task {
            "batteryHealth" => Some(Self::BatteryHealth),
            "anomalyDetection" => Some(Self::AnomalyDetection),
            "energyOptimization" => Some(Self::EnergyOptimization),
            "predictiveMaintenance" => Some(Self::PredictiveMaintenance),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatteryHealth => "batteryHealth",
            Self::AnomalyDetection => "anomalyDetection",
            Self::EnergyOptimization => "energyOptimization",
            Self::PredictiveMaintenance => "predictiveMaintenance",
        }
    }
}

/// Min/max/avg/stddev over one measurement channel. An empty channel yields
/// all zeroes rather than NaN so every summary leaf stays finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub stddev: f64,
    pub count: u64,
}

impl ChannelStats {
    pub fn empty() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            stddev: 0.0,
            count: 0,
        }
    }
}

/// Welford running accumulator behind `ChannelStats`. Single-pass and
/// numerically stable, so folding order never changes the outcome beyond
/// float rounding of identical inputs.
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self) -> ChannelStats {
        if self.count == 0 {
            return ChannelStats::empty();
        }
        ChannelStats {
            min: self.min,
            max: self.max,
            avg: self.mean,
            stddev: (self.m2 / self.count as f64).sqrt(),
            count: self.count,
        }
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Downsample a trend series using bucket averaging: each bucket keeps its
/// middle point's timestamp and the mean of its values.
pub fn downsample_trend(points: Vec<TrendPoint>, max_points: usize) -> Vec<TrendPoint> {
    if points.is_empty() || points.len() <= max_points {
        return points;
    }

    let bucket_size = (points.len() as f64 / max_points as f64).ceil() as usize;
    let mut downsampled = Vec::with_capacity(max_points);

    for bucket_start in (0..points.len()).step_by(bucket_size) {
        let bucket_end = std::cmp::min(bucket_start + bucket_size, points.len());
        let bucket = &points[bucket_start..bucket_end];

        if bucket.is_empty() {
            continue;
        }

        let mid_idx = bucket.len() / 2;
        let avg_value = bucket.iter().map(|p| p.value).sum::<f64>() / bucket.len() as f64;

        downsampled.push(TrendPoint {
            timestamp: bucket[mid_idx].timestamp,
            value: avg_value,
        });
    }

    downsampled
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub voltage: ChannelStats,
    pub current: ChannelStats,
    pub temperature: ChannelStats,
    /// Equivalent full cycles inferred from accumulated state-of-charge
    /// discharge, 100 points of discharge per cycle.
    pub cycle_count: u64,
    pub soc_history: Vec<TrendPoint>,
    /// Days between the first and last observation in the set.
    pub estimated_age_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySample {
    pub timestamp: i64,
    pub field: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalySummary {
    pub voltage: ChannelStats,
    pub current: ChannelStats,
    pub temperature: ChannelStats,
    pub anomaly_count: u64,
    pub anomalies_by_field: BTreeMap<String, u64>,
    /// First few out-of-bounds readings, capped for payload size.
    pub samples: Vec<AnomalySample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergySummary {
    /// Instantaneous power in watts; positive current means discharge.
    pub power: ChannelStats,
    pub charged_wh: f64,
    pub discharged_wh: f64,
    pub net_wh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceSummary {
    pub temperature: ChannelStats,
    pub temperature_histogram: Vec<HistogramBucket>,
    pub high_temp_events: u64,
    pub deep_discharge_events: u64,
    /// 0..=100, higher is healthier.
    pub health_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "task", rename_all = "camelCase")]
pub enum AggregationSummary {
    BatteryHealth(HealthSummary),
    AnomalyDetection(AnomalySummary),
    EnergyOptimization(EnergySummary),
    PredictiveMaintenance(MaintenanceSummary),
}
