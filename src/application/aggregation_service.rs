// Aggregation service - folds combined record sets into task summaries
use crate::application::progress::{ProgressCounters, ProgressEvent, ProgressSink};
use crate::domain::summary::{
    downsample_trend, AggregationSummary, AnomalySample, AnomalySummary, EnergySummary,
    HealthSummary, HistogramBucket, MaintenanceSummary, RunningStats, TaskType, TrendPoint,
};
use crate::domain::telemetry::{
    TelemetryRecord, FIELD_CURRENT, FIELD_SOC, FIELD_TEMPERATURE, FIELD_VOLTAGE,
};
use std::collections::BTreeMap;

/// Points kept in a summary trend series; matches the dashboard chart width.
const MAX_TREND_POINTS: usize = 150;

/// Raw records returned alongside a summary for display and debugging.
const RAW_SAMPLE_SIZE: usize = 5;

/// Out-of-bounds readings kept verbatim in an anomaly summary.
const ANOMALY_SAMPLE_LIMIT: usize = 20;

/// Plausible sensor ranges; anything outside counts as an anomaly.
const VOLTAGE_BOUNDS: (f64, f64) = (0.0, 1000.0);
const CURRENT_BOUNDS: (f64, f64) = (-500.0, 500.0);
const TEMPERATURE_BOUNDS: (f64, f64) = (-40.0, 85.0);
const SOC_BOUNDS: (f64, f64) = (0.0, 100.0);

const TEMP_HIGH_C: f64 = 45.0;
const SOC_DEEP_DISCHARGE: f64 = 15.0;

const TEMP_HISTOGRAM_BOUNDS: [(f64, f64); 6] = [
    (-40.0, 0.0),
    (0.0, 15.0),
    (15.0, 30.0),
    (30.0, 45.0),
    (45.0, 60.0),
    (60.0, 85.0),
];

#[derive(Debug, Clone)]
pub struct AggregationService {
    batch_size: usize,
}

impl AggregationService {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Fold `records` into the summary for `task`. Records are visited in
    /// ascending timestamp order whatever order the chunks were concatenated
    /// in, and the fold yields to the runtime between batches so a large
    /// collection cannot monopolise a worker. Returns the summary plus the
    /// first few records of the input as a raw sample.
    pub async fn process(
        &self,
        task: TaskType,
        records: &[TelemetryRecord],
        progress: &ProgressSink,
    ) -> (AggregationSummary, Vec<TelemetryRecord>) {
        let sample: Vec<TelemetryRecord> = records.iter().take(RAW_SAMPLE_SIZE).cloned().collect();

        // Trend series and cycle detection depend on temporal order.
        let mut ordered: Vec<&TelemetryRecord> = records.iter().collect();
        ordered.sort_by_key(|record| record.timestamp);

        let total = ordered.len();
        let mut accumulator = TaskAccumulator::new(task);
        let mut processed = 0usize;

        if total == 0 {
            progress.emit(batch_event(0, 0)).await;
        }
        for batch in ordered.chunks(self.batch_size) {
            accumulator.fold_batch(batch);
            processed += batch.len();
            progress.emit(batch_event(processed, total)).await;
            tokio::task::yield_now().await;
        }

        (accumulator.finish(), sample)
    }
}

fn batch_event(processed: usize, total: usize) -> ProgressEvent {
    let percentage = if total == 0 {
        100
    } else {
        (processed * 100 / total) as u8
    };
    ProgressEvent::processing(
        format!("processed {} of {} records", processed, total),
        ProgressCounters {
            processed_count: Some(processed),
            total_count: Some(total),
            completed_percentage: Some(percentage),
            ..Default::default()
        },
    )
}

enum TaskAccumulator {
    Health(HealthAccumulator),
    Anomaly(AnomalyAccumulator),
    Energy(EnergyAccumulator),
    Maintenance(MaintenanceAccumulator),
}

impl TaskAccumulator {
    fn new(task: TaskType) -> Self {
        match task {
            TaskType::BatteryHealth => Self::Health(HealthAccumulator::default()),
            TaskType::AnomalyDetection => Self::Anomaly(AnomalyAccumulator::default()),
            TaskType::EnergyOptimization => Self::Energy(EnergyAccumulator::default()),
            TaskType::PredictiveMaintenance => Self::Maintenance(MaintenanceAccumulator::default()),
        }
    }

    fn fold_batch(&mut self, batch: &[&TelemetryRecord]) {
        match self {
            Self::Health(acc) => batch.iter().for_each(|record| acc.fold(record)),
            Self::Anomaly(acc) => batch.iter().for_each(|record| acc.fold(record)),
            Self::Energy(acc) => batch.iter().for_each(|record| acc.fold(record)),
            Self::Maintenance(acc) => batch.iter().for_each(|record| acc.fold(record)),
        }
    }

    fn finish(self) -> AggregationSummary {
        match self {
            Self::Health(acc) => AggregationSummary::BatteryHealth(acc.finish()),
            Self::Anomaly(acc) => AggregationSummary::AnomalyDetection(acc.finish()),
            Self::Energy(acc) => AggregationSummary::EnergyOptimization(acc.finish()),
            Self::Maintenance(acc) => AggregationSummary::PredictiveMaintenance(acc.finish()),
        }
    }
}

#[derive(Default)]
struct HealthAccumulator {
    voltage: RunningStats,
    current: RunningStats,
    temperature: RunningStats,
    soc_history: Vec<TrendPoint>,
    previous_soc: Option<f64>,
    discharge_total: f64,
    first_timestamp: Option<i64>,
    last_timestamp: Option<i64>,
}

impl HealthAccumulator {
    fn fold(&mut self, record: &TelemetryRecord) {
        let soc = record.metric(FIELD_SOC);
        self.voltage.update(record.metric(FIELD_VOLTAGE));
        self.current.update(record.metric(FIELD_CURRENT));
        self.temperature.update(record.metric(FIELD_TEMPERATURE));
        self.soc_history.push(TrendPoint {
            timestamp: record.timestamp,
            value: soc,
        });

        if let Some(previous) = self.previous_soc {
            if soc < previous {
                self.discharge_total += previous - soc;
            }
        }
        self.previous_soc = Some(soc);

        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(record.timestamp);
        }
        self.last_timestamp = Some(record.timestamp);
    }

    fn finish(self) -> HealthSummary {
        // 100 points of accumulated discharge make one equivalent full cycle.
        let cycle_count = (self.discharge_total / 100.0).floor() as u64;
        let estimated_age_days = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first) as f64 / 86_400.0,
            _ => 0.0,
        };

        HealthSummary {
            voltage: self.voltage.finish(),
            current: self.current.finish(),
            temperature: self.temperature.finish(),
            cycle_count,
            soc_history: downsample_trend(self.soc_history, MAX_TREND_POINTS),
            estimated_age_days,
        }
    }
}

#[derive(Default)]
struct AnomalyAccumulator {
    voltage: RunningStats,
    current: RunningStats,
    temperature: RunningStats,
    anomaly_count: u64,
    by_field: BTreeMap<String, u64>,
    samples: Vec<AnomalySample>,
}

impl AnomalyAccumulator {
    fn fold(&mut self, record: &TelemetryRecord) {
        let voltage = record.metric(FIELD_VOLTAGE);
        let current = record.metric(FIELD_CURRENT);
        let temperature = record.metric(FIELD_TEMPERATURE);
        let soc = record.metric(FIELD_SOC);

        self.voltage.update(voltage);
        self.current.update(current);
        self.temperature.update(temperature);

        self.check(record.timestamp, FIELD_VOLTAGE, voltage, VOLTAGE_BOUNDS);
        self.check(record.timestamp, FIELD_CURRENT, current, CURRENT_BOUNDS);
        self.check(record.timestamp, FIELD_TEMPERATURE, temperature, TEMPERATURE_BOUNDS);
        self.check(record.timestamp, FIELD_SOC, soc, SOC_BOUNDS);
    }

    fn check(&mut self, timestamp: i64, field: &str, value: f64, bounds: (f64, f64)) {
        if value < bounds.0 || value > bounds.1 {
            self.anomaly_count += 1;
            *self.by_field.entry(field.to_string()).or_insert(0) += 1;
            if self.samples.len() < ANOMALY_SAMPLE_LIMIT {
                self.samples.push(AnomalySample {
                    timestamp,
                    field: field.to_string(),
                    value,
                });
            }
        }
    }

    fn finish(self) -> AnomalySummary {
        AnomalySummary {
            voltage: self.voltage.finish(),
            current: self.current.finish(),
            temperature: self.temperature.finish(),
            anomaly_count: self.anomaly_count,
            anomalies_by_field: self.by_field,
            samples: self.samples,
        }
    }
}

#[derive(Default)]
struct EnergyAccumulator {
    power: RunningStats,
    charged_wh: f64,
    discharged_wh: f64,
    previous: Option<(i64, f64)>,
}

impl EnergyAccumulator {
    fn fold(&mut self, record: &TelemetryRecord) {
        // Positive current is discharge, so positive power is energy leaving
        // the pack.
        let power = record.metric(FIELD_VOLTAGE) * record.metric(FIELD_CURRENT);
        self.power.update(power);

        if let Some((previous_timestamp, previous_power)) = self.previous {
            let dt_secs = (record.timestamp - previous_timestamp) as f64;
            if dt_secs > 0.0 {
                let energy_wh = previous_power * dt_secs / 3600.0;
                if energy_wh >= 0.0 {
                    self.discharged_wh += energy_wh;
                } else {
                    self.charged_wh += -energy_wh;
                }
            }
        }
        self.previous = Some((record.timestamp, power));
    }

    fn finish(self) -> EnergySummary {
        EnergySummary {
            power: self.power.finish(),
            charged_wh: self.charged_wh,
            discharged_wh: self.discharged_wh,
            net_wh: self.discharged_wh - self.charged_wh,
        }
    }
}

#[derive(Default)]
struct MaintenanceAccumulator {
    temperature: RunningStats,
    histogram: [u64; TEMP_HISTOGRAM_BOUNDS.len()],
    high_temp_events: u64,
    deep_discharge_events: u64,
    previous_soc: Option<f64>,
}

impl MaintenanceAccumulator {
    fn fold(&mut self, record: &TelemetryRecord) {
        let temperature = record.metric(FIELD_TEMPERATURE);
        let soc = record.metric(FIELD_SOC);

        self.temperature.update(temperature);
        for (slot, (lower, upper)) in self.histogram.iter_mut().zip(TEMP_HISTOGRAM_BOUNDS) {
            if temperature >= lower && temperature < upper {
                *slot += 1;
                break;
            }
        }

        if temperature > TEMP_HIGH_C {
            self.high_temp_events += 1;
        }
        // A deep-discharge event is the transition below the threshold, not
        // every reading spent under it.
        if let Some(previous) = self.previous_soc {
            if previous >= SOC_DEEP_DISCHARGE && soc < SOC_DEEP_DISCHARGE {
                self.deep_discharge_events += 1;
            }
        }
        self.previous_soc = Some(soc);
    }

    fn finish(self) -> MaintenanceSummary {
        let count = self.temperature.count();
        let high_temp_share = if count == 0 {
            0.0
        } else {
            self.high_temp_events as f64 / count as f64
        };
        let health_score = (100.0
            - high_temp_share * 40.0
            - self.deep_discharge_events as f64 * 2.0)
            .clamp(0.0, 100.0);

        let recommendation = if health_score >= 80.0 {
            "routine monitoring"
        } else if health_score >= 50.0 {
            "schedule inspection"
        } else {
            "service required"
        };

        let temperature_histogram = TEMP_HISTOGRAM_BOUNDS
            .iter()
            .zip(self.histogram)
            .map(|((lower, upper), count)| HistogramBucket {
                lower: *lower,
                upper: *upper,
                count,
            })
            .collect();

        MaintenanceSummary {
            temperature: self.temperature.finish(),
            temperature_histogram,
            high_temp_events: self.high_temp_events,
            deep_discharge_events: self.deep_discharge_events,
            health_score,
            recommendation: recommendation.to_string(),
        }
    }
}
