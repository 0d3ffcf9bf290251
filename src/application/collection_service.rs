// Collection service - chunked concurrent fetch, caching and aggregation
use crate::application::aggregation_service::AggregationService;
use crate::application::chunk_fetcher::{self, ChunkOutcome, ChunkProgress, ChunkResult};
use crate::application::error::CollectError;
use crate::application::progress::{
    ProgressCounters, ProgressEvent, ProgressSink, ProgressStatus, TimingInfo,
};
use crate::application::result_cache::{CacheKey, ResultCache};
use crate::application::telemetry_repository::TelemetryStore;
use crate::domain::summary::{AggregationSummary, TaskType};
use crate::domain::telemetry::TelemetryRecord;
use crate::domain::time_range::{partition, Chunk, TimeRangeSelector};
use crate::infrastructure::config::CollectorSettings;
use chrono::Utc;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Buffer for per-page reports flowing from chunk fetches to the
/// progress aggregator.
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Buffer for the outward message stream handed to HTTP handlers.
const STREAM_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTiming {
    /// Epoch milliseconds.
    pub started_at: i64,
    pub completed_at: i64,
    pub elapsed_ms: u64,
    pub fetch_elapsed_ms: u64,
    pub process_elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub battery_id: String,
    pub time_range: String,
    pub record_count: usize,
    pub chunk_count: usize,
    pub from_cache: bool,
    pub timing: CollectionTiming,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult {
    pub meta: CollectionMeta,
    pub summary: AggregationSummary,
    /// First few raw records, for display and debugging.
    pub sample: Vec<TelemetryRecord>,
    pub records: Vec<TelemetryRecord>,
}

/// One line of a collection stream: progress while running, then the result
/// as the final message on success.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CollectionMessage {
    Progress(ProgressEvent),
    Result(CollectionResult),
}

#[derive(Clone)]
pub struct CollectionService {
    store: Arc<dyn TelemetryStore>,
    cache: Arc<ResultCache>,
    aggregation: AggregationService,
    settings: CollectorSettings,
}

impl CollectionService {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        cache: Arc<ResultCache>,
        settings: CollectorSettings,
    ) -> Self {
        let aggregation = AggregationService::new(settings.batch_size);
        Self {
            store,
            cache,
            aggregation,
            settings,
        }
    }

    /// Run a full collection for one battery: resolve the range, fetch every
    /// chunk concurrently (or reuse cached records), aggregate, and return
    /// the result. Progress is emitted into `progress` throughout; failures
    /// are reported there as a terminal error event before they propagate.
    pub async fn collect_data(
        &self,
        battery_id: &str,
        selector: &str,
        task_type: &str,
        progress: ProgressSink,
    ) -> Result<CollectionResult, CollectError> {
        let started = Instant::now();
        let started_at = Utc::now().timestamp_millis();

        match self
            .run_collection(battery_id, selector, task_type, &progress, started, started_at)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!("collection for {} failed: {}", battery_id, err);
                progress
                    .emit(ProgressEvent::error(
                        err.to_string(),
                        TimingInfo {
                            started_at,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        },
                    ))
                    .await;
                Err(err)
            }
        }
    }

    /// Spawn a collection and stream its progress and final result as they
    /// happen. The receiver closes after the terminal message.
    pub fn stream(
        &self,
        battery_id: String,
        selector: String,
        task_type: String,
        refresh: bool,
    ) -> mpsc::Receiver<CollectionMessage> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = self.clone();

        tokio::spawn(async move {
            if refresh {
                let range = TimeRangeSelector::parse_or_default(&selector);
                let key = CacheKey::for_request(&battery_id, range.as_str());
                if service.cache.invalidate(&key).await {
                    tracing::debug!("dropped cached records for {} ahead of refresh", key);
                }
            }

            let (progress_tx, mut progress_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
            let forward_tx = tx.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = progress_rx.recv().await {
                    if forward_tx.send(CollectionMessage::Progress(event)).await.is_err() {
                        break;
                    }
                }
            });

            let outcome = service
                .collect_data(&battery_id, &selector, &task_type, ProgressSink::new(progress_tx))
                .await;

            // All progress has been forwarded once the forwarder ends; only
            // then may the result go out, so it is always the last message.
            let _ = forwarder.await;
            if let Ok(result) = outcome {
                let _ = tx.send(CollectionMessage::Result(result)).await;
            }
        });

        rx
    }

    async fn run_collection(
        &self,
        battery_id: &str,
        selector: &str,
        task_type: &str,
        progress: &ProgressSink,
        started: Instant,
        started_at: i64,
    ) -> Result<CollectionResult, CollectError> {
        // Task validation happens before any store traffic.
        let task = TaskType::parse(task_type)
            .ok_or_else(|| CollectError::UnknownTaskType(task_type.to_string()))?;
        let range = TimeRangeSelector::parse_or_default(selector);
        let chunk_count = range.default_chunk_count();
        let key = CacheKey::for_request(battery_id, range.as_str());

        progress
            .emit(ProgressEvent::initializing(format!(
                "collecting {} over {} for {}",
                task.as_str(),
                range.as_str(),
                battery_id
            )))
            .await;

        let fetch_started = Instant::now();
        let (records, from_cache) = match self.cache.get(&key).await {
            Some(cached) => {
                progress
                    .emit(ProgressEvent::fetching(
                        format!("reusing {} cached records for {}", cached.len(), key),
                        ProgressStatus::Complete,
                        ProgressCounters {
                            chunks: Some(chunk_count),
                            completed_chunks: Some(chunk_count),
                            completed_percentage: Some(100),
                            processed_count: Some(cached.len()),
                            total_count: Some(cached.len()),
                        },
                    ))
                    .await;
                (cached.as_ref().clone(), true)
            }
            None => {
                let interval = range.resolve();
                let chunks = partition(interval, chunk_count);
                let records = self.fetch_all_chunks(battery_id, &chunks, progress).await?;
                self.cache.put(key, records.clone()).await;
                (records, false)
            }
        };
        let fetch_elapsed_ms = fetch_started.elapsed().as_millis() as u64;

        let process_started = Instant::now();
        let (summary, sample) = self.aggregation.process(task, &records, progress).await;
        let process_elapsed_ms = process_started.elapsed().as_millis() as u64;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        progress
            .emit(ProgressEvent::completed(
                format!("collected {} records in {} chunks", records.len(), chunk_count),
                TimingInfo { started_at, elapsed_ms },
            ))
            .await;

        Ok(CollectionResult {
            meta: CollectionMeta {
                battery_id: battery_id.to_string(),
                time_range: range.as_str().to_string(),
                record_count: records.len(),
                chunk_count,
                from_cache,
                timing: CollectionTiming {
                    started_at,
                    completed_at: Utc::now().timestamp_millis(),
                    elapsed_ms,
                    fetch_elapsed_ms,
                    process_elapsed_ms,
                },
            },
            summary,
            sample,
            records,
        })
    }

    /// Fan out one fetch task per chunk and await them all. The first chunk
    /// failure fails the whole fetch; sibling tasks are left to run to
    /// completion on their own, their output discarded.
    async fn fetch_all_chunks(
        &self,
        battery_id: &str,
        chunks: &[Chunk],
        progress: &ProgressSink,
    ) -> Result<Vec<TelemetryRecord>, CollectError> {
        let total = chunks.len();
        let page_delay = Duration::from_millis(self.settings.page_delay_ms);
        let (report_tx, report_rx) = mpsc::channel::<ChunkProgress>(REPORT_CHANNEL_CAPACITY);

        let mut handles = Vec::with_capacity(total);
        for chunk in chunks.iter().copied() {
            let store = Arc::clone(&self.store);
            let battery = battery_id.to_string();
            let reports = report_tx.clone();
            handles.push(tokio::spawn(async move {
                chunk_fetcher::fetch_chunk(store.as_ref(), &battery, chunk, page_delay, &reports)
                    .await
            }));
        }
        drop(report_tx);

        let aggregator = tokio::spawn(aggregate_reports(
            report_rx,
            total,
            self.settings.expected_items_per_chunk,
            progress.clone(),
        ));

        let joined = try_join_all(handles.into_iter().enumerate().map(
            |(index, handle)| async move {
                match handle.await {
                    Ok(result) => result,
                    Err(join_err) => {
                        tracing::error!("fetch task for chunk {} did not finish: {}", index, join_err);
                        Err(CollectError::ChunkAborted(index))
                    }
                }
            },
        ))
        .await;

        match joined {
            Ok(results) => {
                // Every sender is gone; drain the last reports so the final
                // fetch event lands before processing begins.
                let _ = aggregator.await;
                let mut records =
                    Vec::with_capacity(results.iter().map(|result| result.count).sum());
                for ChunkResult { items, .. } in results {
                    records.extend(items);
                }
                Ok(records)
            }
            Err(err) => {
                // Stop translating reports so nothing lands after the
                // terminal error event. Stragglers keep fetching into a
                // closed channel and are dropped with it.
                aggregator.abort();
                let _ = aggregator.await;
                Err(err)
            }
        }
    }
}

/// Fold per-page chunk reports into aggregate fetching events. The overall
/// percentage is the floor of the mean of per-chunk estimates; a chunk whose
/// true page count is unknown is estimated against the configured expected
/// volume and capped below 100 until its final page arrives.
async fn aggregate_reports(
    mut reports: mpsc::Receiver<ChunkProgress>,
    total: usize,
    expected_items_per_chunk: usize,
    progress: ProgressSink,
) {
    let mut local_pct = vec![0u64; total];
    let mut complete = vec![false; total];
    let mut items = vec![0usize; total];

    while let Some(report) = reports.recv().await {
        if report.chunk_index >= total {
            continue;
        }
        items[report.chunk_index] = report.items_fetched;
        match report.outcome {
            ChunkOutcome::Error(message) => {
                progress
                    .emit(ProgressEvent::fetching(
                        format!("chunk {} failed: {}", report.chunk_index, message),
                        ProgressStatus::Error,
                        ProgressCounters {
                            chunks: Some(total),
                            completed_chunks: Some(complete.iter().filter(|done| **done).count()),
                            ..Default::default()
                        },
                    ))
                    .await;
                continue;
            }
            ChunkOutcome::Complete => {
                complete[report.chunk_index] = true;
                local_pct[report.chunk_index] = 100;
            }
            ChunkOutcome::InProgress => {
                local_pct[report.chunk_index] =
                    estimate_chunk_percentage(report.items_fetched, expected_items_per_chunk);
            }
        }

        let completed_chunks = complete.iter().filter(|done| **done).count();
        let overall = (local_pct.iter().sum::<u64>() / total as u64) as u8;
        let fetched: usize = items.iter().sum();
        progress
            .emit(ProgressEvent::fetching(
                format!("fetched {} of {} chunks ({} records)", completed_chunks, total, fetched),
                if completed_chunks == total {
                    ProgressStatus::Complete
                } else {
                    ProgressStatus::InProgress
                },
                ProgressCounters {
                    chunks: Some(total),
                    completed_chunks: Some(completed_chunks),
                    completed_percentage: Some(overall),
                    processed_count: Some(fetched),
                    total_count: None,
                },
            ))
            .await;
    }
}

/// Estimate how far along a still-paging chunk is. Without a total from the
/// store this is a guess against expected volume, never reported as done.
fn estimate_chunk_percentage(items_fetched: usize, expected_items_per_chunk: usize) -> u64 {
    if expected_items_per_chunk == 0 {
        return 0;
    }
    let pct = items_fetched * 100 / expected_items_per_chunk;
    pct.min(99) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::progress::Stage;
    use crate::application::result_cache::EvictionPolicy;
    use crate::application::telemetry_repository::{MockTelemetryStore, QueryPage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::{wrappers::ReceiverStream, StreamExt};

    fn settings() -> CollectorSettings {
        CollectorSettings {
            page_delay_ms: 0,
            batch_size: 1000,
            expected_items_per_chunk: 1000,
            cache_max_entries: None,
        }
    }

    fn service(store: MockTelemetryStore) -> CollectionService {
        CollectionService::new(
            Arc::new(store),
            Arc::new(ResultCache::new(EvictionPolicy::None)),
            settings(),
        )
    }

    fn page_of(start: i64, count: usize) -> QueryPage {
        QueryPage {
            items: (0..count)
                .map(|i| {
                    TelemetryRecord::new(start + i as i64)
                        .with_field("voltage", 48.0)
                        .with_field("current", 5.0)
                        .with_field("temperature", 25.0)
                        .with_field("soc", 80.0)
                })
                .collect(),
            next_token: None,
        }
    }

    async fn drain_events(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_collect_fetches_all_chunks_and_aggregates() {
        // First two chunks to answer carry records, the rest are empty.
        let calls = AtomicUsize::new(0);
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(4)
            .returning(move |_, start, _, _| {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(page_of(start, 500)),
                    1 => Ok(page_of(start, 480)),
                    _ => Ok(page_of(start, 0)),
                }
            });

        let (tx, rx) = mpsc::channel(256);
        let result = service(store)
            .collect_data("BAT-0x440", "1month", "batteryHealth", ProgressSink::new(tx))
            .await
            .unwrap();

        assert_eq!(result.meta.battery_id, "BAT-0x440");
        assert_eq!(result.meta.time_range, "1month");
        assert_eq!(result.meta.record_count, 980);
        assert_eq!(result.meta.chunk_count, 4);
        assert!(!result.meta.from_cache);
        assert_eq!(result.records.len(), 980);
        assert_eq!(result.sample.len(), 5);
        match &result.summary {
            AggregationSummary::BatteryHealth(health) => {
                assert_eq!(health.voltage.count, 980);
                assert_eq!(health.voltage.avg, 48.0);
            }
            other => panic!("unexpected summary {other:?}"),
        }

        let events = drain_events(rx).await;
        assert_eq!(events[0].stage, Stage::Initializing);
        assert_eq!(events.last().unwrap().stage, Stage::Completed);
        let last_fetch = events.iter().rposition(|event| event.stage == Stage::Fetching);
        let first_process = events.iter().position(|event| event.stage == Stage::Processing);
        assert!(last_fetch.unwrap() < first_process.unwrap());
        // The fetch phase ends with every chunk accounted for.
        let final_fetch = events
            .iter()
            .filter(|event| event.stage == Stage::Fetching)
            .last()
            .unwrap();
        assert_eq!(final_fetch.status, ProgressStatus::Complete);
        let counters = final_fetch.progress.unwrap();
        assert_eq!(counters.completed_chunks, Some(4));
        assert_eq!(counters.completed_percentage, Some(100));
    }

    #[tokio::test]
    async fn test_repeat_request_is_served_from_cache() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(4)
            .returning(|_, start, _, _| Ok(page_of(start, 10)));

        let service = service(store);
        let first = service
            .collect_data("BAT-1", "1month", "batteryHealth", ProgressSink::none())
            .await
            .unwrap();
        // Second run must not touch the store again; times(4) above enforces it.
        let second = service
            .collect_data("BAT-1", "1month", "batteryHealth", ProgressSink::none())
            .await
            .unwrap();

        assert!(!first.meta.from_cache);
        assert!(second.meta.from_cache);
        assert_eq!(first.meta.record_count, second.meta.record_count);
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.records, second.records);
    }

    #[tokio::test]
    async fn test_cached_records_skip_the_store_entirely() {
        let mut store = MockTelemetryStore::new();
        store.expect_query_range().never();

        let cache = Arc::new(ResultCache::new(EvictionPolicy::None));
        cache
            .put(
                CacheKey::for_request("BAT-1", "1month"),
                page_of(0, 25).items,
            )
            .await;

        let service = CollectionService::new(Arc::new(store), cache, settings());
        let result = service
            .collect_data("BAT-1", "1month", "batteryHealth", ProgressSink::none())
            .await
            .unwrap();

        assert!(result.meta.from_cache);
        assert_eq!(result.meta.record_count, 25);
        assert_eq!(result.meta.chunk_count, 4);
    }

    #[tokio::test]
    async fn test_one_failed_chunk_fails_the_collection() {
        let calls = AtomicUsize::new(0);
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(4)
            .returning(move |_, start, _, _| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("store unavailable"))
                } else {
                    Ok(page_of(start, 50))
                }
            });

        let (tx, rx) = mpsc::channel(256);
        let err = service(store)
            .collect_data("BAT-1", "1month", "batteryHealth", ProgressSink::new(tx))
            .await
            .unwrap_err();

        assert!(matches!(err, CollectError::StoreQuery { .. }));

        let events = drain_events(rx).await;
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Error);
        assert_eq!(last.status, ProgressStatus::Error);
        // Nothing was cached, and no result-stage events followed the error.
        assert!(!events.iter().any(|event| event.stage == Stage::Processing));
    }

    #[tokio::test]
    async fn test_failed_collection_caches_nothing() {
        let calls = AtomicUsize::new(0);
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(8)
            .returning(move |_, start, _, _| {
                // One chunk of the first collection fails, the retry works.
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("store unavailable"))
                } else {
                    Ok(page_of(start, 10))
                }
            });

        let cache = Arc::new(ResultCache::new(EvictionPolicy::None));
        let service = CollectionService::new(Arc::new(store), cache.clone(), settings());

        let err = service
            .collect_data("BAT-1", "1month", "batteryHealth", ProgressSink::none())
            .await;
        assert!(err.is_err());
        assert!(!cache.contains(&CacheKey::for_request("BAT-1", "1month")).await);

        let retry = service
            .collect_data("BAT-1", "1month", "batteryHealth", ProgressSink::none())
            .await
            .unwrap();
        assert!(!retry.meta.from_cache);
        assert_eq!(retry.meta.record_count, 40);
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected_before_any_fetch() {
        let mut store = MockTelemetryStore::new();
        store.expect_query_range().never();

        let (tx, rx) = mpsc::channel(16);
        let err = service(store)
            .collect_data("BAT-1", "1month", "fleetReport", ProgressSink::new(tx))
            .await
            .unwrap_err();

        assert!(matches!(err, CollectError::UnknownTaskType(_)));
        let events = drain_events(rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, Stage::Error);
    }

    #[tokio::test]
    async fn test_unknown_selector_falls_back_to_default_range() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(2)
            .returning(|_, start, _, _| Ok(page_of(start, 5)));

        let result = service(store)
            .collect_data("BAT-1", "2fortnight", "batteryHealth", ProgressSink::none())
            .await
            .unwrap();

        assert_eq!(result.meta.time_range, "1day");
        assert_eq!(result.meta.chunk_count, 2);
        assert_eq!(result.meta.record_count, 10);
    }

    #[tokio::test]
    async fn test_stream_emits_progress_then_result_last() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(2)
            .returning(|_, start, _, _| Ok(page_of(start, 20)));

        let rx = service(store).stream(
            "BAT-1".to_string(),
            "1day".to_string(),
            "energyOptimization".to_string(),
            false,
        );

        let messages: Vec<CollectionMessage> = ReceiverStream::new(rx).collect().await;

        assert!(messages.len() >= 3);
        for message in &messages[..messages.len() - 1] {
            assert!(matches!(message, CollectionMessage::Progress(_)));
        }
        match messages.last().unwrap() {
            CollectionMessage::Result(result) => {
                assert_eq!(result.meta.record_count, 40);
                assert!(matches!(result.summary, AggregationSummary::EnergyOptimization(_)));
            }
            other => panic!("expected a result message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_with_refresh_drops_the_cached_entry() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_query_range()
            .times(4)
            .returning(|_, start, _, _| Ok(page_of(start, 7)));

        let service = service(store);
        let first = service
            .collect_data("BAT-1", "1day", "batteryHealth", ProgressSink::none())
            .await
            .unwrap();
        assert!(!first.meta.from_cache);

        let mut rx = service.stream(
            "BAT-1".to_string(),
            "1day".to_string(),
            "batteryHealth".to_string(),
            true,
        );
        let mut last = None;
        while let Some(message) = rx.recv().await {
            last = Some(message);
        }

        match last {
            Some(CollectionMessage::Result(result)) => {
                // Refresh forced a second full fetch; times(4) checks the
                // store saw both rounds.
                assert!(!result.meta.from_cache);
                assert_eq!(result.meta.record_count, 14);
            }
            other => panic!("expected a result message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_progress_percentage_averages_chunk_estimates() {
        let (tx, rx) = mpsc::channel(64);
        let (report_tx, report_rx) = mpsc::channel(16);

        let aggregator = tokio::spawn(aggregate_reports(report_rx, 2, 1000, ProgressSink::new(tx)));

        report_tx
            .send(ChunkProgress {
                chunk_index: 0,
                items_fetched: 500,
                outcome: ChunkOutcome::InProgress,
            })
            .await
            .unwrap();
        report_tx
            .send(ChunkProgress {
                chunk_index: 1,
                items_fetched: 120,
                outcome: ChunkOutcome::Complete,
            })
            .await
            .unwrap();
        drop(report_tx);
        aggregator.await.unwrap();

        let events = drain_events(rx).await;
        assert_eq!(events.len(), 2);
        // One chunk at 50%, the other untouched: floor(50 / 2) = 25.
        assert_eq!(events[0].progress.unwrap().completed_percentage, Some(25));
        // 50% and a finished chunk: floor(150 / 2) = 75.
        assert_eq!(events[1].progress.unwrap().completed_percentage, Some(75));
        assert_eq!(events[1].progress.unwrap().completed_chunks, Some(1));
    }
}
