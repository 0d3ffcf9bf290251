// Chunk fetcher - pages one time chunk to exhaustion
use crate::application::error::CollectError;
use crate::application::telemetry_repository::TelemetryStore;
use crate::domain::telemetry::TelemetryRecord;
use crate::domain::time_range::Chunk;
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-page report from one chunk fetch. The collection service folds these
/// into aggregate progress events.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProgress {
    pub chunk_index: usize,
    /// Items accumulated so far for this chunk, across all pages.
    pub items_fetched: usize,
    pub outcome: ChunkOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// The store returned a continuation token; more pages remain.
    InProgress,
    /// The chunk's range is exhausted.
    Complete,
    /// A page query failed; the chunk's partial items are discarded.
    Error(String),
}

/// Everything fetched for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub items: Vec<TelemetryRecord>,
    pub count: usize,
    pub chunk: Chunk,
}

/// Fetch every record in the chunk's range, following continuation tokens
/// until the store reports none, however many pages that takes. A report is
/// sent after every page; a short pause between pages keeps the store from
/// seeing back-to-back requests from the same chunk.
pub async fn fetch_chunk(
    store: &dyn TelemetryStore,
    battery_id: &str,
    chunk: Chunk,
    page_delay: Duration,
    reports: &mpsc::Sender<ChunkProgress>,
) -> Result<ChunkResult, CollectError> {
    let mut items: Vec<TelemetryRecord> = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = match store
            .query_range(battery_id, chunk.start_time, chunk.end_time, continuation.clone())
            .await
        {
            Ok(page) => page,
            Err(source) => {
                let _ = reports
                    .send(ChunkProgress {
                        chunk_index: chunk.index,
                        items_fetched: items.len(),
                        outcome: ChunkOutcome::Error(source.to_string()),
                    })
                    .await;
                return Err(CollectError::StoreQuery {
                    chunk_index: chunk.index,
                    source,
                });
            }
        };

        for mut record in page.items {
            record.normalize_measurements();
            items.push(record);
        }
        continuation = page.next_token;
        let exhausted = continuation.is_none();

        let _ = reports
            .send(ChunkProgress {
                chunk_index: chunk.index,
                items_fetched: items.len(),
                outcome: if exhausted { ChunkOutcome::Complete } else { ChunkOutcome::InProgress },
            })
            .await;

        if exhausted {
            break;
        }
        tokio::time::sleep(page_delay).await;
    }

    Ok(ChunkResult {
        count: items.len(),
        items,
        chunk,
    })
}
