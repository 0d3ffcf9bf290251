// Collection pipeline errors
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    /// The requested aggregation task is not one of the supported set.
    /// Rejected before any store traffic happens.
    #[error("unknown task type '{0}'")]
    UnknownTaskType(String),

    /// A range query against the store failed. One failed chunk fails the
    /// whole collection; partial results are discarded.
    #[error("store query failed for chunk {chunk_index}: {source}")]
    StoreQuery {
        chunk_index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A spawned chunk fetch stopped without producing a result.
    #[error("fetch task for chunk {0} was aborted")]
    ChunkAborted(usize),
}
