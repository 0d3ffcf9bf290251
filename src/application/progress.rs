// Progress events streamed to collection callers
use serde::Serialize;
use tokio::sync::mpsc;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initializing,
    Fetching,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Complete,
    Error,
}

/// Counters attached to fetching/processing events. Unknown values are
/// omitted instead of reported as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingInfo {
    /// Collection start in epoch milliseconds.
    pub started_at: i64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: Stage,
    pub status: ProgressStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressCounters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingInfo>,
}

impl ProgressEvent {
    pub fn initializing(message: impl Into<String>) -> Self {
        Self {
            stage: Stage::Initializing,
            status: ProgressStatus::InProgress,
            message: message.into(),
            progress: None,
            timing: None,
        }
    }

    pub fn fetching(
        message: impl Into<String>,
        status: ProgressStatus,
        counters: ProgressCounters,
    ) -> Self {
        Self {
            stage: Stage::Fetching,
            status,
            message: message.into(),
            progress: Some(counters),
            timing: None,
        }
    }

    pub fn processing(message: impl Into<String>, counters: ProgressCounters) -> Self {
        Self {
            stage: Stage::Processing,
            status: ProgressStatus::InProgress,
            message: message.into(),
            progress: Some(counters),
            timing: None,
        }
    }

    pub fn completed(message: impl Into<String>, timing: TimingInfo) -> Self {
        Self {
            stage: Stage::Completed,
            status: ProgressStatus::Complete,
            message: message.into(),
            progress: None,
            timing: Some(timing),
        }
    }

    pub fn error(message: impl Into<String>, timing: TimingInfo) -> Self {
        Self {
            stage: Stage::Error,
            status: ProgressStatus::Error,
            message: message.into(),
            progress: None,
            timing: Some(timing),
        }
    }
}

/// Optional progress outlet for a running collection. Sends are best-effort:
/// a dropped or absent receiver never fails the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_camel_case_keys() {
        let event = ProgressEvent::fetching(
            "fetched 1 of 4 chunks",
            ProgressStatus::InProgress,
            ProgressCounters {
                chunks: Some(4),
                completed_chunks: Some(1),
                completed_percentage: Some(25),
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "fetching");
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["progress"]["completedChunks"], 1);
        assert_eq!(json["progress"]["completedPercentage"], 25);
        // Unset counters are omitted entirely.
        assert!(json["progress"].get("processedCount").is_none());
    }

    #[tokio::test]
    async fn test_sink_without_receiver_is_a_no_op() {
        let sink = ProgressSink::none();
        sink.emit(ProgressEvent::initializing("starting")).await;

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = ProgressSink::new(tx);
        // Receiver already gone; emit must not error or block.
        sink.emit(ProgressEvent::initializing("starting")).await;
    }
}
