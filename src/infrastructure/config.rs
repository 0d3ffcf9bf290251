use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub store: StoreSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub host: String,
    pub token: String,
    /// Page size requested from the store; the store may return fewer.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default)]
    pub collector: CollectorSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorSettings {
    /// Pause between successive pages of the same chunk.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Records folded per aggregation batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Baseline for estimating per-chunk fetch progress.
    #[serde(default = "default_expected_items_per_chunk")]
    pub expected_items_per_chunk: usize,
    /// Unset means the cache grows for the life of the process.
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            page_delay_ms: default_page_delay_ms(),
            batch_size: default_batch_size(),
            expected_items_per_chunk: default_expected_items_per_chunk(),
            cache_max_entries: None,
        }
    }
}

fn default_page_limit() -> usize {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_page_delay_ms() -> u64 {
    50
}

fn default_batch_size() -> usize {
    1000
}

fn default_expected_items_per_chunk() -> usize {
    1000
}

pub fn load_store_config() -> anyhow::Result<StoreConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/store"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_collector_config() -> anyhow::Result<CollectorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/collector"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
