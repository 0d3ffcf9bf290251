// Time range resolution and chunk partitioning
use chrono::Utc;

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86_400;

/// Symbolic time ranges the dashboard can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeRangeSelector {
    OneMinute,
    FiveMinutes,
    OneHour,
    EightHours,
    OneDay,
    SevenDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl TimeRangeSelector {
    pub const DEFAULT: TimeRangeSelector = TimeRangeSelector::OneDay;

    pub fn parse(selector: &str) -> Option<Self> {
        match selector {
            "1min" => Some(Self::OneMinute),
            "5min" => Some(Self::FiveMinutes),
            "1hour" => Some(Self::OneHour),
            "8hour" => Some(Self::EightHours),
            "1day" => Some(Self::OneDay),
            "7day" => Some(Self::SevenDays),
            "1month" => Some(Self::OneMonth),
            "3month" => Some(Self::ThreeMonths),
            "6month" => Some(Self::SixMonths),
            "1year" => Some(Self::OneYear),
            _ => None,
        }
    }

    /// Unknown selectors fall back to the default window instead of
    /// failing; dashboard callers prefer a usable range over an error.
    pub fn parse_or_default(selector: &str) -> Self {
        match Self::parse(selector) {
            Some(range) => range,
            None => {
                tracing::warn!(
                    "unknown time range selector '{}', falling back to {}",
                    selector,
                    Self::DEFAULT.as_str()
                );
                Self::DEFAULT
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::OneHour => "1hour",
            Self::EightHours => "8hour",
            Self::OneDay => "1day",
            Self::SevenDays => "7day",
            Self::OneMonth => "1month",
            Self::ThreeMonths => "3month",
            Self::SixMonths => "6month",
            Self::OneYear => "1year",
        }
    }

    /// Fixed window length; months are 30 days and years 365 days.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Self::OneMinute => MINUTE,
            Self::FiveMinutes => 5 * MINUTE,
            Self::OneHour => HOUR,
            Self::EightHours => 8 * HOUR,
            Self::OneDay => DAY,
            Self::SevenDays => 7 * DAY,
            Self::OneMonth => 30 * DAY,
            Self::ThreeMonths => 90 * DAY,
            Self::SixMonths => 180 * DAY,
            Self::OneYear => 365 * DAY,
        }
    }

    /// How many chunks a fetch over this range is split into. Longer ranges
    /// get more chunks so per-chunk volume stays bounded.
    pub fn default_chunk_count(&self) -> usize {
        match self {
            Self::OneMinute | Self::FiveMinutes => 1,
            Self::OneHour | Self::EightHours | Self::OneDay => 2,
            Self::SevenDays | Self::OneMonth => 4,
            Self::ThreeMonths => 6,
            Self::SixMonths => 8,
            Self::OneYear => 12,
        }
    }

    pub fn resolve_at(&self, end_time: i64) -> TimeInterval {
        TimeInterval::new(end_time - self.duration_secs(), end_time)
    }

    /// Concrete interval ending now.
    pub fn resolve(&self) -> TimeInterval {
        self.resolve_at(Utc::now().timestamp())
    }
}

/// Closed interval in epoch seconds with `start_time <= end_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInterval {
    pub start_time: i64,
    pub end_time: i64,
}

impl TimeInterval {
    pub fn new(start_time: i64, end_time: i64) -> Self {
        debug_assert!(start_time <= end_time);
        Self {
            start_time,
            end_time,
        }
    }

    pub fn span_secs(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// One contiguous sub-interval of a partitioned range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start_time: i64,
    pub end_time: i64,
    pub index: usize,
    pub total: usize,
}

/// Split an interval into contiguous chunks of equal floor-divided span.
/// Every chunk except the last ends one second before its neighbour starts;
/// the last chunk always ends at the parent interval's end, absorbing the
/// integer-division remainder. `num_chunks` is clamped so short intervals
/// never produce inverted chunk bounds.
pub fn partition(interval: TimeInterval, num_chunks: usize) -> Vec<Chunk> {
    let span = interval.span_secs();
    let total = num_chunks.max(1).min(span.max(1) as usize);
    let chunk_span = span / total as i64;

    let mut chunks = Vec::with_capacity(total);
    for index in 0..total {
        let start_time = interval.start_time + index as i64 * chunk_span;
        let end_time = if index == total - 1 {
            interval.end_time
        } else {
            start_time + chunk_span - 1
        };
        chunks.push(Chunk {
            start_time,
            end_time,
            index,
            total,
        });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(interval: TimeInterval, chunks: &[Chunk]) {
        assert_eq!(chunks[0].start_time, interval.start_time);
        assert_eq!(chunks[chunks.len() - 1].end_time, interval.end_time);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_time, pair[0].end_time + 1);
        }
        for chunk in chunks {
            assert!(chunk.start_time <= chunk.end_time);
        }
    }

    #[test]
    fn test_partition_covers_interval_without_gaps() {
        let interval = TimeInterval::new(1_700_000_000, 1_702_592_000);
        for num_chunks in 1..=12 {
            let chunks = partition(interval, num_chunks);
            assert_eq!(chunks.len(), num_chunks);
            assert_covers(interval, &chunks);
        }
    }

    #[test]
    fn test_partition_last_chunk_absorbs_remainder() {
        // Span of 10 over 3 chunks: floor division gives 3, remainder 1.
        let interval = TimeInterval::new(100, 110);
        let chunks = partition(interval, 3);

        assert_eq!(chunks[0].start_time, 100);
        assert_eq!(chunks[0].end_time, 102);
        assert_eq!(chunks[1].start_time, 103);
        assert_eq!(chunks[1].end_time, 105);
        assert_eq!(chunks[2].start_time, 106);
        assert_eq!(chunks[2].end_time, 110);
    }

    #[test]
    fn test_partition_is_deterministic() {
        let interval = TimeInterval::new(1_700_000_000, 1_731_536_000);
        assert_eq!(partition(interval, 12), partition(interval, 12));
    }

    #[test]
    fn test_partition_clamps_tiny_spans() {
        let interval = TimeInterval::new(500, 502);
        let chunks = partition(interval, 8);
        assert_eq!(chunks.len(), 2);
        assert_covers(interval, &chunks);

        let instant = TimeInterval::new(500, 500);
        let chunks = partition(instant, 4);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_time, 500);
        assert_eq!(chunks[0].end_time, 500);
    }

    #[test]
    fn test_selector_parses_known_values() {
        assert_eq!(TimeRangeSelector::parse("1min"), Some(TimeRangeSelector::OneMinute));
        assert_eq!(TimeRangeSelector::parse("1month"), Some(TimeRangeSelector::OneMonth));
        assert_eq!(TimeRangeSelector::parse("1year"), Some(TimeRangeSelector::OneYear));
        assert_eq!(TimeRangeSelector::parse("2fortnight"), None);
    }

    #[test]
    fn test_unknown_selector_falls_back_to_default() {
        let range = TimeRangeSelector::parse_or_default("2fortnight");
        assert_eq!(range, TimeRangeSelector::OneDay);
    }

    #[test]
    fn test_resolve_at_produces_trailing_window() {
        let interval = TimeRangeSelector::OneHour.resolve_at(10_000);
        assert_eq!(interval.start_time, 10_000 - 3600);
        assert_eq!(interval.end_time, 10_000);

        let year = TimeRangeSelector::OneYear.resolve_at(1_700_000_000);
        assert_eq!(year.span_secs(), 365 * 86_400);
    }

    #[test]
    fn test_chunk_counts_scale_with_range() {
        assert_eq!(TimeRangeSelector::OneMinute.default_chunk_count(), 1);
        assert_eq!(TimeRangeSelector::OneDay.default_chunk_count(), 2);
        assert_eq!(TimeRangeSelector::OneMonth.default_chunk_count(), 4);
        assert_eq!(TimeRangeSelector::OneYear.default_chunk_count(), 12);
    }
}
