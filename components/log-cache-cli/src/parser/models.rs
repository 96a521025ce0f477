// External crates
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Nanoseconds since the Unix epoch.
pub type Nanos = i64;

/// One timestamped telemetry record as returned by Log Cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source_id: String,
    pub instance_id: String,
    pub timestamp: Nanos,
    pub payload: Payload,
}

/// Exactly one populated envelope body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Log { body: Bytes, level: LogLevel },
    Counter { name: String, total: u64 },
    /// Metric name to measurement, iterated in ascending name order
    Gauge { metrics: BTreeMap<String, GaugeValue> },
    Timer { name: String, start: Nanos, stop: Nanos },
    Event { title: String, body: String },
    Unknown { tags: BTreeMap<String, String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    #[default]
    Out,
    Err,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaugeValue {
    pub value: f64,
    pub unit: String,
}

/// Envelope kinds Log Cache can filter on server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum EnvelopeType {
    Log,
    Counter,
    Gauge,
    Timer,
    Event,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Out => "OUT",
            LogLevel::Err => "ERR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EnvelopeType {
    /// Query parameter value understood by the read endpoint.
    pub fn as_query_value(self) -> &'static str {
        match self {
            EnvelopeType::Log => "LOG",
            EnvelopeType::Counter => "COUNTER",
            EnvelopeType::Gauge => "GAUGE",
            EnvelopeType::Timer => "TIMER",
            EnvelopeType::Event => "EVENT",
        }
    }
}

impl Payload {
    /// Short upper-case tag used in rendered output.
    pub fn tag(&self) -> &'static str {
        match self {
            Payload::Log { .. } => "LOG",
            Payload::Counter { .. } => "COUNTER",
            Payload::Gauge { .. } => "GAUGE",
            Payload::Timer { .. } => "TIMER",
            Payload::Event { .. } => "EVENT",
            Payload::Unknown { .. } => "UNKNOWN",
        }
    }
}

impl Envelope {
    pub fn new(
        source_id: impl Into<String>,
        instance_id: impl Into<String>,
        timestamp: Nanos,
        payload: Payload,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            instance_id: instance_id.into(),
            timestamp,
            payload,
        }
    }
}

/// Cache statistics for one source, as reported by the meta endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceMeta {
    pub count: u64,
    pub expired: u64,
    pub oldest_timestamp: Nanos,
    pub newest_timestamp: Nanos,
}

impl SourceMeta {
    /// Span of cached data, truncated to whole seconds.
    pub fn cache_duration_nanos(&self) -> Nanos {
        let span = self.newest_timestamp.saturating_sub(self.oldest_timestamp);
        span - span % 1_000_000_000
    }
}
