//! Decoding of Log Cache JSON responses into [`Envelope`]s.
//!
//! Records are recognised by which body field is present, checked in the order
//! `log`, `counter`, `gauge`, `timer`, `event`; anything else becomes
//! [`Payload::Unknown`] carrying the record's tags. Protobuf-style JSON encodes
//! 64-bit integers as strings, so every integer field accepts both forms.

// Local crates
use crate::parser::models::{Envelope, GaugeValue, LogLevel, Nanos, Payload, SourceMeta};

// External crates
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, de};
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("response body is not a valid envelope batch: {0}")]
    Json(#[from] serde_json::Error),
    #[error("log payload of envelope at {timestamp} is not valid base64: {source}")]
    LogPayload {
        timestamp: Nanos,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    envelopes: Option<EnvelopeBatch>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBatch {
    #[serde(default)]
    batch: Option<Vec<RawEnvelope>>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default, alias = "sourceId")]
    source_id: Option<String>,
    #[serde(default, alias = "instanceId")]
    instance_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    timestamp: i64,
    #[serde(default)]
    log: Option<RawLog>,
    #[serde(default)]
    counter: Option<RawCounter>,
    #[serde(default)]
    gauge: Option<RawGauge>,
    #[serde(default)]
    timer: Option<RawTimer>,
    #[serde(default)]
    event: Option<RawEvent>,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    #[serde(default)]
    payload: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawCounter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct RawGauge {
    #[serde(default)]
    metrics: Option<BTreeMap<String, RawGaugeValue>>,
}

#[derive(Debug, Deserialize)]
struct RawGaugeValue {
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTimer {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    start: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    stop: i64,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    meta: Option<BTreeMap<String, RawMeta>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    #[serde(default, deserialize_with = "lenient_u64")]
    count: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    expired: u64,
    #[serde(default, deserialize_with = "lenient_i64")]
    oldest_timestamp: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    newest_timestamp: i64,
}

/// Integer as JSON number, decimal string or null.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireInt {
    Signed(i64),
    Unsigned(u64),
    Text(String),
    Null,
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match WireInt::deserialize(deserializer)? {
        WireInt::Signed(v) => Ok(v),
        WireInt::Unsigned(v) => i64::try_from(v).map_err(de::Error::custom),
        WireInt::Text(s) if s.trim().is_empty() => Ok(0),
        WireInt::Text(s) => s.trim().parse().map_err(de::Error::custom),
        WireInt::Null => Ok(0),
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match WireInt::deserialize(deserializer)? {
        WireInt::Signed(v) => u64::try_from(v).map_err(de::Error::custom),
        WireInt::Unsigned(v) => Ok(v),
        WireInt::Text(s) if s.trim().is_empty() => Ok(0),
        WireInt::Text(s) => s.trim().parse().map_err(de::Error::custom),
        WireInt::Null => Ok(0),
    }
}

/// Decode a read response body into envelopes, preserving server order.
///
/// An empty body, `{}`, or a response without a batch is an empty result.
#[instrument(
    name = "log_cache_parser::decode_batch",
    target = "parser::parser",
    skip_all,
    level = "debug"
)]
pub fn decode_batch(body: &[u8]) -> Result<Vec<Envelope>, DecodeError> {
    if is_blank(body) {
        tracing::debug!("Empty read response body, treating as empty batch");
        return Ok(Vec::new());
    }

    let response: ReadResponse = serde_json::from_slice(body)?;
    let raw = response
        .envelopes
        .and_then(|envelopes| envelopes.batch)
        .unwrap_or_default();

    tracing::debug!(envelope_count = raw.len(), "Decoding envelope batch");
    raw.into_iter().map(RawEnvelope::into_envelope).collect()
}

/// Decode a meta response body into per-source statistics.
#[instrument(
    name = "log_cache_parser::decode_meta",
    target = "parser::parser",
    skip_all,
    level = "debug"
)]
pub fn decode_meta(body: &[u8]) -> Result<BTreeMap<String, SourceMeta>, DecodeError> {
    if is_blank(body) {
        return Ok(BTreeMap::new());
    }

    let response: MetaResponse = serde_json::from_slice(body)?;
    Ok(response
        .meta
        .unwrap_or_default()
        .into_iter()
        .map(|(source_id, raw)| {
            let meta = SourceMeta {
                count: raw.count,
                expired: raw.expired,
                oldest_timestamp: raw.oldest_timestamp,
                newest_timestamp: raw.newest_timestamp,
            };
            (source_id, meta)
        })
        .collect())
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

impl RawEnvelope {
    fn into_envelope(self) -> Result<Envelope, DecodeError> {
        let timestamp = self.timestamp;

        let payload = if let Some(log) = self.log {
            Payload::Log {
                body: decode_log_payload(timestamp, log.payload.as_deref())?,
                level: log_level(log.kind.as_ref()),
            }
        } else if let Some(counter) = self.counter {
            Payload::Counter {
                name: counter.name.unwrap_or_default(),
                total: counter.total,
            }
        } else if let Some(gauge) = self.gauge {
            let metrics = gauge
                .metrics
                .unwrap_or_default()
                .into_iter()
                .map(|(name, raw)| {
                    let value = GaugeValue {
                        value: raw.value.unwrap_or_default(),
                        unit: raw.unit.unwrap_or_default(),
                    };
                    (name, value)
                })
                .collect();
            Payload::Gauge { metrics }
        } else if let Some(timer) = self.timer {
            Payload::Timer {
                name: timer.name.unwrap_or_default(),
                start: timer.start,
                stop: timer.stop,
            }
        } else if let Some(event) = self.event {
            Payload::Event {
                title: event.title.unwrap_or_default(),
                body: event.body.unwrap_or_default(),
            }
        } else {
            Payload::Unknown {
                tags: self.tags.unwrap_or_default(),
            }
        };

        Ok(Envelope {
            source_id: self.source_id.unwrap_or_default(),
            instance_id: self.instance_id.unwrap_or_default(),
            timestamp,
            payload,
        })
    }
}

fn decode_log_payload(timestamp: Nanos, payload: Option<&str>) -> Result<Bytes, DecodeError> {
    let Some(encoded) = payload.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(Bytes::new());
    };

    STANDARD
        .decode(encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(encoded))
        .or_else(|_| URL_SAFE.decode(encoded))
        .map(Bytes::from)
        .map_err(|source| {
            tracing::warn!(timestamp, error = %source, "Undecodable log payload in envelope");
            DecodeError::LogPayload { timestamp, source }
        })
}

/// Absent or unrecognised type tags mean stdout.
fn log_level(kind: Option<&serde_json::Value>) -> LogLevel {
    match kind {
        Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("ERR") => LogLevel::Err,
        Some(serde_json::Value::Number(n)) if n.as_i64() == Some(1) => LogLevel::Err,
        _ => LogLevel::Out,
    }
}
