//! Windowing state for one tail session.
//!
//! Each poll batch is sorted by timestamp (stable, so equal timestamps keep server
//! order), envelopes already emitted are dropped, and the lower bound of the next
//! poll moves to one nanosecond past the newest timestamp seen. Identities are kept
//! for the latest batch plus a retention margin behind the cursor, so overlapping
//! windows at the boundary never double-emit.

// Local crates
use crate::parser::models::{Envelope, LogLevel, Nanos, Payload};

// External crates
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::instrument;

#[derive(Debug)]
pub struct Cursor {
    next_start: Option<Nanos>,
    seen: BTreeMap<Nanos, HashSet<IdentityKey>>,
    retention: Nanos,
}

/// Everything except the timestamp that distinguishes two envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentityKey {
    source_id: String,
    instance_id: String,
    payload: PayloadKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PayloadKey {
    Log { level: LogLevel, body: Bytes },
    Counter { name: String, total: u64 },
    Gauge { metrics: Vec<(String, u64, String)> },
    Timer { name: String, start: Nanos, stop: Nanos },
    Event { title: String, body: String },
    Unknown { tags: Vec<(String, String)> },
}

impl From<&Envelope> for IdentityKey {
    fn from(envelope: &Envelope) -> Self {
        let payload = match &envelope.payload {
            Payload::Log { body, level } => PayloadKey::Log {
                level: *level,
                body: body.clone(),
            },
            Payload::Counter { name, total } => PayloadKey::Counter {
                name: name.clone(),
                total: *total,
            },
            Payload::Gauge { metrics } => PayloadKey::Gauge {
                // f64 has no Eq/Hash; the bit pattern is an exact identity
                metrics: metrics
                    .iter()
                    .map(|(name, m)| (name.clone(), m.value.to_bits(), m.unit.clone()))
                    .collect(),
            },
            Payload::Timer { name, start, stop } => PayloadKey::Timer {
                name: name.clone(),
                start: *start,
                stop: *stop,
            },
            Payload::Event { title, body } => PayloadKey::Event {
                title: title.clone(),
                body: body.clone(),
            },
            Payload::Unknown { tags } => PayloadKey::Unknown {
                tags: tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            },
        };

        Self {
            source_id: envelope.source_id.clone(),
            instance_id: envelope.instance_id.clone(),
            payload,
        }
    }
}

impl Cursor {
    /// `start` of `None` means the first poll asks for the most recent window.
    pub fn new(start: Option<Nanos>, retention: Duration) -> Self {
        Self {
            next_start: start,
            seen: BTreeMap::new(),
            retention: i64::try_from(retention.as_nanos()).unwrap_or(i64::MAX),
        }
    }

    /// Inclusive lower bound for the next poll.
    pub fn next_start(&self) -> Option<Nanos> {
        self.next_start
    }

    /// Number of identities currently remembered.
    pub fn seen_len(&self) -> usize {
        self.seen.values().map(HashSet::len).sum()
    }

    /// Turn a raw poll batch into the net-new envelopes in timestamp order and
    /// advance the window. An empty batch leaves the cursor untouched.
    #[instrument(
        name = "log_cache_cursor::advance",
        target = "cursor::cursor::Cursor",
        skip_all,
        level = "debug"
    )]
    pub fn advance(&mut self, mut batch: Vec<Envelope>) -> Vec<Envelope> {
        let (Some(oldest), Some(newest)) = (
            batch.iter().map(|e| e.timestamp).min(),
            batch.iter().map(|e| e.timestamp).max(),
        ) else {
            tracing::debug!(next_start = ?self.next_start, "Empty batch, cursor unchanged");
            return Vec::new();
        };

        let received = batch.len();
        batch.sort_by_key(|e| e.timestamp);

        // Only identities from earlier batches count as seen; repeats inside one batch
        // are distinct records.
        let fresh: Vec<Envelope> = batch.into_iter().filter(|e| !self.has_seen(e)).collect();
        for envelope in &fresh {
            self.seen
                .entry(envelope.timestamp)
                .or_default()
                .insert(IdentityKey::from(envelope));
        }

        let next_start = newest.saturating_add(1);
        self.next_start = Some(next_start);
        self.prune(next_start.saturating_sub(self.retention).min(oldest));

        tracing::debug!(
            received,
            fresh = fresh.len(),
            next_start,
            remembered = self.seen_len(),
            "Cursor advanced"
        );
        fresh
    }

    fn has_seen(&self, envelope: &Envelope) -> bool {
        self.seen
            .get(&envelope.timestamp)
            .is_some_and(|keys| keys.contains(&IdentityKey::from(envelope)))
    }

    /// Forget identities older than `cutoff`.
    fn prune(&mut self, cutoff: Nanos) {
        self.seen = self.seen.split_off(&cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::GaugeValue;
    use proptest::prelude::*;
    use std::collections::BTreeMap as Map;

    const RETENTION: Duration = Duration::from_secs(1);

    fn counter(timestamp: Nanos, name: &str) -> Envelope {
        Envelope::new(
            "app",
            "0",
            timestamp,
            Payload::Counter { name: name.into(), total: 1 },
        )
    }

    fn timestamps(envelopes: &[Envelope]) -> Vec<Nanos> {
        envelopes.iter().map(|e| e.timestamp).collect()
    }

    #[test]
    fn sorts_ascending_and_keeps_server_order_on_ties() {
        let mut cursor = Cursor::new(None, RETENTION);
        let fresh = cursor.advance(vec![
            counter(3, "c"),
            counter(1, "first"),
            counter(2, "b"),
            counter(1, "second"),
        ]);

        assert_eq!(timestamps(&fresh), vec![1, 1, 2, 3]);
        let names: Vec<_> = fresh
            .iter()
            .map(|e| match &e.payload {
                Payload::Counter { name, .. } => name.as_str(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["first", "second", "b", "c"]);
    }

    #[test]
    fn next_start_is_newest_plus_one() {
        let mut cursor = Cursor::new(None, RETENTION);
        assert_eq!(cursor.next_start(), None);

        cursor.advance(vec![counter(10, "a"), counter(40, "b"), counter(20, "c")]);
        assert_eq!(cursor.next_start(), Some(41));
    }

    #[test]
    fn empty_batch_leaves_cursor_unchanged() {
        let mut cursor = Cursor::new(Some(7), RETENTION);
        assert!(cursor.advance(Vec::new()).is_empty());
        assert_eq!(cursor.next_start(), Some(7));

        cursor.advance(vec![counter(9, "a")]);
        cursor.advance(Vec::new());
        assert_eq!(cursor.next_start(), Some(10));
    }

    #[test]
    fn boundary_overlap_is_not_emitted_twice() {
        let mut cursor = Cursor::new(None, RETENTION);
        cursor.advance(vec![counter(1, "a"), counter(5, "b")]);

        // Inclusive window repeats the boundary envelope and adds a sibling at the same instant.
        let fresh = cursor.advance(vec![counter(5, "b"), counter(5, "sibling"), counter(6, "c")]);

        assert_eq!(timestamps(&fresh), vec![5, 6]);
        assert_eq!(cursor.next_start(), Some(7));
    }

    #[test]
    fn identical_envelopes_in_one_batch_are_all_emitted() {
        let line = || {
            Envelope::new(
                "app",
                "0",
                5,
                Payload::Log {
                    body: Bytes::from_static(b"retrying\n"),
                    level: LogLevel::Out,
                },
            )
        };
        let mut cursor = Cursor::new(None, RETENTION);

        assert_eq!(cursor.advance(vec![line(), line()]).len(), 2);
        assert!(cursor.advance(vec![line(), line()]).is_empty());
        assert_eq!(cursor.seen_len(), 1);
    }

    #[test]
    fn identity_distinguishes_instances_and_variants() {
        let mut cursor = Cursor::new(None, RETENTION);
        let mut other_instance = counter(1, "a");
        other_instance.instance_id = "1".into();
        let gauge = Envelope::new(
            "app",
            "0",
            1,
            Payload::Gauge {
                metrics: Map::from([("a".into(), GaugeValue { value: 1.0, unit: "u".into() })]),
            },
        );

        let fresh = cursor.advance(vec![counter(1, "a"), other_instance, gauge]);
        assert_eq!(fresh.len(), 3);
    }

    #[test]
    fn old_identities_are_pruned() {
        let second: Nanos = 1_000_000_000;
        let mut cursor = Cursor::new(None, RETENTION);

        cursor.advance(vec![counter(0, "a")]);
        cursor.advance(vec![counter(10 * second, "b")]);
        cursor.advance(vec![counter(20 * second, "c")]);

        assert_eq!(cursor.seen_len(), 1);
    }

    /// Small pools of timestamps and names, so batches regularly repeat identities.
    fn arb_batch() -> impl Strategy<Value = Vec<Envelope>> {
        let stamp = prop_oneof![-5_000_000_000i64..5_000_000_000, 0i64..4];
        prop::collection::vec((stamp, 0u8..3), 0..40).prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(ts, name)| counter(ts, &format!("m{name}")))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn output_is_non_decreasing(batch in arb_batch()) {
            let mut cursor = Cursor::new(None, RETENTION);
            let fresh = cursor.advance(batch);
            prop_assert!(fresh.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }

        #[test]
        fn same_batch_twice_emits_once(batch in arb_batch()) {
            let mut cursor = Cursor::new(None, RETENTION);
            let first = cursor.advance(batch.clone());
            let second = cursor.advance(batch.clone());

            prop_assert_eq!(first.len(), batch.len());
            prop_assert!(second.is_empty());
        }

        #[test]
        fn cursor_tracks_batch_maximum(batch in arb_batch()) {
            let mut cursor = Cursor::new(None, RETENTION);
            let expected = batch.iter().map(|e| e.timestamp).max().map(|max| max + 1);
            cursor.advance(batch);
            prop_assert_eq!(cursor.next_start(), expected);
        }
    }
}
