//! Maps one [`Envelope`] to one line of text.
//!
//! ```text
//! 2018-02-21T23:47:43.10+0000 [app-name/0] LOG/ERR log body
//! 2018-02-21T23:47:43.10+0000 [app-name/0] COUNTER some-name:99
//! 2018-02-21T23:47:43.10+0000 [app-name/0] GAUGE some-name:99.000000 my-unit
//! ```

// Local crates
use crate::helpers::duration::format_nanos;
use crate::parser::models::{Envelope, Nanos, Payload};

// External crates
use chrono::{DateTime, Local, TimeZone, Timelike};
use std::fmt::{Display, Write};

#[derive(Debug, Clone)]
pub struct Renderer<Tz: TimeZone> {
    tz: Tz,
}

impl Renderer<Local> {
    /// Timestamps rendered in the host's local time zone.
    pub fn local() -> Self {
        Self { tz: Local }
    }
}

impl<Tz> Renderer<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Render `envelope` without a trailing newline.
    pub fn render(&self, envelope: &Envelope) -> String {
        let mut line = format!(
            "{} [{}/{}] {}",
            self.format_timestamp(envelope.timestamp),
            envelope.source_id,
            envelope.instance_id,
            envelope.payload.tag()
        );

        match &envelope.payload {
            Payload::Log { body, level } => {
                let text = String::from_utf8_lossy(body);
                let _ = write!(line, "/{level} {}", text.trim_end_matches(['\n', '\r']));
            }
            Payload::Counter { name, total } => {
                let _ = write!(line, " {name}:{total}");
            }
            Payload::Gauge { metrics } => {
                for (name, metric) in metrics {
                    let _ = write!(line, " {name}:{:.6} {}", metric.value, metric.unit);
                }
            }
            Payload::Timer { start, stop, .. } => {
                let _ = write!(line, " {}", format_nanos(stop.saturating_sub(*start)));
            }
            Payload::Event { title, body } => {
                let _ = write!(line, " {title}:{body}");
            }
            Payload::Unknown { tags } => {
                for (key, value) in tags {
                    let _ = write!(line, " {key}:{value:?}");
                }
            }
        }

        line
    }

    /// `2006-01-02T15:04:05.00-0700` layout: centisecond precision, truncated.
    pub fn format_timestamp(&self, timestamp: Nanos) -> String {
        let instant = DateTime::from_timestamp_nanos(timestamp).with_timezone(&self.tz);
        let centis = (instant.nanosecond() / 10_000_000).min(99);
        format!(
            "{}.{:02}{}",
            instant.format("%Y-%m-%dT%H:%M:%S"),
            centis,
            instant.format("%z")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::{GaugeValue, LogLevel};
    use bytes::Bytes;
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    const TS: &str = "1970-01-01T00:00:00.00+0000";

    fn envelope(payload: Payload) -> Envelope {
        Envelope::new("app-name", "0", 1, payload)
    }

    fn render(payload: Payload) -> String {
        Renderer::new(Utc).render(&envelope(payload))
    }

    #[test]
    fn log_line() {
        let line = render(Payload::Log {
            body: Bytes::from_static(b"log body\n"),
            level: LogLevel::Err,
        });
        assert_eq!(line, format!("{TS} [app-name/0] LOG/ERR log body"));

        let line = render(Payload::Log {
            body: Bytes::from_static(b"log body"),
            level: LogLevel::Out,
        });
        assert_eq!(line, format!("{TS} [app-name/0] LOG/OUT log body"));
    }

    #[test]
    fn log_with_invalid_utf8_still_renders() {
        let line = render(Payload::Log {
            body: Bytes::from_static(b"bad \xff byte\r\n"),
            level: LogLevel::Out,
        });
        assert_eq!(line, format!("{TS} [app-name/0] LOG/OUT bad \u{fffd} byte"));
    }

    #[test]
    fn counter_line() {
        let line = render(Payload::Counter { name: "some-name".into(), total: 99 });
        assert_eq!(line, format!("{TS} [app-name/0] COUNTER some-name:99"));
    }

    #[test]
    fn gauge_line_lists_metrics_by_name() {
        let metrics = BTreeMap::from([
            (
                "some-other-name".to_string(),
                GaugeValue { value: 101.0, unit: "my-unit".into() },
            ),
            (
                "some-name".to_string(),
                GaugeValue { value: 99.0, unit: "my-unit".into() },
            ),
        ]);

        let line = render(Payload::Gauge { metrics });
        assert_eq!(
            line,
            format!("{TS} [app-name/0] GAUGE some-name:99.000000 my-unit some-other-name:101.000000 my-unit")
        );
    }

    #[test]
    fn timer_line_shows_duration() {
        let line = render(Payload::Timer {
            name: "http".into(),
            start: 1_000_000_001,
            stop: 2_000_000_001,
        });
        assert_eq!(line, format!("{TS} [app-name/0] TIMER 1s"));
    }

    #[test]
    fn event_line() {
        let line = render(Payload::Event {
            title: "some-title".into(),
            body: "some-body".into(),
        });
        assert_eq!(line, format!("{TS} [app-name/0] EVENT some-title:some-body"));
    }

    #[test]
    fn unknown_line_lists_quoted_tags_in_key_order() {
        let tags = BTreeMap::from([
            ("zone".to_string(), "z1".to_string()),
            ("foo".to_string(), "bar".to_string()),
        ]);

        let line = render(Payload::Unknown { tags });
        assert_eq!(line, format!(r#"{TS} [app-name/0] UNKNOWN foo:"bar" zone:"z1""#));

        let line = render(Payload::Unknown { tags: BTreeMap::new() });
        assert_eq!(line, format!("{TS} [app-name/0] UNKNOWN"));
    }

    #[test]
    fn timestamp_keeps_centiseconds_and_offset() {
        let renderer = Renderer::new(Utc);
        assert_eq!(
            renderer.format_timestamp(1_519_256_863_109_999_999),
            "2018-02-21T23:47:43.10+0000"
        );

        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            Renderer::new(east).format_timestamp(0),
            "1970-01-01T02:00:00.00+0200"
        );
    }

    #[test]
    fn negative_timestamps_render() {
        assert_eq!(
            Renderer::new(Utc).format_timestamp(-10_000_000),
            "1969-12-31T23:59:59.99+0000"
        );
    }
}
