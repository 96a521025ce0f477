//! `meta`: one table row per source held in Log Cache.
//!
//! Rows come in three groups: sources with a name known to the inventory API (sorted by
//! name), unnamed ids that look like GUIDs, then platform components.

// Local crates
use crate::client::client::{LogCacheClient, ReadRequest};
use crate::client::error::ClientError;
use crate::client::names::{NameResolver, NamedSource};
use crate::helpers::duration::format_nanos;
use crate::meta::table::Table;
use crate::parser::models::{Nanos, SourceMeta};

// External crates
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::instrument;

#[allow(clippy::expect_used)]
static GUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("GUID pattern is valid")
});

/// Window the Rate column counts envelopes over.
const RATE_WINDOW: Nanos = 60 * 1_000_000_000;
const RATE_LIMIT: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Scope {
    #[default]
    All,
    Platform,
    Applications,
}

impl Scope {
    fn includes_applications(self) -> bool {
        matches!(self, Scope::All | Scope::Applications)
    }

    fn includes_platform(self) -> bool {
        matches!(self, Scope::All | Scope::Platform)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaOptions {
    pub scope: Scope,
    /// Add a Rate column: envelopes emitted over the last minute
    pub noise: bool,
    /// Add a leading Source ID column
    pub show_guid: bool,
    pub headers: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to write to output: {0}")]
    SinkWrite(#[source] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Row {
    pub source_id: String,
    pub name: String,
    pub meta: SourceMeta,
}

#[derive(Debug)]
pub struct MetaCommand {
    client: LogCacheClient,
    names: NameResolver,
    options: MetaOptions,
}

impl MetaCommand {
    pub fn new(client: LogCacheClient, names: NameResolver, options: MetaOptions) -> Self {
        Self {
            client,
            names,
            options,
        }
    }

    /// Write the table to `sink` and return the number of rows.
    #[instrument(
        name = "meta_command::run",
        target = "meta::meta::MetaCommand",
        skip_all,
        fields(scope = ?self.options.scope),
        level = "debug"
    )]
    pub async fn run<W>(&self, sink: &mut W) -> Result<usize, MetaError>
    where
        W: AsyncWrite + Unpin,
    {
        let meta = self.client.meta().await?;
        if meta.is_empty() {
            tracing::debug!("Log Cache holds no sources");
            return Ok(0);
        }

        let ids: Vec<String> = meta.keys().cloned().collect();
        let named = self.names.resolve(&ids).await?;
        let rows = arrange_rows(meta, named, self.options.scope);

        let mut table = Table::new();
        if self.options.headers {
            table.push_row(self.header());
        }
        for row in &rows {
            let rate = if self.options.noise {
                Some(self.rate(&row.source_id).await?)
            } else {
                None
            };
            table.push_row(self.cells(row, rate));
        }

        let mut out = String::new();
        if self.options.headers {
            out.push_str("Retrieving log cache metadata...\n\n");
        }
        out.push_str(&table.render());

        sink.write_all(out.as_bytes()).await.map_err(MetaError::SinkWrite)?;
        sink.flush().await.map_err(MetaError::SinkWrite)?;
        Ok(rows.len())
    }

    fn header(&self) -> Vec<&'static str> {
        let mut header = Vec::with_capacity(6);
        if self.options.show_guid {
            header.push("Source ID");
        }
        header.extend(["Source", "Count", "Expired", "Cache Duration"]);
        if self.options.noise {
            header.push("Rate");
        }
        header
    }

    fn cells(&self, row: &Row, rate: Option<usize>) -> Vec<String> {
        let mut cells = Vec::with_capacity(6);
        if self.options.show_guid {
            cells.push(row.source_id.clone());
        }
        cells.push(row.name.clone());
        cells.push(row.meta.count.to_string());
        cells.push(row.meta.expired.to_string());
        cells.push(format_nanos(row.meta.cache_duration_nanos()));
        if let Some(rate) = rate {
            cells.push(rate.to_string());
        }
        cells
    }

    async fn rate(&self, source_id: &str) -> Result<usize, ClientError> {
        let end = Utc::now().timestamp_nanos_opt().unwrap_or(Nanos::MAX);
        let request = ReadRequest {
            source_id: source_id.to_string(),
            start_time: Some(end - RATE_WINDOW),
            end_time: Some(end),
            limit: Some(RATE_LIMIT),
            ..ReadRequest::default()
        };
        Ok(self.client.read(&request).await?.len())
    }
}

pub(crate) fn arrange_rows(
    mut meta: BTreeMap<String, SourceMeta>,
    mut named: Vec<NamedSource>,
    scope: Scope,
) -> Vec<Row> {
    named.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.guid.cmp(&b.guid)));

    let mut rows = Vec::with_capacity(meta.len());
    for source in named {
        // A source is listed once, even if the inventory reports it twice.
        let Some(stats) = meta.remove(&source.guid) else {
            continue;
        };
        if scope.includes_applications() {
            rows.push(Row {
                source_id: source.guid,
                name: source.name,
                meta: stats,
            });
        }
    }

    let (guids, platform): (Vec<_>, Vec<_>) =
        meta.into_iter().partition(|(id, _)| GUID_PATTERN.is_match(id));

    let unnamed = |(id, stats): (String, SourceMeta)| Row {
        name: id.clone(),
        source_id: id,
        meta: stats,
    };
    if scope.includes_applications() {
        rows.extend(guids.into_iter().map(unnamed));
    }
    if scope.includes_platform() {
        rows.extend(platform.into_iter().map(unnamed));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const APP_GUID: &str = "7c0d6a6e-2a0f-4b1d-9d1a-3f2b1c0e9a11";
    const ORPHAN_GUID: &str = "0a0b0c0d-0e0f-4a1b-8c2d-3e4f5a6b7c8d";

    fn stats(count: u64) -> SourceMeta {
        SourceMeta {
            count,
            expired: 0,
            oldest_timestamp: 0,
            newest_timestamp: 1_500_000_000,
        }
    }

    fn meta() -> BTreeMap<String, SourceMeta> {
        [
            ("doppler".to_string(), stats(1)),
            (APP_GUID.to_string(), stats(2)),
            (ORPHAN_GUID.to_string(), stats(3)),
            ("cc-uploader".to_string(), stats(4)),
            ("svc-guid".to_string(), stats(5)),
        ]
        .into_iter()
        .collect()
    }

    fn named() -> Vec<NamedSource> {
        vec![
            NamedSource { guid: APP_GUID.into(), name: "zeta-app".into() },
            NamedSource { guid: "svc-guid".into(), name: "alpha-db".into() },
        ]
    }

    fn names(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn all_scope_orders_named_then_guids_then_platform() {
        let rows = arrange_rows(meta(), named(), Scope::All);
        assert_eq!(
            names(&rows),
            vec!["alpha-db", "zeta-app", ORPHAN_GUID, "cc-uploader", "doppler"]
        );
    }

    #[test]
    fn applications_scope_drops_platform() {
        let rows = arrange_rows(meta(), named(), Scope::Applications);
        assert_eq!(names(&rows), vec!["alpha-db", "zeta-app", ORPHAN_GUID]);
    }

    #[test]
    fn platform_scope_keeps_only_unnamed_non_guids() {
        let rows = arrange_rows(meta(), named(), Scope::Platform);
        assert_eq!(names(&rows), vec!["cc-uploader", "doppler"]);
    }

    #[test]
    fn names_without_meta_are_ignored() {
        let mut extra = named();
        extra.push(NamedSource { guid: "gone".into(), name: "gone-app".into() });
        extra.push(NamedSource { guid: APP_GUID.into(), name: "zeta-app".into() });

        let rows = arrange_rows(meta(), extra, Scope::Applications);
        assert_eq!(names(&rows), vec!["alpha-db", "zeta-app", ORPHAN_GUID]);
    }
}
