// Local crates
use crate::{
    cli::cli::{MetaArgs, TailArgs},
    client::{
        client::{ClientConfig, LogCacheClient},
        names::NameResolver,
    },
    helpers::{load_config::Config, shutdown::Shutdown},
    meta::meta::{MetaCommand, MetaOptions},
    tailer::{models::TailOptions, tailer::TailEngine},
};

// External crates
use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// `tail` runtime: resolve configuration, wire the engine to stdout and run it until it
/// completes or is cancelled.
#[instrument(name = "runtime::tail", target = "runtime::runtime", skip_all, level = "debug")]
pub async fn run_tail(config_path: Option<&Path>, args: TailArgs) -> Result<()> {
    let cfg = Config::load(config_path)?;
    let client_config = client_config(&cfg, cfg.log_cache_addr()?, args.timeout_ms)?;
    let client = LogCacheClient::new(&client_config).context("Failed to set up Log Cache client")?;

    let options = tail_options(&cfg, &args, std::io::stdout().is_terminal());
    info!(source_id = %options.source_id, follow = options.follow, "Starting tail");

    // Initialize cancellation: interrupt always, deadline when asked for
    let shutdown = Shutdown::new();
    shutdown.listen_for_interrupt();
    if let Some(ms) = args.deadline_ms {
        shutdown.trigger_after(Duration::from_millis(ms));
    }

    let mut engine = TailEngine::new(client, tokio::io::stdout(), options, shutdown.token());
    let outcome = engine.run().await;

    // Release the background listeners whatever the outcome
    shutdown.trigger();

    let summary = outcome?;
    tracing::debug!(?summary, "Tail complete");
    Ok(())
}

/// `meta` runtime: one Log Cache meta request plus batched name resolution.
#[instrument(name = "runtime::meta", target = "runtime::runtime", skip_all, level = "debug")]
pub async fn run_meta(config_path: Option<&Path>, args: MetaArgs) -> Result<()> {
    let cfg = Config::load(config_path)?;

    let client = LogCacheClient::new(&client_config(&cfg, cfg.log_cache_addr()?, args.timeout_ms)?)
        .context("Failed to set up Log Cache client")?;
    let names = NameResolver::new(
        &client_config(&cfg, cfg.inventory_addr()?, args.timeout_ms)?,
        cfg.meta.batch_size,
    )
    .context("Failed to set up inventory client")?;

    let options = MetaOptions {
        scope: args.scope,
        noise: args.noise,
        show_guid: args.guid,
        headers: !args.no_headers && std::io::stdout().is_terminal(),
    };

    let mut stdout = tokio::io::stdout();
    let rows = MetaCommand::new(client, names, options)
        .run(&mut stdout)
        .await
        .context("Failed to read Meta information")?;

    tracing::debug!(rows, "Meta complete");
    Ok(())
}

fn client_config(cfg: &Config, addr: String, timeout_ms: Option<u64>) -> Result<ClientConfig> {
    Ok(ClientConfig {
        addr,
        token: cfg.auth_token()?,
        timeout: timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| cfg.request_timeout()),
    })
}

/// Flags win over configuration; headers only go to a terminal.
pub(crate) fn tail_options(cfg: &Config, args: &TailArgs, stdout_is_terminal: bool) -> TailOptions {
    TailOptions {
        source_id: args.source_id.clone(),
        follow: args.follow,
        headers: !args.no_headers && stdout_is_terminal,
        lines: args.lines.unwrap_or(cfg.tail.lines),
        start_time: args.start_time,
        envelope_types: args.envelope_types.clone(),
        poll_interval: Duration::from_millis(args.poll_interval_ms.unwrap_or(cfg.tail.poll_interval_ms)),
        retention: Duration::from_millis(cfg.tail.retention_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::models::EnvelopeType;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::load_with_env(None, Some(env)).unwrap()
    }

    fn args() -> TailArgs {
        TailArgs {
            source_id: "app".into(),
            follow: false,
            no_headers: false,
            timeout_ms: None,
            lines: None,
            start_time: None,
            envelope_types: Vec::new(),
            poll_interval_ms: None,
            deadline_ms: None,
        }
    }

    #[test]
    fn tail_options_fall_back_to_config() {
        let cfg = config(&[("LOG_CACHE_TAIL__LINES", "7"), ("LOG_CACHE_TAIL__POLL_INTERVAL_MS", "40")]);
        let opts = tail_options(&cfg, &args(), true);

        assert_eq!(opts.lines, 7);
        assert_eq!(opts.poll_interval, Duration::from_millis(40));
        assert_eq!(opts.retention, Duration::from_secs(1));
        assert!(opts.headers);
    }

    #[test]
    fn flags_override_config() {
        let cfg = config(&[("LOG_CACHE_TAIL__LINES", "7")]);
        let args = TailArgs {
            lines: Some(3),
            poll_interval_ms: Some(10),
            envelope_types: vec![EnvelopeType::Counter],
            follow: true,
            ..args()
        };
        let opts = tail_options(&cfg, &args, true);

        assert_eq!(opts.lines, 3);
        assert_eq!(opts.poll_interval, Duration::from_millis(10));
        assert_eq!(opts.envelope_types, vec![EnvelopeType::Counter]);
        assert!(opts.follow);
    }

    #[test]
    fn headers_need_a_terminal_and_no_flag() {
        let cfg = config(&[]);
        assert!(!tail_options(&cfg, &args(), false).headers);

        let quiet = TailArgs {
            no_headers: true,
            ..args()
        };
        assert!(!tail_options(&cfg, &quiet, true).headers);
    }

    #[test]
    fn client_timeout_flag_wins() {
        let cfg = config(&[("LOG_CACHE_SKIP_AUTH", "true"), ("LOG_CACHE_TIMEOUT_MS", "900")]);

        let from_cfg = client_config(&cfg, "http://lc".into(), None).unwrap();
        assert_eq!(from_cfg.timeout, Duration::from_millis(900));
        assert_eq!(from_cfg.token, None);

        let from_flag = client_config(&cfg, "http://lc".into(), Some(5)).unwrap();
        assert_eq!(from_flag.timeout, Duration::from_millis(5));
    }

    #[test]
    fn missing_token_is_an_error() {
        let cfg = config(&[]);
        assert!(client_config(&cfg, "http://lc".into(), None).is_err());
    }
}
