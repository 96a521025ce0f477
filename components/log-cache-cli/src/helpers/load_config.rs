// External crates
use anyhow::{Context, Result, bail};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Environment variables starting with this prefix override file and default settings,
/// e.g. `LOG_CACHE_ADDR` or `LOG_CACHE_TAIL__POLL_INTERVAL_MS`.
pub const ENV_PREFIX: &str = "LOG_CACHE";

const REDACTED: &str = "<redacted>";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Log Cache endpoint, e.g. `https://log-cache.sys.example.com`
    #[serde(default)]
    pub addr: Option<String>,
    /// Inventory API endpoint used for source name resolution
    #[serde(default)]
    pub api_addr: Option<String>,
    pub skip_auth: bool,
    #[serde(default)]
    pub token: Option<String>,
    pub timeout_ms: u64,
    pub tail: TailConfig,
    pub meta: MetaConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TailConfig {
    pub poll_interval_ms: u64,
    pub lines: u32,
    pub retention_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetaConfig {
    pub batch_size: usize,
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`Config::load`], but reads overrides from `env` instead of the process
    /// environment when it is provided.
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("skip_auth", false)?
            .set_default("timeout_ms", 5_000_i64)?
            .set_default("tail.poll_interval_ms", 250_i64)?
            .set_default("tail.lines", 10_i64)?
            .set_default("tail.retention_ms", 1_000_i64)?
            .set_default("meta.batch_size", 50_i64)?;

        if let Some(path) = path {
            tracing::trace!(
                configuration_file_path = %path.display(),
                "Adding configuration file source"
            );
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);
        if env.is_some() {
            environment = environment.source(env);
        }
        builder = builder.add_source(environment);

        let config: Config = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        tracing::trace!(?config.addr, ?config.api_addr, "Configuration loaded successfully");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        if self.tail.poll_interval_ms == 0 {
            bail!("tail.poll_interval_ms must be greater than zero");
        }
        if self.tail.lines == 0 {
            bail!("tail.lines must be greater than zero");
        }
        if self.meta.batch_size == 0 {
            bail!("meta.batch_size must be greater than zero");
        }
        Ok(())
    }

    /// Resolve the Log Cache endpoint, deriving it from the API endpoint when it is not
    /// set explicitly.
    pub fn log_cache_addr(&self) -> Result<String> {
        if let Some(addr) = self.addr.as_deref().filter(|a| !a.trim().is_empty()) {
            return Ok(addr.trim_end_matches('/').to_string());
        }

        match self.api_addr.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(api) => Ok(api.replacen("api", "log-cache", 1).trim_end_matches('/').to_string()),
            None => bail!(
                "Could not determine Log Cache endpoint: set {ENV_PREFIX}_ADDR or {ENV_PREFIX}_API_ADDR"
            ),
        }
    }

    pub fn inventory_addr(&self) -> Result<String> {
        self.api_addr
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .map(|a| a.trim_end_matches('/').to_string())
            .with_context(|| format!("Could not determine API endpoint: set {ENV_PREFIX}_API_ADDR"))
    }

    /// The value attached as `Authorization` header, `None` when authentication is skipped.
    pub fn auth_token(&self) -> Result<Option<String>> {
        if self.skip_auth {
            return Ok(None);
        }

        match self.token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => Ok(Some(token.to_string())),
            None => bail!(
                "Unable to get access token: set {ENV_PREFIX}_TOKEN or {ENV_PREFIX}_SKIP_AUTH=true"
            ),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Copy safe to print, with the access token masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.token.is_some() {
            copy.token = Some(REDACTED.to_string());
        }
        copy
    }
}
