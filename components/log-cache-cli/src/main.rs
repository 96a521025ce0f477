use anyhow::Result;
use clap::Parser;
use log_cache_cli::{cli::cli::Cli, instrumentation};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Held for the whole process so buffered diagnostics reach stderr before exit.
    let _guard = instrumentation::tracing::init_tracing(cli.log_level.as_deref())?;
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    log_cache_cli::cli::cli::run(cli).await
}
