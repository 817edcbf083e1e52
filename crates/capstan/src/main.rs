mod cli;
mod settings;

use anyhow::Context;
use capstan_core::{Mirror, MirrorSession};
use capstan_fetch::ReqwestClient;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::settings::ConfigFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = ConfigFile::load(cli.config.as_deref())?;
    let config = settings::resolve(&cli, &file)?;

    init_logging(
        config.log_level,
        settings::verbosity_is_explicit(&cli, &file),
    );

    let client = ReqwestClient::new(config.timeout).context("cannot set up HTTP client")?;
    let mut session = MirrorSession::new(config, client)?;
    let changes = sync(&mut session).await?;
    info!("mirror update complete: {changes} file(s) changed");
    Ok(())
}

/// Drive any engine satisfying the mirror capability; the session type
/// is chosen here, at the injection seam, not at the call site.
async fn sync<M: Mirror>(mirror: &mut M) -> capstan_core::Result<u32> {
    mirror.update_mirror().await
}

fn init_logging(level: capstan_core::LogLevel, explicit: bool) {
    // A verbosity chosen by flag or config file wins; otherwise RUST_LOG
    // may pick the filter, with the default level as fallback.
    let filter = if explicit {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
