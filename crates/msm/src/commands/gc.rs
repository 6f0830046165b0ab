//! Gc command - delete expired session rows once and exit.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use msm_session::{PersistentStore, SessionRegistry};
use msm_store::SqliteStore;

use super::Context;

/// Arguments for the gc command.
#[derive(Args, Debug)]
pub struct GcArgs {
    /// Database URL (overrides config)
    #[arg(long, env = "MSM_DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Run the gc command.
pub async fn run(args: GcArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.config.clone();
    if let Some(url) = args.database_url {
        config.database_mut().url = url;
    }
    config.validate()?;

    let url = config.database().url;
    let store = Arc::new(SqliteStore::from_url(&url).with_context(|| format!("opening {url}"))?);
    let registry = SessionRegistry::new(config.registry_config(), store.clone())?;

    let deleted = registry.garbage_collect()?;
    store.close()?;

    tracing::info!(
        deleted,
        max_age_secs = registry.config().max_age.as_secs(),
        "Garbage collection finished"
    );
    println!("Deleted {} expired session(s)", deleted);
    Ok(())
}
