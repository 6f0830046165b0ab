//! Start command - serves sessions until SIGINT or SIGTERM.
//!
//! Shutdown order: stop accepting requests, stop the flush and GC timers,
//! persist every cached session, close the store. The process then exits
//! with status 1.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use msm_server::{Server, ServerConfig};
use msm_session::{PersistentStore, SessionRegistry};
use msm_store::SqliteStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Database URL (overrides config)
    #[arg(long, env = "MSM_DATABASE_URL")]
    pub database_url: Option<String>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<ExitCode> {
    let mut config = ctx.config.clone();
    if let Some(port) = args.port {
        config.server_mut().port = port;
    }
    if let Some(bind) = args.bind {
        config.server_mut().bind = bind;
    }
    if let Some(url) = args.database_url {
        config.database_mut().url = url;
    }
    config.validate()?;

    if ctx.verbose {
        for source in ctx.sources.iter().filter(|s| s.loaded) {
            println!("Loaded config: {}", source.path.display());
        }
    }

    let url = config.database().url;
    let store = Arc::new(SqliteStore::from_url(&url).with_context(|| format!("opening {url}"))?);
    let registry = Arc::new(SessionRegistry::new(config.registry_config(), store.clone())?);

    let session = config.session();
    let schedules = registry.configure_gc(
        i64::try_from(session.cache_lifetime_secs).unwrap_or(i64::MAX),
        session.gc_interval_hours,
    );

    let server_section = config.server();
    let listener = TcpListener::bind(server_section.address())
        .await
        .with_context(|| format!("binding {}", server_section.address()))?;
    let local_addr = listener.local_addr()?;

    let server_config = ServerConfig::new()
        .with_bind_address(local_addr)
        .with_request_logging(server_section.request_logging);

    let shutdown = shutdown_signal();

    println!("Session store: {}", store.location());
    println!("Cookie: {}", registry.cookie_name());
    println!("Listening on http://{}", local_addr);
    println!("Press Ctrl+C to stop");

    let served = Server::new(registry.clone(), server_config)
        .run_with_shutdown(listener, shutdown)
        .await;

    schedules.stop().await;

    let report = registry.flush_all().await;
    if report.failed > 0 {
        warn!(
            persisted = report.persisted,
            failed = report.failed,
            "Some sessions could not be persisted at shutdown"
        );
    } else {
        info!(persisted = report.persisted, "Sessions persisted");
    }

    if let Err(e) = store.close() {
        error!(error = %e, "Failed to close session store");
    }

    served?;
    Ok(ExitCode::FAILURE)
}

/// Resolves on the first SIGINT or SIGTERM.
///
/// The SIGTERM handler is installed before this returns, so a signal that
/// arrives while the listener is still starting is not lost.
fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| warn!(error = %e, "Cannot listen for SIGTERM"))
        .ok();

    async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for SIGINT");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Some(mut stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = interrupt => info!("Received SIGINT, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
    }
}
