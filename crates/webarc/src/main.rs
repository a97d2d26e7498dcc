//! Content-delivery server for a web-game archive.
//!
//! Runs two listeners: the general content surface (cascade, mounts,
//! external mirrors, CGI) and the archive surface (mount management,
//! on-demand package fetch, download introspection).

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use webarc_cgi::{CgiConfig, CgiExecutor};
use webarc_fetch::{DownloadOrchestrator, DownloadRegistry, ReqwestClient};
use webarc_mount::MountTable;
use webarc_server::{
    AppState, Cascade, CascadeConfig, ContentService, ExternalFetcher, ExternalSource,
    GameContentService, content_router, game_router,
};
use webarc_store::GameDataStore;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "webarc", version, about = "Content-delivery server for a web-game archive")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "webarc.toml")]
    config: PathBuf,

    /// Override the content surface bind address.
    #[arg(long)]
    content_bind: Option<SocketAddr>,

    /// Override the archive surface bind address.
    #[arg(long)]
    archive_bind: Option<SocketAddr>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "webarc=info",
        1 => "webarc=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    let content_bind = args.content_bind.unwrap_or(config.content.bind);
    let archive_bind = args.archive_bind.unwrap_or(config.archive.bind);

    let state = build_state(&config).await?;
    let mounts = Arc::clone(&state.mounts);

    let content_listener = tokio::net::TcpListener::bind(content_bind)
        .await
        .with_context(|| format!("binding content surface to {content_bind}"))?;
    let archive_listener = tokio::net::TcpListener::bind(archive_bind)
        .await
        .with_context(|| format!("binding archive surface to {archive_bind}"))?;
    tracing::info!(%content_bind, %archive_bind, "listening");

    let content = axum::serve(content_listener, content_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let archive = axum::serve(archive_listener, game_router(state))
        .with_graceful_shutdown(shutdown_signal());

    let (content_result, archive_result) = tokio::join!(content, archive);
    content_result.context("content surface failed")?;
    archive_result.context("archive surface failed")?;

    mounts.unmount_all();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn build_state(config: &Config) -> anyhow::Result<AppState<ReqwestClient>> {
    let mounts = Arc::new(MountTable::new());
    let registry = Arc::new(DownloadRegistry::new(config.registry_grace()));
    let store = GameDataStore::open(&config.archive.db_path, &config.archive.install_root)
        .await
        .with_context(|| {
            format!("opening database at {}", config.archive.db_path.display())
        })?;

    let cascade = Cascade::new(CascadeConfig {
        htdocs_root: config.content.htdocs_root.clone(),
        overrides: config.content.overrides.clone(),
        script_root: config.content.script_root.clone(),
        script_extensions: config.content.script_extensions.clone(),
        index_files: config.content.index_files.clone(),
    });
    let external = ExternalFetcher::new(
        ReqwestClient::new().context("building HTTP client")?,
        config
            .content
            .external_sources
            .iter()
            .map(|s| ExternalSource {
                base_url: s.base_url.clone(),
                mad4fp: s.mad4fp,
            })
            .collect(),
        config.external_timeout(),
    );
    let cgi = CgiExecutor::new(CgiConfig {
        interpreter: config.cgi.interpreter.clone(),
        document_root: config.content.htdocs_root.clone(),
        script_root: config.content.script_root.clone(),
        timeout: Duration::from_secs(config.cgi.timeout_secs),
        kill_grace: Duration::from_secs(config.cgi.kill_grace_secs),
        max_stdout: config.cgi.max_stdout,
        max_stderr: config.cgi.max_stderr,
    });
    let content = Arc::new(ContentService::new(
        cascade,
        Arc::clone(&mounts),
        external,
        cgi,
    ));

    let orchestrator = DownloadOrchestrator::new(
        ReqwestClient::new().context("building HTTP client")?,
        Arc::clone(&registry),
        store.clone(),
        config.archive.install_root.join(&config.archive.content_dir),
        config.archive.staging_dir.clone(),
    )?;
    let games = Arc::new(GameContentService::new(
        store,
        Arc::clone(&registry),
        orchestrator,
        Arc::clone(&mounts),
        config.archive.package_sources.clone(),
    ));

    Ok(AppState {
        content,
        games,
        mounts,
        registry,
        cors_enabled: config.content.cors,
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
