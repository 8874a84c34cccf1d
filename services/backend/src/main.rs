use tracing_subscriber::{fmt, EnvFilter};
use tracing::{info, warn};
mod config;
mod controllers;
mod error;
mod models;
mod routers;
use config::{Mode, ServerConfig};
use controllers::tools;
use routers::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins; otherwise the mode picks the level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Mode::from_env().default_log_level().into()));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = ServerConfig::from_env()?;
    if config.mode == Mode::Prod {
        info!("Running in production mode");
    }

    if let Err(e) = tools::ensure_ytdlp(&config).await {
        warn!("yt-dlp bootstrap failed: {:#}", e);
    }
    for tool in tools::probe_all(&config).await {
        match (tool.available, tool.version.as_deref()) {
            (true, Some(version)) => info!("{} found at {} (version {})", tool.name, tool.path, version),
            (true, None) => info!("{} found at {}", tool.name, tool.path),
            (false, _) => warn!("{} is not available at {}; jobs will fail until it is installed", tool.name, tool.path),
        }
    }

    tokio::fs::create_dir_all(&config.workspace_root).await?;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let backend_url = config.backend_url.clone();
    let workspace_root = config.workspace_root.clone();

    let app = app(AppState::new(config));

    info!("🎬 Clip backend listening on {}", backend_url);
    info!("📂 Workspaces under {}", workspace_root.display());
    info!("✂️  Endpoints: POST /trim /merge /extract-audio /speed /add-music");

    axum::serve(listener, app).await?;
    Ok(())
}
