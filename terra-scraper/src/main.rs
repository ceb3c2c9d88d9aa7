//! terra-scraper - NARRPR portal scraping service
//!
//! Accepts scrape jobs over HTTP, logs in to the portal once per credential
//! set, walks the requested sections and IDs, and exports the extracted
//! records to CSV and SQLite. Progress is streamed over SSE.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use terra_common::config::{database_path, resolve_root_folder, ConfigOverrides, TomlConfig};
use terra_common::events::EventBus;
use tracing::info;
use tracing_subscriber::EnvFilter;

use terra_scraper::export::{ExportFormat, Exporter};
use terra_scraper::extractors::ExtractorRegistry;
use terra_scraper::navigator::SectionNavigator;
use terra_scraper::portal::HttpPortal;
use terra_scraper::services::{JobOrchestrator, JobRetention};
use terra_scraper::session::SessionManager;
use terra_scraper::utils::RetryPolicy;
use terra_scraper::AppState;

/// Command-line arguments for terra-scraper
#[derive(Parser, Debug)]
#[command(name = "terra-scraper")]
#[command(about = "NARRPR portal scraping service for TerraMiner")]
#[command(version)]
struct Args {
    /// Root folder for the database and default export directory
    #[arg(short, long, env = "TERRAMINER_ROOT")]
    root_folder: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5740
    #[arg(short, long, env = "TERRAMINER_BIND")]
    bind: Option<String>,

    /// Portal origin
    #[arg(long, env = "TERRAMINER_PORTAL_URL")]
    portal_url: Option<String>,

    /// Config file; defaults to the platform config locations
    #[arg(short, long, env = "TERRAMINER_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "TERRAMINER_LOG")]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind: self.bind.clone(),
            portal_url: self.portal_url.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Load configuration (defaults if no file)
    let config = TomlConfig::load(args.config.as_deref(), &args.overrides())?;

    // Initialize tracing; RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting terra-scraper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 2: Resolve and create root folder
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", root_folder.display());

    // Step 3: Open or create database
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let db_pool = terra_scraper::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    // Step 4: Scrape pipeline
    let portal = Arc::new(HttpPortal::new(&config.portal)?);
    info!("Portal: {}", portal.base_url());

    let retry = RetryPolicy::from(&config.retry);
    let sessions = SessionManager::new(portal.clone(), retry.clone(), config.portal.session_ttl())
        .with_request_timeout(config.portal.request_timeout());
    let navigator = SectionNavigator::new(portal, config.portal.request_timeout());

    let mut formats = Vec::new();
    if config.export.csv {
        formats.push(ExportFormat::Csv);
    }
    if config.export.database {
        formats.push(ExportFormat::Database);
    }
    let export_dir = config.export_directory(&root_folder);
    info!("Export directory: {}", export_dir.display());
    let exporter = Exporter::new(export_dir, Some(db_pool.clone())).with_formats(formats);

    let orchestrator = JobOrchestrator::new(
        sessions,
        navigator,
        ExtractorRegistry::with_defaults(),
        exporter,
        retry,
        event_bus.clone(),
    )
    .with_database(db_pool.clone())
    .with_retention(JobRetention::from(&config.jobs));

    let state = AppState::new(db_pool, event_bus, orchestrator.clone());
    let app = terra_scraper::build_router(state);

    // Step 5: Serve until Ctrl+C
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down: cancelling active jobs");
    orchestrator.registry().cancel_all().await;
    orchestrator.sessions().shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_become_overrides() {
        let args = Args::try_parse_from([
            "terra-scraper",
            "--root-folder",
            "/srv/terraminer",
            "--bind",
            "0.0.0.0:8080",
            "--portal-url",
            "http://localhost:9000",
        ])
        .unwrap();

        assert_eq!(args.root_folder, Some(PathBuf::from("/srv/terraminer")));
        let overrides = args.overrides();
        assert_eq!(overrides.bind.as_deref(), Some("0.0.0.0:8080"));
        assert_eq!(overrides.portal_url.as_deref(), Some("http://localhost:9000"));
    }
}
