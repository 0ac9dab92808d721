use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shortnews::config::Config;
use shortnews::db::Database;
use shortnews::fetcher::{start_background_refresh, start_expiry_sweeper, FetchLimits, Fetcher};
use shortnews::routes::{self, AppState};
use shortnews::summarizer::build_summarizer;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shortnews=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("SHORTNEWS_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let mut config = Config::load(&config_path)?;
    config.apply_env()?;
    info!("Loaded {} feeds from {}", config.feeds.len(), config_path);

    // Initialize database
    let db = Database::new(config.database_url()).await?;
    db.initialize().await?;
    db.sync_feeds(&config.feeds).await?;
    info!("Database initialized");

    let db = Arc::new(db);
    let ttl = config.ttl()?;

    let summarizer = build_summarizer(&config.summarizer)?;
    let fetcher = Arc::new(Fetcher::new(
        db.clone(),
        summarizer,
        FetchLimits::from(&config),
    )?);

    // `shortnews fetch` runs a single ingestion pass, for cron-style deployments
    if std::env::args().nth(1).as_deref() == Some("fetch") {
        let purged = db.purge_expired(ttl).await?;
        info!("Purged {} expired news items", purged);
        if let Some(report) = fetcher.refresh_all_feeds().await? {
            info!("Total news fetched: {}", report.inserted);
        }
        return Ok(());
    }

    tokio::spawn(start_expiry_sweeper(db.clone(), ttl, EXPIRY_SWEEP_INTERVAL));

    if config.refresh_interval > 0 {
        let bg_fetcher = fetcher.clone();
        let refresh_interval = config.refresh_interval;
        tokio::spawn(async move {
            start_background_refresh(bg_fetcher, refresh_interval).await;
        });
    } else {
        info!("Scheduled refresh disabled, use /update to fetch feeds");
    }

    if config.admin_secret.is_none() {
        warn!("ADMIN_SECRET is not set, /update will reject every request");
    }

    let state = Arc::new(AppState {
        db: db.clone(),
        fetcher: fetcher.clone(),
        admin_secret: config.admin_secret.clone(),
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server starting on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
