mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use verdant_api::AppStateInner;
use verdant_db::Database;
use verdant_gateway::IdentityResolver;
use verdant_lifecycle::{Clock, SystemClock, run_reaper_loop};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verdant=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let identity = IdentityResolver::new(config.jwt_secret.clone(), config.token_ttl);

    let state = AppStateInner::new(db.clone(), clock.clone(), identity, config.heartbeat);

    // Background reaper for expired stories and message content
    if let Some(interval) = config.reaper_interval {
        info!(
            "Reaper every {:?}, story retention {}h",
            interval,
            config.reaper_retention.num_hours()
        );
        tokio::spawn(run_reaper_loop(
            db.clone(),
            clock.clone(),
            interval,
            config.reaper_retention,
        ));
    }

    let app = verdant_api::router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Verdant server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let registry = state.registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let notified = registry.announce("server is shutting down").await;
            info!("Shutdown requested, notified {} live channels", notified);
        })
        .await?;

    Ok(())
}
