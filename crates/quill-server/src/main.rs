use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use quill_api::config::{Config, PLACEHOLDER_SECRETS};
use quill_api::state::{AppState, AppStateInner};
use quill_api::{jobs, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=debug,quill_api=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;
    if config.uses_local_tokens() {
        if PLACEHOLDER_SECRETS.contains(&config.auth.jwt_secret.as_str()) {
            anyhow::bail!("QUILL_JWT_SECRET is unset or still a placeholder; refusing to start");
        }
        warn!("No QUILL_AUTH_DOMAIN set, accepting locally signed tokens");
    }
    if !config.momo_strict_signature {
        warn!("MoMo IPN signature failures will be logged but not rejected");
    }

    // Init database
    let db = quill_db::Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner::new(db, config)?);
    jobs::spawn(&state);

    let app = router::build(state);

    info!("Quill server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Quill server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
