mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tipjar_api::authenticator::SWEEP_INTERVAL;
use tipjar_api::{AppState, AppStateInner, DonationLedger, NonceAuthenticator};
use tipjar_chain::{ChainClient, PaymentVerifier, RelayPolicy, RpcChainClient, TransactionRelay};
use tipjar_gateway::OverlayHub;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tipjar=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(tipjar_db::Database::open(&config.db_path)?);

    // Chain access
    let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(&config.rpc_url, config.rpc_timeout)?);
    match config.treasury {
        Some(treasury) => info!("Treasury wallet {}", treasury),
        None => warn!("TIPJAR_TREASURY_WALLET is unset; donations will be refused"),
    }

    // Shared state
    let hub = OverlayHub::new(config.overlay_key.clone());
    let authenticator = NonceAuthenticator::new();
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        session_ttl: config.session_ttl,
        authenticator: authenticator.clone(),
        relay: TransactionRelay::new(chain.clone(), config.treasury, RelayPolicy::default()),
        verifier: PaymentVerifier::new(chain, config.treasury),
        ledger: DonationLedger::new(db, hub.clone()),
        hub,
    });

    // Background challenge expiry
    let shutdown = CancellationToken::new();
    let sweeper = authenticator.spawn_sweeper(SWEEP_INTERVAL, shutdown.clone());

    let app = tipjar_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Tipjar server listening on {} (rpc {})", addr, config.rpc_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Challenge sweeper ended abnormally: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
