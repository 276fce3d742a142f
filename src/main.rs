use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopee_bridge::api::{ApiClient, ReqwestTransport};
use shopee_bridge::auth::TokenLifecycle;
use shopee_bridge::config::BridgeConfig;
use shopee_bridge::credential::{CredentialStore, DEFAULT_REFRESH_BUFFER_SECONDS};
use shopee_bridge::server::{AppState, build_router};
use shopee_bridge::sync::{SyncLogStore, SyncPlanner};
use shopee_bridge::types::now_epoch;
use shopee_bridge::webhook::{Coordinator, InboxStore};
use shopee_bridge::worker::{
    OrderRefreshProcessor, RETRY_SWEEP_INTERVAL, run_retry_sweep, run_worker,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopee_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let credential_store = CredentialStore::open(
        config.data_dir.join("credential.json"),
        config.initial_credential(),
    )?;
    let inbox = InboxStore::open(config.data_dir.join("inbox"))?;
    let sync_log = SyncLogStore::open(config.data_dir.join("sync-log"))?;

    let coordinator = Coordinator::new(inbox);
    // Entries stranded in `processing` by an unclean shutdown become
    // immediately due retries.
    coordinator.recover_stranded(now_epoch())?;

    let transport = ReqwestTransport::new()?;
    let client = ApiClient::new(transport, config.environment);
    let lifecycle = TokenLifecycle::new(
        client.clone(),
        credential_store.clone(),
        DEFAULT_REFRESH_BUFFER_SECONDS,
    );
    let planner = SyncPlanner::new(credential_store.clone(), sync_log);
    let processor = Arc::new(OrderRefreshProcessor::new(
        client.clone(),
        credential_store.clone(),
    ));

    let (tx, rx) = mpsc::channel(1024);
    let cancel = CancellationToken::new();

    let worker = tokio::spawn(run_worker(
        coordinator.clone(),
        processor,
        rx,
        cancel.clone(),
    ));
    let sweep = tokio::spawn(run_retry_sweep(
        coordinator.clone(),
        tx.clone(),
        RETRY_SWEEP_INTERVAL,
        cancel.clone(),
    ));

    let state = AppState::new(
        client,
        lifecycle,
        credential_store,
        coordinator,
        planner,
        tx,
        config.push_key().to_string(),
        config.public_url.clone(),
        config.redirect_url.clone(),
        config.invalid_webhook_policy,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, environment = %config.environment, "listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    let _ = worker.await;
    let _ = sweep.await;
    Ok(())
}
