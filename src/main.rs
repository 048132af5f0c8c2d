use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signtrack::config::Config;
use signtrack::notify::{Dispatcher, LogSink};
use signtrack::poll::PollScheduler;
use signtrack::reconcile::{Reconciler, SnapshotFetcher};
use signtrack::remote::{SigningClient, SigningService};
use signtrack::server::{build_router, AppState};
use signtrack::store::DocumentStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signtrack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let client = Arc::new(SigningClient::new(
        config.api_url.clone(),
        config.api_token.clone(),
    )?);
    let store = Arc::new(DocumentStore::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(LogSink)));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&client) as Arc<dyn SnapshotFetcher>,
        Arc::clone(&dispatcher),
    ));
    let scheduler = Arc::new(PollScheduler::new(
        Arc::clone(&reconciler),
        config.poll.clone(),
    ));

    let cancel = CancellationToken::new();
    let poll_task = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));

    let state = AppState::new(
        store,
        reconciler,
        scheduler,
        client as Arc<dyn SigningService>,
        dispatcher,
        config.webhook_secret.clone(),
        config.sandbox_default,
    );
    let app = build_router(state);

    tracing::info!(addr = %config.bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    poll_task.await?;
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    cancel.cancel();
}
