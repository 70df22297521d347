use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quota_gateway::clock::{Clock, SystemClock};
use quota_gateway::config::Args;
use quota_gateway::handlers::router;
use quota_gateway::rate_limit::{BURST_CEILING, BURST_WINDOW};
use quota_gateway::state::AppState;
use quota_gateway::store::LocalStore;

// how often expired fallback entries are reclaimed
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

// this is main async function with tokio
#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // parse cli arguments
    let args = Args::parse();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(AppState::from_args(&args, reqwest::Client::new(), clock));

    // spawn the background purge of the local store
    let local = state.stores.local().clone();
    tokio::spawn(async move {
        purge_local_store(local, PURGE_INTERVAL).await;
    });

    let app = router(state.clone());

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(port = args.port, store = state.stores.backend(), "gateway running");
    info!(
        upstream = %args.upstream_url,
        configured = state.upstream.is_configured(),
        "generation service"
    );
    info!(
        "Burst limit: {} requests per {} seconds",
        BURST_CEILING,
        BURST_WINDOW.as_secs()
    );
    if args.require_premium {
        info!("generation restricted to premium callers");
    }

    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, service).await {
        error!(error = %e, "server error");
    }
}

// Expired entries already read as absent; this only keeps memory bounded
async fn purge_local_store(store: Arc<LocalStore>, every: Duration) {
    let mut interval = interval(every);

    loop {
        interval.tick().await;
        let purged = store.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "purged expired local entries");
        }
    }
}
