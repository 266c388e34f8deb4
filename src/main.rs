//! SpreadBot: cross-exchange spot arbitrage monitor.
//!
//! Wires the pipeline: exchange adapters → bounded intake → quote store →
//! evaluation engine → latest-snapshot cache → HTTP/WebSocket API, plus
//! market discovery and the optional Telegram sink. All workers observe one
//! shutdown signal; ctrl-c drains them before exit.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spreadbot_backend::aggregator::QuoteAggregator;
use spreadbot_backend::api::{create_router, AppState};
use spreadbot_backend::discovery::{MarketDiscovery, TargetUniverse};
use spreadbot_backend::engine::{ArbitrageEngine, OpportunityCache};
use spreadbot_backend::exchanges;
use spreadbot_backend::models::{FeeSchedule, WsServerEvent};
use spreadbot_backend::notify::TelegramNotifier;
use spreadbot_backend::store::{QuoteStore, StatusTracker};
use spreadbot_backend::symbols::SymbolMapper;
use spreadbot_backend::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    // The only fatal error class: bad configuration.
    let settings = Settings::from_env().context("configuration error")?;
    info!(
        exchanges = settings.exchanges.len(),
        port = settings.web.port,
        "starting spreadbot"
    );

    let client = exchanges::http::build_client().context("failed to build HTTP client")?;
    let adapters = exchanges::build_adapters(&settings, &client);
    if adapters.is_empty() {
        bail!("no exchanges enabled in configuration");
    }

    let (events_tx, _) = broadcast::channel::<WsServerEvent>(256);
    let mapper = Arc::new(SymbolMapper::new());
    let universe = Arc::new(TargetUniverse::new());
    let status = Arc::new(
        StatusTracker::new(adapters.iter().map(|a| a.name())).with_events(events_tx.clone()),
    );
    let store = Arc::new(QuoteStore::new());
    let cache = Arc::new(OpportunityCache::new());

    let fees: HashMap<String, FeeSchedule> = adapters
        .iter()
        .map(|a| (a.name().to_string(), a.fees()))
        .collect();

    // First discovery pass before any polling starts, so workers wake up
    // with a non-empty watch set.
    let discovery = MarketDiscovery::new(
        adapters.clone(),
        Arc::clone(&mapper),
        Arc::clone(&universe),
        Duration::from_secs(settings.discovery_refresh_sec),
    );
    let universe_size = discovery.refresh().await;
    info!(symbols = universe_size, "initial market discovery complete");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let aggregator = QuoteAggregator::new(
        adapters,
        mapper,
        universe,
        Arc::clone(&store),
        Arc::clone(&status),
        settings.store.clone(),
    );
    let aggregator_handle = aggregator.start(shutdown_rx.clone());

    let engine = ArbitrageEngine::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        events_tx.clone(),
        fees,
        &settings,
    );
    let engine_task = tokio::spawn(engine.run(shutdown_rx.clone()));

    let discovery_task = tokio::spawn(discovery.run(shutdown_rx.clone()));

    let notifier = TelegramNotifier::new(client.clone(), settings.telegram.clone());
    let notifier_task = tokio::spawn(notifier.run(events_tx.subscribe(), shutdown_rx.clone()));

    let state = AppState {
        cache,
        status,
        filtering: settings.filtering,
        events: events_tx,
    };
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.web.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "api listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("api server error")?;

    info!("shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
    aggregator_handle.join().await;
    let _ = engine_task.await;
    let _ = discovery_task.await;
    let _ = notifier_task.await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spreadbot_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
