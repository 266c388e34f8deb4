//! Market discovery.
//!
//! Fetches the instrument list from every adapter, registers USDT pairs with
//! the symbol mapper, and recomputes the per-exchange watch sets from the
//! ≥2-exchange intersection. Runs once at startup and then on a fixed
//! refresh interval; the watch sets are swapped in place so the polling
//! workers pick up listings changes on their next poll without restarting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::exchanges::ExchangeAdapter;
use crate::symbols::SymbolMapper;

/// Venue symbols each exchange should watch. Shared between discovery
/// (writer) and the quote streams (readers); reads are one Arc clone.
#[derive(Default)]
pub struct TargetUniverse {
    per_exchange: RwLock<HashMap<String, Arc<HashSet<String>>>>,
}

impl TargetUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, exchange: &str, targets: HashSet<String>) {
        self.per_exchange
            .write()
            .insert(exchange.to_string(), Arc::new(targets));
    }

    pub fn targets(&self, exchange: &str) -> Arc<HashSet<String>> {
        self.per_exchange
            .read()
            .get(exchange)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct MarketDiscovery {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    mapper: Arc<SymbolMapper>,
    universe: Arc<TargetUniverse>,
    refresh_interval: Duration,
}

impl MarketDiscovery {
    pub fn new(
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        mapper: Arc<SymbolMapper>,
        universe: Arc<TargetUniverse>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            adapters,
            mapper,
            universe,
            refresh_interval,
        }
    }

    /// One discovery pass. Exchanges that fail keep their previous
    /// registration; the pass never fails as a whole. Returns the size of
    /// the intersection universe.
    pub async fn refresh(&self) -> usize {
        let fetches = self
            .adapters
            .iter()
            .map(|adapter| async move { (adapter.name(), adapter.fetch_markets().await) });

        let mut fetched = 0usize;
        for (exchange, result) in join_all(fetches).await {
            match result {
                Ok(markets) => {
                    info!(exchange, markets = markets.len(), "registered markets");
                    self.mapper.register_markets(exchange, &markets);
                    fetched += 1;
                }
                Err(err) => {
                    warn!(exchange, error = %err, "market fetch failed, keeping previous listing");
                }
            }
        }

        if fetched < 2 {
            warn!(
                fetched,
                "fewer than 2 exchanges provided markets; opportunity coverage will be limited"
            );
        }

        let universe = self.mapper.intersection();
        for adapter in &self.adapters {
            let targets = self.mapper.venue_targets(adapter.name());
            self.universe.set(adapter.name(), targets);
        }
        info!(symbols = universe.len(), "target universe refreshed");
        universe.len()
    }

    /// Periodic refresh loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The startup pass already ran; skip the immediate first tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    self.refresh().await;
                }
            }
        }
    }
}
