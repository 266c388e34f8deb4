//! Quote aggregation.
//!
//! One polling worker per exchange adapter feeds a single bounded intake
//! channel; one batch processor drains it into the quote store. Backpressure
//! is expressed as loss: when the intake is full the quote is dropped and
//! counted, the adapter is never blocked. Per-adapter order is preserved end
//! to end (single worker per adapter, FIFO channel); cross-adapter
//! interleaving is unspecified.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::StoreSettings;
use crate::discovery::TargetUniverse;
use crate::exchanges::{stream::QuoteStream, ExchangeAdapter};
use crate::models::{now_ms, Quote};
use crate::store::{QuoteStore, StatusTracker};
use crate::symbols::SymbolMapper;

pub struct QuoteAggregator {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    mapper: Arc<SymbolMapper>,
    universe: Arc<TargetUniverse>,
    store: Arc<QuoteStore>,
    status: Arc<StatusTracker>,
    settings: StoreSettings,
}

pub struct AggregatorHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl AggregatorHandle {
    /// Wait for all workers to observe shutdown and finish.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl QuoteAggregator {
    pub fn new(
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        mapper: Arc<SymbolMapper>,
        universe: Arc<TargetUniverse>,
        store: Arc<QuoteStore>,
        status: Arc<StatusTracker>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            adapters,
            mapper,
            universe,
            store,
            status,
            settings,
        }
    }

    pub fn start(self, shutdown: watch::Receiver<bool>) -> AggregatorHandle {
        let (intake_tx, intake_rx) = mpsc::channel::<Arc<Quote>>(self.settings.intake_capacity);
        let mut tasks = Vec::with_capacity(self.adapters.len() + 1);

        info!(
            adapters = self.adapters.len(),
            intake_capacity = self.settings.intake_capacity,
            batch_size = self.settings.batch_size,
            "starting quote aggregator"
        );

        for adapter in &self.adapters {
            let stream = QuoteStream::new(
                Arc::clone(adapter),
                Arc::clone(&self.mapper),
                Arc::clone(&self.universe),
                Arc::clone(&self.status),
                Duration::from_millis(self.settings.backoff_base_ms),
                Duration::from_millis(self.settings.backoff_cap_ms),
            );
            tasks.push(tokio::spawn(run_worker(
                stream,
                intake_tx.clone(),
                Arc::clone(&self.status),
                shutdown.clone(),
            )));
        }
        drop(intake_tx);

        tasks.push(tokio::spawn(run_batch_processor(
            intake_rx,
            Arc::clone(&self.store),
            Arc::clone(&self.status),
            self.settings.batch_size,
            self.settings.quote_ttl_ms,
            shutdown,
        )));

        AggregatorHandle { tasks }
    }
}

/// Pull quotes from one adapter's stream and enqueue them without blocking.
pub(crate) async fn run_worker(
    mut stream: QuoteStream,
    intake: mpsc::Sender<Arc<Quote>>,
    status: Arc<StatusTracker>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            quote = stream.next_quote() => {
                let exchange = quote.exchange.clone();
                match intake.try_send(Arc::new(quote)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        status.add_dropped(&exchange, 1);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                }
            }
        }
    }
}

/// Drain the intake in bounded batches and apply them atomically, then push
/// refreshed per-exchange counts to the status tracker.
pub(crate) async fn run_batch_processor(
    mut intake: mpsc::Receiver<Arc<Quote>>,
    store: Arc<QuoteStore>,
    status: Arc<StatusTracker>,
    batch_size: usize,
    quote_ttl_ms: i64,
    mut shutdown: watch::Receiver<bool>,
) {
    let batch_size = batch_size.max(1);
    loop {
        let first = tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return;
                }
                continue;
            }
            item = intake.recv() => match item {
                Some(quote) => quote,
                None => return,
            },
        };

        let mut batch = Vec::with_capacity(batch_size);
        batch.push(first);
        while batch.len() < batch_size {
            match intake.try_recv() {
                Ok(quote) => batch.push(quote),
                Err(_) => break,
            }
        }

        apply_batch(&store, &status, batch, quote_ttl_ms);
    }
}

fn apply_batch(
    store: &QuoteStore,
    status: &StatusTracker,
    batch: Vec<Arc<Quote>>,
    quote_ttl_ms: i64,
) {
    let mut exchanges: Vec<String> = batch.iter().map(|q| q.exchange.clone()).collect();
    exchanges.sort();
    exchanges.dedup();

    let applied = store.upsert_batch(batch);
    debug!(applied, exchanges = exchanges.len(), "applied quote batch");

    let now = now_ms();
    for exchange in exchanges {
        let fresh = store.count_fresh(&exchange, now, quote_ttl_ms);
        status.set_quote_count(&exchange, fresh, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VenueError;
    use crate::exchanges::{TickerPage, VenueMarket, VenueTicker};
    use crate::models::FeeSchedule;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashSet, VecDeque};

    struct FeedAdapter {
        name: &'static str,
        pages: Mutex<VecDeque<TickerPage>>,
    }

    #[async_trait]
    impl ExchangeAdapter for FeedAdapter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn fees(&self) -> FeeSchedule {
            FeeSchedule::default()
        }
        fn poll_interval(&self) -> Duration {
            Duration::from_millis(1)
        }
        async fn fetch_markets(&self) -> Result<Vec<VenueMarket>, VenueError> {
            Ok(vec![])
        }
        async fn poll_tickers(&self) -> Result<TickerPage, VenueError> {
            Ok(self.pages.lock().pop_front().unwrap_or_default())
        }
    }

    fn fixture(
        name: &'static str,
        symbols: &[&str],
    ) -> (Arc<SymbolMapper>, Arc<TargetUniverse>, Arc<StatusTracker>) {
        let mapper = Arc::new(SymbolMapper::new());
        let markets: Vec<VenueMarket> = symbols
            .iter()
            .map(|s| VenueMarket {
                symbol: s.to_string(),
                base_asset: s.trim_end_matches("USDT").to_string(),
                quote_asset: "USDT".to_string(),
            })
            .collect();
        mapper.register_markets(name, &markets);
        // A second listing so the symbols survive the intersection rule.
        mapper.register_markets("okx", &markets);

        let universe = Arc::new(TargetUniverse::new());
        let targets: HashSet<String> = symbols.iter().map(|s| s.to_string()).collect();
        universe.set(name, targets);

        (mapper, universe, Arc::new(StatusTracker::new([name])))
    }

    fn page(symbols: &[&str], bid: f64) -> TickerPage {
        TickerPage {
            tickers: symbols
                .iter()
                .map(|s| VenueTicker {
                    symbol: s.to_string(),
                    bid,
                    ask: bid + 1.0,
                    last: 0.0,
                })
                .collect(),
            malformed: 0,
        }
    }

    fn stream_for(
        adapter: Arc<FeedAdapter>,
        mapper: Arc<SymbolMapper>,
        universe: Arc<TargetUniverse>,
        status: Arc<StatusTracker>,
    ) -> QuoteStream {
        QuoteStream::new(
            adapter,
            mapper,
            universe,
            status,
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[tokio::test]
    async fn quotes_flow_from_worker_to_store() {
        let (mapper, universe, status) = fixture("bybit", &["BTCUSDT", "ETHUSDT"]);
        let adapter = Arc::new(FeedAdapter {
            name: "bybit",
            pages: Mutex::new(VecDeque::from([page(&["BTCUSDT", "ETHUSDT"], 100.0)])),
        });
        let store = Arc::new(QuoteStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(64);

        let worker = tokio::spawn(run_worker(
            stream_for(adapter, mapper, universe, Arc::clone(&status)),
            tx,
            Arc::clone(&status),
            shutdown_rx.clone(),
        ));
        let processor = tokio::spawn(run_batch_processor(
            rx,
            Arc::clone(&store),
            Arc::clone(&status),
            100,
            15_000,
            shutdown_rx,
        ));

        // Wait for both quotes to land.
        for _ in 0..200 {
            if store.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.len(), 2);

        let bybit = &status
            .snapshot()
            .into_iter()
            .find(|s| s.name == "bybit")
            .unwrap();
        assert_eq!(bybit.quote_count, 2);
        assert!(bybit.last_update_ms > 0);

        shutdown_tx.send(true).unwrap();
        let _ = worker.await;
        let _ = processor.await;
    }

    #[tokio::test]
    async fn full_intake_drops_and_counts_without_blocking() {
        let (mapper, universe, status) = fixture("bybit", &["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        let adapter = Arc::new(FeedAdapter {
            name: "bybit",
            pages: Mutex::new(VecDeque::from([
                page(&["BTCUSDT", "ETHUSDT", "SOLUSDT"], 100.0),
            ])),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Capacity 1 and nobody draining: everything past the first quote
        // must be dropped, one count per drop.
        let (tx, _rx) = mpsc::channel(1);

        let worker = tokio::spawn(run_worker(
            stream_for(adapter, mapper, universe, Arc::clone(&status)),
            tx,
            Arc::clone(&status),
            shutdown_rx,
        ));

        for _ in 0..200 {
            if status.dropped("bybit") >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status.dropped("bybit"), 2);

        shutdown_tx.send(true).unwrap();
        let _ = worker.await;
    }

    #[tokio::test]
    async fn per_adapter_order_reaches_the_store() {
        let (_, _, status) = fixture("bybit", &["BTCUSDT"]);
        let store = Arc::new(QuoteStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(64);

        let processor = tokio::spawn(run_batch_processor(
            rx,
            Arc::clone(&store),
            Arc::clone(&status),
            10,
            60_000,
            shutdown_rx,
        ));

        for ts in 1..=50i64 {
            let quote = Quote {
                exchange: "bybit".to_string(),
                venue_symbol: "BTCUSDT".to_string(),
                canonical_symbol: "BTCUSDT".to_string(),
                bid: ts as f64,
                ask: ts as f64 + 1.0,
                last: 0.0,
                timestamp_ms: ts,
            };
            tx.send(Arc::new(quote)).await.unwrap();
        }

        for _ in 0..200 {
            if store
                .get("bybit", "BTCUSDT")
                .map(|q| q.timestamp_ms == 50)
                .unwrap_or(false)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.get("bybit", "BTCUSDT").unwrap().timestamp_ms, 50);

        shutdown_tx.send(true).unwrap();
        drop(tx);
        let _ = processor.await;
    }
}
