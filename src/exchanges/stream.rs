//! Resilient per-venue quote source.
//!
//! `QuoteStream` turns an [`ExchangeAdapter`] into an endless sequence of
//! normalized quotes: it polls on the adapter's cadence, maps venue symbols
//! to canonical form, filters to the watched target set, and absorbs venue
//! failures with capped exponential backoff. The stream never terminates on
//! its own; the worker that drives it decides when to stop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

use super::ExchangeAdapter;
use crate::discovery::TargetUniverse;
use crate::models::{now_ms, Quote};
use crate::store::status::StatusTracker;
use crate::symbols::SymbolMapper;

pub struct QuoteStream {
    adapter: Arc<dyn ExchangeAdapter>,
    mapper: Arc<SymbolMapper>,
    universe: Arc<TargetUniverse>,
    status: Arc<StatusTracker>,
    backoff_base: Duration,
    backoff_cap: Duration,
    backoff: Duration,
    buffer: VecDeque<Quote>,
    next_poll_at: Option<Instant>,
}

impl QuoteStream {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        mapper: Arc<SymbolMapper>,
        universe: Arc<TargetUniverse>,
        status: Arc<StatusTracker>,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            adapter,
            mapper,
            universe,
            status,
            backoff_base,
            backoff_cap,
            backoff: backoff_base,
            buffer: VecDeque::new(),
            next_poll_at: None,
        }
    }

    /// Next normalized quote, polling (and backing off) as needed. Pending
    /// only while waiting on cadence, network I/O, or backoff.
    pub async fn next_quote(&mut self) -> Quote {
        loop {
            if let Some(quote) = self.buffer.pop_front() {
                return quote;
            }

            if let Some(at) = self.next_poll_at {
                sleep_until(at).await;
            }
            self.next_poll_at = Some(Instant::now() + self.adapter.poll_interval());

            let exchange = self.adapter.name();
            match self.adapter.poll_tickers().await {
                Ok(page) => {
                    self.backoff = self.backoff_base;
                    self.status.record_success(exchange);
                    if page.malformed > 0 {
                        self.status.add_parse_failures(exchange, page.malformed);
                    }
                    self.fill_buffer(page.tickers);
                    debug!(
                        exchange,
                        quotes = self.buffer.len(),
                        malformed = page.malformed,
                        "poll complete"
                    );
                }
                Err(err) => {
                    self.status.record_error(exchange, &err.to_string());
                    warn!(
                        exchange,
                        error = %err,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "venue poll failed, backing off"
                    );
                    sleep(self.backoff).await;
                    self.backoff = (self.backoff * 2).min(self.backoff_cap);
                }
            }
        }
    }

    fn fill_buffer(&mut self, tickers: Vec<super::VenueTicker>) {
        let exchange = self.adapter.name();
        let watched = self.universe.targets(exchange);
        if watched.is_empty() {
            return;
        }

        let ts = now_ms();
        let mut unmapped = 0u64;
        for t in tickers {
            if !watched.contains(&t.symbol) {
                continue;
            }
            let Some(canonical) = self.mapper.canonical(exchange, &t.symbol) else {
                unmapped += 1;
                continue;
            };
            // A quote with no usable price on any side carries no signal.
            if t.bid <= 0.0 && t.ask <= 0.0 && t.last <= 0.0 {
                continue;
            }
            self.buffer.push_back(Quote {
                exchange: exchange.to_string(),
                venue_symbol: t.symbol,
                canonical_symbol: canonical,
                bid: t.bid,
                ask: t.ask,
                last: t.last,
                timestamp_ms: ts,
            });
        }
        if unmapped > 0 {
            self.status.add_unmapped(exchange, unmapped);
        }
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

    struct ScriptedAdapter {
        pages: Mutex<VecDeque<Result<TickerPage, VenueError>>>,
    }

    impl ScriptedAdapter {
        fn new(pages: Vec<Result<TickerPage, VenueError>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
            })
        }
    }

    #[async_trait]
    impl ExchangeAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "bybit"
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
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(TickerPage::default()))
        }
    }

    fn ticker(symbol: &str, bid: f64, ask: f64) -> VenueTicker {
        VenueTicker {
            symbol: symbol.to_string(),
            bid,
            ask,
            last: 0.0,
        }
    }

    fn fixture() -> (Arc<SymbolMapper>, Arc<TargetUniverse>, Arc<StatusTracker>) {
        let mapper = Arc::new(SymbolMapper::new());
        mapper.register_markets(
            "bybit",
            &[VenueMarket {
                symbol: "BTCUSDT".to_string(),
                base_asset: "BTC".to_string(),
                quote_asset: "USDT".to_string(),
            }],
        );
        let universe = Arc::new(TargetUniverse::new());
        universe.set(
            "bybit",
            ["BTCUSDT".to_string(), "GHOSTUSDT".to_string()]
                .into_iter()
                .collect(),
        );
        let status = Arc::new(StatusTracker::new(["bybit"]));
        (mapper, universe, status)
    }

    #[tokio::test]
    async fn normalizes_watched_quotes_and_counts_unmapped() {
        let (mapper, universe, status) = fixture();
        let adapter = ScriptedAdapter::new(vec![Ok(TickerPage {
            tickers: vec![
                ticker("BTCUSDT", 60_000.0, 60_010.0),
                // Watched but not registered with the mapper.
                ticker("GHOSTUSDT", 1.0, 2.0),
                // Not watched at all.
                ticker("ETHUSDT", 3_000.0, 3_001.0),
                // Watched, mapped, but priceless.
                ticker("BTCUSDT", 0.0, 0.0),
            ],
            malformed: 2,
        })]);

        let mut stream = QuoteStream::new(
            adapter,
            mapper,
            universe,
            status.clone(),
            Duration::from_millis(1),
            Duration::from_millis(8),
        );

        let quote = stream.next_quote().await;
        assert_eq!(quote.canonical_symbol, "BTCUSDT");
        assert_eq!(quote.exchange, "bybit");
        assert!(quote.timestamp_ms > 0);
        assert!(stream.buffer.is_empty());

        let snap = status.snapshot();
        let bybit = snap.iter().find(|s| s.name == "bybit").unwrap();
        assert!(bybit.connected);
        assert_eq!(bybit.unmapped_symbols, 1);
        assert_eq!(bybit.parse_failures, 2);
    }

    #[tokio::test]
    async fn venue_error_backs_off_and_recovers() {
        let (mapper, universe, status) = fixture();
        let adapter = ScriptedAdapter::new(vec![
            Err(VenueError::Server { status: 502 }),
            Err(VenueError::RateLimited { status: 429 }),
            Ok(TickerPage {
                tickers: vec![ticker("BTCUSDT", 60_000.0, 60_010.0)],
                malformed: 0,
            }),
        ]);

        let mut stream = QuoteStream::new(
            adapter,
            mapper,
            universe,
            status.clone(),
            Duration::from_millis(1),
            Duration::from_millis(4),
        );

        let quote = stream.next_quote().await;
        assert_eq!(quote.canonical_symbol, "BTCUSDT");

        let snap = status.snapshot();
        let bybit = snap.iter().find(|s| s.name == "bybit").unwrap();
        // Errors were recorded, then the successful poll reconnected without
        // wiping the counter.
        assert!(bybit.connected);
        assert_eq!(bybit.error_count, 2);
        assert!(bybit.last_error.is_some());
    }
}
