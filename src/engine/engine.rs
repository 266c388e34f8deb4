//! Periodic arbitrage evaluation.
//!
//! Each tick takes a store snapshot, drops stale quotes, computes every
//! ordered exchange pair per canonical symbol net of taker fees on the
//! configured notional, tags identity groups and stability, sorts, and
//! publishes the result: an atomic pointer swap into the latest-snapshot
//! cache, then a broadcast push. No lock is held across the push.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::{identity, StabilityTracker};
use crate::config::{EvaluationSettings, FilterSettings, Settings};
use crate::models::{
    now_ms, FeeSchedule, Opportunity, OpportunityGroup, OpportunitySnapshot, Quote, WsServerEvent,
};
use crate::store::QuoteStore;
use crate::symbols::venue_base;

/// Holder of the latest published snapshot. Readers load the current `Arc`;
/// the engine replaces it in a single swap.
pub struct OpportunityCache {
    latest: ArcSwap<OpportunitySnapshot>,
}

impl Default for OpportunityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OpportunityCache {
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(OpportunitySnapshot::default()),
        }
    }

    pub fn get_latest(&self) -> Arc<OpportunitySnapshot> {
        self.latest.load_full()
    }

    pub fn store(&self, snapshot: Arc<OpportunitySnapshot>) {
        self.latest.store(snapshot);
    }
}

pub struct ArbitrageEngine {
    store: Arc<QuoteStore>,
    cache: Arc<OpportunityCache>,
    events: broadcast::Sender<WsServerEvent>,
    fees: HashMap<String, FeeSchedule>,
    evaluation: EvaluationSettings,
    filtering: FilterSettings,
    quote_ttl_ms: i64,
    stability: StabilityTracker,
    eval_errors: u64,
}

impl ArbitrageEngine {
    pub fn new(
        store: Arc<QuoteStore>,
        cache: Arc<OpportunityCache>,
        events: broadcast::Sender<WsServerEvent>,
        fees: HashMap<String, FeeSchedule>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            cache,
            events,
            fees,
            evaluation: settings.evaluation.clone(),
            filtering: settings.filtering,
            quote_ttl_ms: settings.store.quote_ttl_ms,
            stability: StabilityTracker::new(settings.filtering.stable_window_ms()),
            eval_errors: 0,
        }
    }

    /// Evaluation tick loop. An overrunning tick fires the next one
    /// immediately; further missed ticks are skipped, not queued.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.evaluation.interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = self.evaluation.interval_ms,
            notional_usdt = self.evaluation.trade_notional_usdt,
            "starting arbitrage engine"
        );

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = Arc::new(self.evaluate_once(now_ms()));
                    let ranking = snapshot.opportunities.clone();
                    self.cache.store(snapshot);
                    // Push after the swap; a lagging subscriber just misses
                    // this snapshot.
                    let _ = self.events.send(WsServerEvent::Opportunities(ranking));
                }
            }
        }
    }

    /// One full evaluation pass over the current store contents.
    pub fn evaluate_once(&mut self, now_ms: i64) -> OpportunitySnapshot {
        let quotes = self.store.snapshot();
        let total = quotes.len();

        let mut by_symbol: HashMap<String, Vec<Arc<Quote>>> = HashMap::new();
        for quote in quotes {
            if quote.is_stale(now_ms, self.quote_ttl_ms) {
                continue;
            }
            by_symbol
                .entry(quote.canonical_symbol.clone())
                .or_default()
                .push(quote);
        }

        let mut opportunities = Vec::new();
        for (symbol, symbol_quotes) in &by_symbol {
            if symbol_quotes.len() < 2 {
                continue;
            }
            match self.evaluate_symbol(symbol, symbol_quotes, now_ms) {
                Some(mut opps) => opportunities.append(&mut opps),
                None => {
                    self.eval_errors += 1;
                    warn!(symbol = %symbol, "skipping symbol after arithmetic anomaly");
                }
            }
        }
        self.stability.evict_idle(now_ms);

        opportunities.sort_by(|a, b| {
            b.spread_usdt
                .partial_cmp(&a.spread_usdt)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.spread_pct
                        .partial_cmp(&a.spread_pct)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.canonical_symbol.cmp(&b.canonical_symbol))
        });

        debug!(
            quotes = total,
            symbols = by_symbol.len(),
            opportunities = opportunities.len(),
            "evaluation tick complete"
        );

        let groups = group_in_order(&opportunities);
        OpportunitySnapshot {
            opportunities,
            groups,
            generated_at_ms: now_ms,
        }
    }

    /// All ordered exchange pairs for one symbol. `None` marks an arithmetic
    /// anomaly; the caller skips the symbol and the tick continues.
    fn evaluate_symbol(
        &mut self,
        symbol: &str,
        quotes: &[Arc<Quote>],
        now_ms: i64,
    ) -> Option<Vec<Opportunity>> {
        let mut prices: HashMap<String, f64> = HashMap::new();
        let mut bases: HashMap<String, String> = HashMap::new();
        for quote in quotes {
            prices.insert(quote.exchange.clone(), quote.buy_price());
            bases.insert(quote.exchange.clone(), venue_base(&quote.venue_symbol));
        }

        let notional = self.evaluation.trade_notional_usdt;
        let mut opportunities = Vec::new();

        for buy_quote in quotes {
            let buy_price = buy_quote.buy_price();
            if buy_price <= 0.0 {
                continue;
            }
            for sell_quote in quotes {
                if buy_quote.exchange == sell_quote.exchange {
                    continue;
                }
                let sell_price = sell_quote.sell_price();
                if sell_price <= 0.0 {
                    continue;
                }

                let qty = notional / buy_price;
                let gross_profit = qty * (sell_price - buy_price);
                let buy_fee_rate = self.taker(&buy_quote.exchange);
                let sell_fee_rate = self.taker(&sell_quote.exchange);
                let buy_fee = qty * buy_price * buy_fee_rate;
                let sell_fee = qty * sell_price * sell_fee_rate;
                let total_fees = buy_fee + sell_fee;
                let net = gross_profit - total_fees;
                let spread_pct = (sell_price - buy_price) / buy_price * 100.0;

                if !qty.is_finite() || !net.is_finite() || !spread_pct.is_finite() {
                    return None;
                }

                let net_spread_pct = net / notional * 100.0;
                self.stability.record(
                    symbol,
                    &buy_quote.exchange,
                    &sell_quote.exchange,
                    now_ms,
                    net_spread_pct,
                );

                if net <= 0.0 || spread_pct < self.evaluation.min_spread_pct {
                    continue;
                }

                let is_stable = self.stability.is_stable(
                    symbol,
                    &buy_quote.exchange,
                    &sell_quote.exchange,
                    now_ms,
                );

                opportunities.push(Opportunity {
                    canonical_symbol: symbol.to_string(),
                    buy_exchange: buy_quote.exchange.clone(),
                    buy_venue_symbol: buy_quote.venue_symbol.clone(),
                    buy_price,
                    buy_fee_pct: buy_fee_rate * 100.0,
                    sell_exchange: sell_quote.exchange.clone(),
                    sell_venue_symbol: sell_quote.venue_symbol.clone(),
                    sell_price,
                    sell_fee_pct: sell_fee_rate * 100.0,
                    gross_profit_usdt: gross_profit,
                    total_fees_usdt: total_fees,
                    spread_usdt: net,
                    spread_pct,
                    timestamp_ms: now_ms,
                    is_stable,
                    group_key: symbol.to_string(),
                });
            }
        }

        identity::assign_groups(symbol, &prices, &bases, &self.filtering, &mut opportunities);
        Some(opportunities)
    }

    fn taker(&self, exchange: &str) -> f64 {
        self.fees
            .get(exchange)
            .map(|f| f.taker_pct)
            .unwrap_or_else(|| FeeSchedule::default().taker_pct)
    }

    pub fn eval_errors(&self) -> u64 {
        self.eval_errors
    }
}

/// Group opportunities by identity key, preserving flat-sort order both for
/// the group sequence and within each group.
fn group_in_order(opportunities: &[Opportunity]) -> Vec<OpportunityGroup> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<OpportunityGroup> = Vec::new();
    for opp in opportunities {
        match index.get(opp.group_key.as_str()) {
            Some(&i) => groups[i].opportunities.push(opp.clone()),
            None => {
                index.insert(opp.group_key.as_str(), groups.len());
                groups.push(OpportunityGroup {
                    key: opp.group_key.clone(),
                    canonical_symbol: opp.canonical_symbol.clone(),
                    opportunities: vec![opp.clone()],
                });
            }
        }
    }
    groups
}
