//! Core data model shared across the ingestion and evaluation pipeline.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since epoch.
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Latest top-of-book view of one pair on one venue.
///
/// Immutable once constructed; the store swaps whole `Arc<Quote>` values.
/// A zero `bid`/`ask`/`last` means "absent" and must never be used as a
/// price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub exchange: String,
    pub venue_symbol: String,
    pub canonical_symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    /// Ingestion time (wall clock, ms).
    pub timestamp_ms: i64,
}

impl Quote {
    /// Buy-side effective price: ask, falling back to last, then bid.
    /// Returns 0.0 when no usable price exists.
    pub fn buy_price(&self) -> f64 {
        first_positive(&[self.ask, self.last, self.bid])
    }

    /// Sell-side effective price: bid, falling back to last, then ask.
    pub fn sell_price(&self) -> f64 {
        first_positive(&[self.bid, self.last, self.ask])
    }

    pub fn is_stale(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.timestamp_ms > ttl_ms
    }
}

fn first_positive(candidates: &[f64]) -> f64 {
    candidates
        .iter()
        .copied()
        .find(|p| *p > 0.0 && p.is_finite())
        .unwrap_or(0.0)
}

/// Trading fee schedule for one exchange, as fractions (0.001 = 0.1%).
/// The evaluation engine always uses the taker side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub taker_pct: f64,
    pub maker_pct: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            taker_pct: 0.001,
            maker_pct: 0.001,
        }
    }
}

/// Per-exchange health record maintained by the StatusTracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeStatus {
    pub name: String,
    pub connected: bool,
    pub last_update_ms: i64,
    /// Distinct canonical symbols with a non-stale quote in the store.
    pub quote_count: usize,
    pub error_count: u64,
    pub last_error: Option<String>,
    /// Ticker rows that failed to parse (stream keeps going).
    pub parse_failures: u64,
    /// Quotes dropped because the venue symbol had no canonical mapping.
    pub unmapped_symbols: u64,
    /// Quotes dropped because the intake channel was full.
    pub dropped_quotes: u64,
}

impl ExchangeStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: false,
            last_update_ms: 0,
            quote_count: 0,
            error_count: 0,
            last_error: None,
            parse_failures: 0,
            unmapped_symbols: 0,
            dropped_quotes: 0,
        }
    }
}

/// A buy-low/sell-high pair across two venues for one canonical symbol,
/// computed on the configured notional and net of taker fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub canonical_symbol: String,
    pub buy_exchange: String,
    pub buy_venue_symbol: String,
    pub buy_price: f64,
    /// Taker fee on the buy side, as a percentage (0.1 = 0.1%).
    pub buy_fee_pct: f64,
    pub sell_exchange: String,
    pub sell_venue_symbol: String,
    pub sell_price: f64,
    pub sell_fee_pct: f64,
    pub gross_profit_usdt: f64,
    pub total_fees_usdt: f64,
    /// Net profit on the notional, after fees.
    pub spread_usdt: f64,
    pub spread_pct: f64,
    pub timestamp_ms: i64,
    pub is_stable: bool,
    /// Identity-filter group; equals `canonical_symbol` unless the group
    /// was split into synthetic coins.
    pub group_key: String,
}

/// Opportunities sharing one identity-filter group key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityGroup {
    pub key: String,
    pub canonical_symbol: String,
    pub opportunities: Vec<Opportunity>,
}

/// Point-in-time result of one evaluation tick. Replaced wholesale; readers
/// hold the previous `Arc` until they drop it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunitySnapshot {
    /// Flat ranking, non-increasing by `spread_usdt`.
    pub opportunities: Vec<Opportunity>,
    /// Same opportunities grouped by identity-filter key, in flat-sort order.
    pub groups: Vec<OpportunityGroup>,
    pub generated_at_ms: i64,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WsServerEvent {
    /// Full opportunity ranking from the latest evaluation tick.
    Opportunities(Vec<Opportunity>),
    /// Exchange health payload, emitted on connected-flag transitions.
    Status(Vec<ExchangeStatus>),
}
