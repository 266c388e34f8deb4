//! Exchange adapters.
//!
//! One adapter per venue, all speaking the venue's public REST market-data
//! endpoints (no authentication). Adapters only know how to fetch and parse;
//! the resilient polling loop that turns them into an endless quote source
//! lives in [`stream::QuoteStream`].

pub mod bitget;
pub mod bybit;
pub mod http;
pub mod kucoin;
pub mod mexc;
pub mod okx;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::VenueError;
use crate::models::FeeSchedule;

/// One tradable instrument as listed by a venue.
#[derive(Debug, Clone)]
pub struct VenueMarket {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
}

/// One ticker row, already numeric. Zero fields mean the venue sent nothing
/// usable for that side.
#[derive(Debug, Clone)]
pub struct VenueTicker {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
}

/// Result of one ticker poll: parsed rows plus the count of rows that were
/// skipped as malformed (stream keeps going either way).
#[derive(Debug, Default)]
pub struct TickerPage {
    pub tickers: Vec<VenueTicker>,
    pub malformed: u64,
}

/// Capability set of a venue: identity, fee schedule, poll cadence, and the
/// two public REST fetches. Held by the aggregator as a trait object.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn fees(&self) -> FeeSchedule;
    fn poll_interval(&self) -> Duration;

    /// Full instrument list, used by market discovery.
    async fn fetch_markets(&self) -> Result<Vec<VenueMarket>, VenueError>;

    /// One poll of the venue-wide ticker endpoint.
    async fn poll_tickers(&self) -> Result<TickerPage, VenueError>;
}

/// Build adapters for every enabled exchange in the configuration.
pub fn build_adapters(
    settings: &Settings,
    client: &reqwest::Client,
) -> Vec<Arc<dyn ExchangeAdapter>> {
    settings
        .enabled_exchanges()
        .map(|cfg| -> Arc<dyn ExchangeAdapter> {
            let client = client.clone();
            let interval = cfg.poll_interval();
            match cfg.name.as_str() {
                "bybit" => Arc::new(bybit::BybitAdapter::new(client, interval, cfg.fee)),
                "mexc" => Arc::new(mexc::MexcAdapter::new(client, interval, cfg.fee)),
                "bitget" => Arc::new(bitget::BitgetAdapter::new(client, interval, cfg.fee)),
                "okx" => Arc::new(okx::OkxAdapter::new(client, interval, cfg.fee)),
                "kucoin" => Arc::new(kucoin::KucoinAdapter::new(client, interval, cfg.fee)),
                other => unreachable!("exchange {other} rejected at config load"),
            }
        })
        .collect()
}

/// Venue price fields arrive as strings; absent or unparsable means 0.0
/// ("no price"), which downstream code treats as absent.
pub(crate) fn parse_price(raw: &str) -> f64 {
    let p: f64 = raw.trim().parse().unwrap_or(0.0);
    if p.is_finite() && p > 0.0 {
        p
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_price_rejects_garbage() {
        assert_eq!(parse_price("60000.5"), 60000.5);
        assert_eq!(parse_price(" 1.0 "), 1.0);
        assert_eq!(parse_price(""), 0.0);
        assert_eq!(parse_price("n/a"), 0.0);
        assert_eq!(parse_price("-5"), 0.0);
        assert_eq!(parse_price("inf"), 0.0);
    }
}
