//! MEXC spot adapter (public v3 REST).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http, parse_price, ExchangeAdapter, TickerPage, VenueMarket, VenueTicker};
use crate::error::VenueError;
use crate::models::FeeSchedule;

const REST_BASE: &str = "https://api.mexc.com";

pub struct MexcAdapter {
    client: Client,
    poll_interval: Duration,
    fees: FeeSchedule,
}

impl MexcAdapter {
    pub fn new(client: Client, poll_interval: Duration, fees: FeeSchedule) -> Self {
        Self {
            client,
            poll_interval,
            fees,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    #[serde(default)]
    symbols: Vec<SymbolRow>,
}

#[derive(Debug, Default, Deserialize)]
struct SymbolRow {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "baseAsset")]
    base_asset: String,
    #[serde(default, rename = "quoteAsset")]
    quote_asset: String,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "isSpotTradingAllowed")]
    is_spot_trading_allowed: bool,
}

// The 24hr ticker endpoint returns a bare JSON array.
#[derive(Debug, Default, Deserialize)]
struct TickerRow {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "bidPrice")]
    bid_price: String,
    #[serde(default, rename = "askPrice")]
    ask_price: String,
    #[serde(default, rename = "lastPrice")]
    last_price: String,
}

#[async_trait]
impl ExchangeAdapter for MexcAdapter {
    fn name(&self) -> &'static str {
        "mexc"
    }

    fn fees(&self) -> FeeSchedule {
        self.fees
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch_markets(&self) -> Result<Vec<VenueMarket>, VenueError> {
        let info: ExchangeInfo = http::get_json(
            &self.client,
            &format!("{REST_BASE}/api/v3/exchangeInfo"),
            &[],
        )
        .await?;

        Ok(info
            .symbols
            .into_iter()
            // MEXC reports status "1" for tradable spot symbols.
            .filter(|row| {
                row.is_spot_trading_allowed
                    && (row.status == "1" || row.status.eq_ignore_ascii_case("ENABLED"))
                    && !row.symbol.is_empty()
            })
            .map(|row| VenueMarket {
                symbol: row.symbol.to_ascii_uppercase(),
                base_asset: row.base_asset.to_ascii_uppercase(),
                quote_asset: row.quote_asset.to_ascii_uppercase(),
            })
            .collect())
    }

    async fn poll_tickers(&self) -> Result<TickerPage, VenueError> {
        let rows: Vec<TickerRow> = http::get_json(
            &self.client,
            &format!("{REST_BASE}/api/v3/ticker/24hr"),
            &[],
        )
        .await?;

        let mut page = TickerPage::default();
        for row in rows {
            if row.symbol.is_empty() {
                page.malformed += 1;
                continue;
            }
            page.tickers.push(VenueTicker {
                symbol: row.symbol.to_ascii_uppercase(),
                bid: parse_price(&row.bid_price),
                ask: parse_price(&row.ask_price),
                last: parse_price(&row.last_price),
            });
        }
        Ok(page)
    }
}
