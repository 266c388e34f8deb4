//! Bitget spot adapter (public v2 REST).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http, parse_price, ExchangeAdapter, TickerPage, VenueMarket, VenueTicker};
use crate::error::VenueError;
use crate::models::FeeSchedule;

const REST_BASE: &str = "https://api.bitget.com";

pub struct BitgetAdapter {
    client: Client,
    poll_interval: Duration,
    fees: FeeSchedule,
}

impl BitgetAdapter {
    pub fn new(client: Client, poll_interval: Duration, fees: FeeSchedule) -> Self {
        Self {
            client,
            poll_interval,
            fees,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    #[serde(default)]
    data: Vec<SymbolRow>,
}

#[derive(Debug, Default, Deserialize)]
struct SymbolRow {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "baseCoin")]
    base_coin: String,
    #[serde(default, rename = "quoteCoin")]
    quote_coin: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(default)]
    data: Vec<TickerRow>,
}

#[derive(Debug, Default, Deserialize)]
struct TickerRow {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "bidPr")]
    bid_pr: String,
    #[serde(default, rename = "askPr")]
    ask_pr: String,
    #[serde(default, rename = "lastPr")]
    last_pr: String,
}

#[async_trait]
impl ExchangeAdapter for BitgetAdapter {
    fn name(&self) -> &'static str {
        "bitget"
    }

    fn fees(&self) -> FeeSchedule {
        self.fees
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch_markets(&self) -> Result<Vec<VenueMarket>, VenueError> {
        let resp: SymbolsResponse = http::get_json(
            &self.client,
            &format!("{REST_BASE}/api/v2/spot/public/symbols"),
            &[],
        )
        .await?;

        Ok(resp
            .data
            .into_iter()
            .filter(|row| !row.symbol.is_empty() && row.status.eq_ignore_ascii_case("online"))
            .map(|row| VenueMarket {
                symbol: row.symbol.to_ascii_uppercase(),
                base_asset: row.base_coin.to_ascii_uppercase(),
                quote_asset: row.quote_coin.to_ascii_uppercase(),
            })
            .collect())
    }

    async fn poll_tickers(&self) -> Result<TickerPage, VenueError> {
        let resp: TickersResponse = http::get_json(
            &self.client,
            &format!("{REST_BASE}/api/v2/spot/market/tickers"),
            &[],
        )
        .await?;

        let mut page = TickerPage::default();
        for row in resp.data {
            if row.symbol.is_empty() {
                page.malformed += 1;
                continue;
            }
            page.tickers.push(VenueTicker {
                symbol: row.symbol.to_ascii_uppercase(),
                bid: parse_price(&row.bid_pr),
                ask: parse_price(&row.ask_pr),
                last: parse_price(&row.last_pr),
            });
        }
        Ok(page)
    }
}
