//! KuCoin spot adapter (public v1 REST). Symbols are dashed (`BTC-USDT`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http, parse_price, ExchangeAdapter, TickerPage, VenueMarket, VenueTicker};
use crate::error::VenueError;
use crate::models::FeeSchedule;

const REST_BASE: &str = "https://api.kucoin.com";

pub struct KucoinAdapter {
    client: Client,
    poll_interval: Duration,
    fees: FeeSchedule,
}

impl KucoinAdapter {
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
    #[serde(default, rename = "baseCurrency")]
    base_currency: String,
    #[serde(default, rename = "quoteCurrency")]
    quote_currency: String,
    #[serde(default, rename = "enableTrading")]
    enable_trading: bool,
}

#[derive(Debug, Deserialize)]
struct AllTickersResponse {
    #[serde(default)]
    data: AllTickersData,
}

#[derive(Debug, Default, Deserialize)]
struct AllTickersData {
    #[serde(default)]
    ticker: Vec<TickerRow>,
}

// KuCoin sends null for quiet books, hence the Options.
#[derive(Debug, Default, Deserialize)]
struct TickerRow {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    buy: Option<String>,
    #[serde(default)]
    sell: Option<String>,
    #[serde(default)]
    last: Option<String>,
}

#[async_trait]
impl ExchangeAdapter for KucoinAdapter {
    fn name(&self) -> &'static str {
        "kucoin"
    }

    fn fees(&self) -> FeeSchedule {
        self.fees
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch_markets(&self) -> Result<Vec<VenueMarket>, VenueError> {
        let resp: SymbolsResponse =
            http::get_json(&self.client, &format!("{REST_BASE}/api/v1/symbols"), &[]).await?;

        Ok(resp
            .data
            .into_iter()
            .filter(|row| row.enable_trading && !row.symbol.is_empty())
            .map(|row| VenueMarket {
                symbol: row.symbol.to_ascii_uppercase(),
                base_asset: row.base_currency.to_ascii_uppercase(),
                quote_asset: row.quote_currency.to_ascii_uppercase(),
            })
            .collect())
    }

    async fn poll_tickers(&self) -> Result<TickerPage, VenueError> {
        let resp: AllTickersResponse = http::get_json(
            &self.client,
            &format!("{REST_BASE}/api/v1/market/allTickers"),
            &[],
        )
        .await?;

        let mut page = TickerPage::default();
        for row in resp.data.ticker {
            if row.symbol.is_empty() {
                page.malformed += 1;
                continue;
            }
            page.tickers.push(VenueTicker {
                symbol: row.symbol.to_ascii_uppercase(),
                bid: parse_price(row.buy.as_deref().unwrap_or("")),
                ask: parse_price(row.sell.as_deref().unwrap_or("")),
                last: parse_price(row.last.as_deref().unwrap_or("")),
            });
        }
        Ok(page)
    }
}
