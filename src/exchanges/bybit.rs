//! Bybit spot adapter (public v5 REST, no authentication).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http, parse_price, ExchangeAdapter, TickerPage, VenueMarket, VenueTicker};
use crate::error::VenueError;
use crate::models::FeeSchedule;

const REST_BASE: &str = "https://api.bybit.com";

pub struct BybitAdapter {
    client: Client,
    poll_interval: Duration,
    fees: FeeSchedule,
}

impl BybitAdapter {
    pub fn new(client: Client, poll_interval: Duration, fees: FeeSchedule) -> Self {
        Self {
            client,
            poll_interval,
            fees,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    #[serde(default)]
    result: InstrumentsResult,
}

#[derive(Debug, Default, Deserialize)]
struct InstrumentsResult {
    #[serde(default)]
    list: Vec<InstrumentRow>,
}

#[derive(Debug, Default, Deserialize)]
struct InstrumentRow {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "baseCoin")]
    base_coin: String,
    #[serde(default, rename = "quoteCoin")]
    quote_coin: String,
}

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(default)]
    result: TickersResult,
}

#[derive(Debug, Default, Deserialize)]
struct TickersResult {
    #[serde(default)]
    list: Vec<TickerRow>,
}

#[derive(Debug, Default, Deserialize)]
struct TickerRow {
    #[serde(default)]
    symbol: String,
    #[serde(default, rename = "bid1Price")]
    bid1_price: String,
    #[serde(default, rename = "ask1Price")]
    ask1_price: String,
    #[serde(default, rename = "lastPrice")]
    last_price: String,
}

#[async_trait]
impl ExchangeAdapter for BybitAdapter {
    fn name(&self) -> &'static str {
        "bybit"
    }

    fn fees(&self) -> FeeSchedule {
        self.fees
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn fetch_markets(&self) -> Result<Vec<VenueMarket>, VenueError> {
        let resp: InstrumentsResponse = http::get_json(
            &self.client,
            &format!("{REST_BASE}/v5/market/instruments-info"),
            &[("category", "spot")],
        )
        .await?;

        Ok(resp
            .result
            .list
            .into_iter()
            .filter(|row| !row.symbol.is_empty() && !row.base_coin.is_empty())
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
            &format!("{REST_BASE}/v5/market/tickers"),
            &[("category", "spot")],
        )
        .await?;

        let mut page = TickerPage::default();
        for row in resp.result.list {
            if row.symbol.is_empty() {
                page.malformed += 1;
                continue;
            }
            page.tickers.push(VenueTicker {
                symbol: row.symbol.to_ascii_uppercase(),
                bid: parse_price(&row.bid1_price),
                ask: parse_price(&row.ask1_price),
                last: parse_price(&row.last_price),
            });
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_payload_parses() {
        let raw = r#"{
            "retCode": 0,
            "result": {
                "category": "spot",
                "list": [
                    {"symbol": "BTCUSDT", "bid1Price": "60000", "ask1Price": "60010", "lastPrice": "60005"},
                    {"symbol": "", "bid1Price": "1"},
                    {"symbol": "ETHUSDT", "bid1Price": "", "ask1Price": "bogus", "lastPrice": "3000"}
                ]
            }
        }"#;
        let resp: TickersResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.result.list.len(), 3);
        assert_eq!(parse_price(&resp.result.list[0].bid1_price), 60000.0);
        // Missing fields default to empty strings, not parse errors.
        assert_eq!(parse_price(&resp.result.list[1].ask1_price), 0.0);
        assert_eq!(parse_price(&resp.result.list[2].ask1_price), 0.0);
    }
}
