//! OKX spot adapter (public v5 REST). Instrument ids are dashed
//! (`BTC-USDT`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http, parse_price, ExchangeAdapter, TickerPage, VenueMarket, VenueTicker};
use crate::error::VenueError;
use crate::models::FeeSchedule;

const REST_BASE: &str = "https://www.okx.com";

pub struct OkxAdapter {
    client: Client,
    poll_interval: Duration,
    fees: FeeSchedule,
}

impl OkxAdapter {
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
    data: Vec<InstrumentRow>,
}

#[derive(Debug, Default, Deserialize)]
struct InstrumentRow {
    #[serde(default, rename = "instId")]
    inst_id: String,
    #[serde(default, rename = "baseCcy")]
    base_ccy: String,
    #[serde(default, rename = "quoteCcy")]
    quote_ccy: String,
}

#[derive(Debug, Deserialize)]
struct TickersResponse {
    #[serde(default)]
    data: Vec<TickerRow>,
}

#[derive(Debug, Default, Deserialize)]
struct TickerRow {
    #[serde(default, rename = "instId")]
    inst_id: String,
    #[serde(default, rename = "bidPx")]
    bid_px: String,
    #[serde(default, rename = "askPx")]
    ask_px: String,
    #[serde(default)]
    last: String,
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    fn name(&self) -> &'static str {
        "okx"
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
            &format!("{REST_BASE}/api/v5/public/instruments"),
            &[("instType", "SPOT")],
        )
        .await?;

        Ok(resp
            .data
            .into_iter()
            .filter(|row| !row.inst_id.is_empty() && !row.base_ccy.is_empty())
            .map(|row| VenueMarket {
                symbol: row.inst_id.to_ascii_uppercase(),
                base_asset: row.base_ccy.to_ascii_uppercase(),
                quote_asset: row.quote_ccy.to_ascii_uppercase(),
            })
            .collect())
    }

    async fn poll_tickers(&self) -> Result<TickerPage, VenueError> {
        let resp: TickersResponse = http::get_json(
            &self.client,
            &format!("{REST_BASE}/api/v5/market/tickers"),
            &[("instType", "SPOT")],
        )
        .await?;

        let mut page = TickerPage::default();
        for row in resp.data {
            if row.inst_id.is_empty() {
                page.malformed += 1;
                continue;
            }
            page.tickers.push(VenueTicker {
                symbol: row.inst_id.to_ascii_uppercase(),
                bid: parse_price(&row.bid_px),
                ask: parse_price(&row.ask_px),
                last: parse_price(&row.last),
            });
        }
        Ok(page)
    }
}
