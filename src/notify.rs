//! Telegram notifier sink.
//!
//! Output port only: subscribes to the snapshot broadcast and forwards the
//! top opportunity through the Telegram Bot HTTP API. Throttled per symbol,
//! gated on a minimum net profit, and entirely fire-and-forget: send
//! failures are logged and counted, never propagated into the pipeline.

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::TelegramSettings;
use crate::models::{Opportunity, WsServerEvent};

pub struct TelegramNotifier {
    client: Client,
    settings: TelegramSettings,
    last_sent_symbol: Option<String>,
    last_sent_at: Option<Instant>,
    send_failures: u64,
}

impl TelegramNotifier {
    pub fn new(client: Client, settings: TelegramSettings) -> Self {
        Self {
            client,
            settings,
            last_sent_symbol: None,
            last_sent_at: None,
            send_failures: 0,
        }
    }

    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<WsServerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if !self.settings.is_configured() {
            info!("telegram notifier disabled (no token/chat configured)");
            return;
        }
        info!(
            interval_sec = self.settings.notify_interval_sec,
            min_profit_usdt = self.settings.min_profit_usdt,
            "telegram notifier started"
        );

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(WsServerEvent::Opportunities(ranking)) => {
                            if let Some(top) = ranking.first() {
                                self.maybe_notify(top).await;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    }

    async fn maybe_notify(&mut self, top: &Opportunity) {
        if top.spread_usdt < self.settings.min_profit_usdt {
            return;
        }
        let interval = Duration::from_secs(self.settings.notify_interval_sec);
        let same_symbol = self.last_sent_symbol.as_deref() == Some(&top.canonical_symbol);
        let too_soon = self
            .last_sent_at
            .map(|at| at.elapsed() < interval)
            .unwrap_or(false);
        if same_symbol && too_soon {
            return;
        }

        if self.send(&format_message(top)).await {
            self.last_sent_symbol = Some(top.canonical_symbol.clone());
            self.last_sent_at = Some(Instant::now());
        }
    }

    async fn send(&mut self, text: &str) -> bool {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.settings.bot_token
        );
        let body = serde_json::json!({
            "chat_id": self.settings.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("telegram notification sent");
                true
            }
            Ok(resp) => {
                self.send_failures += 1;
                warn!(status = %resp.status(), failures = self.send_failures, "telegram rejected notification");
                false
            }
            Err(err) => {
                self.send_failures += 1;
                warn!(error = %err, failures = self.send_failures, "telegram send failed");
                false
            }
        }
    }
}

fn format_message(opp: &Opportunity) -> String {
    format!(
        "<b>{symbol}</b>{stable}\nbuy {buy_ex} @ {buy:.8}\nsell {sell_ex} @ {sell:.8}\nnet {net:.2} USDT ({pct:.3}%)",
        symbol = opp.canonical_symbol,
        stable = if opp.is_stable { " [stable]" } else { "" },
        buy_ex = opp.buy_exchange,
        buy = opp.buy_price,
        sell_ex = opp.sell_exchange,
        sell = opp.sell_price,
        net = opp.spread_usdt,
        pct = opp.spread_pct,
    )
}
