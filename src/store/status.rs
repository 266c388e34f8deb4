//! Per-exchange health tracking.
//!
//! Small mutable records behind their own short-held lock, deliberately
//! separate from the quote store's lock. Connected-flag transitions are
//! pushed to WebSocket subscribers so the UI can flip to "servers
//! unavailable" from status counts alone.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{ExchangeStatus, WsServerEvent};

pub struct StatusTracker {
    inner: Mutex<HashMap<String, ExchangeStatus>>,
    events: Option<broadcast::Sender<WsServerEvent>>,
}

impl StatusTracker {
    pub fn new<I, S>(exchanges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = exchanges
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), ExchangeStatus::new(name))
            })
            .collect();
        Self {
            inner: Mutex::new(inner),
            events: None,
        }
    }

    /// Broadcast connected-flag transitions on this channel.
    pub fn with_events(mut self, events: broadcast::Sender<WsServerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// A poll round-trip succeeded. Reconnects the exchange; the error
    /// counter is retained as history. The heartbeat (`last_update_ms`) is
    /// owned by the batch processor so an empty poll leaves it untouched.
    pub fn record_success(&self, exchange: &str) {
        let changed = {
            let mut inner = self.inner.lock();
            let status = entry(&mut inner, exchange);
            let changed = !status.connected;
            status.connected = true;
            changed
        };
        if changed {
            debug!(exchange, "exchange connected");
            self.emit_status();
        }
    }

    pub fn record_error(&self, exchange: &str, error: &str) {
        let changed = {
            let mut inner = self.inner.lock();
            let status = entry(&mut inner, exchange);
            let changed = status.connected;
            status.connected = false;
            status.error_count += 1;
            status.last_error = Some(error.to_string());
            changed
        };
        if changed {
            debug!(exchange, error, "exchange disconnected");
            self.emit_status();
        }
    }

    /// Pushed by the batch processor after each applied batch.
    pub fn set_quote_count(&self, exchange: &str, quote_count: usize, now_ms: i64) {
        let mut inner = self.inner.lock();
        let status = entry(&mut inner, exchange);
        status.quote_count = quote_count;
        status.last_update_ms = now_ms;
    }

    pub fn add_parse_failures(&self, exchange: &str, n: u64) {
        let mut inner = self.inner.lock();
        entry(&mut inner, exchange).parse_failures += n;
    }

    pub fn add_unmapped(&self, exchange: &str, n: u64) {
        let mut inner = self.inner.lock();
        entry(&mut inner, exchange).unmapped_symbols += n;
    }

    pub fn add_dropped(&self, exchange: &str, n: u64) {
        let mut inner = self.inner.lock();
        entry(&mut inner, exchange).dropped_quotes += n;
    }

    pub fn dropped(&self, exchange: &str) -> u64 {
        self.inner
            .lock()
            .get(exchange)
            .map(|s| s.dropped_quotes)
            .unwrap_or(0)
    }

    /// Owned copy of all statuses, sorted by exchange name.
    pub fn snapshot(&self) -> Vec<ExchangeStatus> {
        let mut statuses: Vec<ExchangeStatus> = self.inner.lock().values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn connected_count(&self) -> usize {
        self.inner.lock().values().filter(|s| s.connected).count()
    }

    fn emit_status(&self) {
        if let Some(events) = &self.events {
            let _ = events.send(WsServerEvent::Status(self.snapshot()));
        }
    }
}

fn entry<'a>(
    inner: &'a mut HashMap<String, ExchangeStatus>,
    exchange: &str,
) -> &'a mut ExchangeStatus {
    inner
        .entry(exchange.to_string())
        .or_insert_with(|| ExchangeStatus::new(exchange))
}
