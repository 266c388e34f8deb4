//! Latest-quote store.
//!
//! Maps `(exchange, canonical_symbol)` to the freshest quote seen. One
//! exclusive lock; the contract that keeps readers responsive is that all
//! per-quote work happens before the lock is taken and a single write
//! acquisition covers at most one bounded batch, so a snapshot reader waits
//! for at most `batch_size` map swaps. Wrapping network I/O or opportunity
//! math in this lock is a bug.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::Quote;

type QuoteKey = (String, String);

#[derive(Default)]
pub struct QuoteStore {
    quotes: RwLock<HashMap<QuoteKey, Arc<Quote>>>,
    /// Incoming quotes dropped for carrying a strictly older timestamp than
    /// the stored entry.
    stale_writes: AtomicU64,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::with_capacity(1024)),
            stale_writes: AtomicU64::new(0),
        }
    }

    /// Apply one bounded batch under a single write-lock acquisition.
    /// Last-write-wins per key; a quote strictly older than the stored one
    /// is dropped. Returns the number of entries written.
    ///
    /// Callers bound the batch (≤ config `batch_size`); keys are prepared
    /// before the lock so the critical section is map swaps only.
    pub fn upsert_batch(&self, batch: Vec<Arc<Quote>>) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let prepared: Vec<(QuoteKey, Arc<Quote>)> = batch
            .into_iter()
            .map(|q| ((q.exchange.clone(), q.canonical_symbol.clone()), q))
            .collect();

        let mut applied = 0;
        let mut dropped = 0;
        {
            let mut quotes = self.quotes.write();
            for (key, quote) in prepared {
                match quotes.get(&key) {
                    Some(current) if quote.timestamp_ms < current.timestamp_ms => {
                        dropped += 1;
                    }
                    _ => {
                        quotes.insert(key, quote);
                        applied += 1;
                    }
                }
            }
        }
        if dropped > 0 {
            self.stale_writes.fetch_add(dropped, Ordering::Relaxed);
        }
        applied
    }

    /// Consistent point-in-time copy of the store. Readers get either the
    /// pre-batch or post-batch state of any concurrent upsert, never a
    /// partially applied one.
    pub fn snapshot(&self) -> Vec<Arc<Quote>> {
        self.quotes.read().values().cloned().collect()
    }

    /// Distinct canonical symbols with a non-stale quote for one exchange.
    pub fn count_fresh(&self, exchange: &str, now_ms: i64, ttl_ms: i64) -> usize {
        self.quotes
            .read()
            .iter()
            .filter(|((ex, _), quote)| ex == exchange && !quote.is_stale(now_ms, ttl_ms))
            .count()
    }

    pub fn get(&self, exchange: &str, canonical_symbol: &str) -> Option<Arc<Quote>> {
        self.quotes
            .read()
            .get(&(exchange.to_string(), canonical_symbol.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }

    pub fn stale_writes(&self) -> u64 {
        self.stale_writes.load(Ordering::Relaxed)
    }
}
