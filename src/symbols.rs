//! Symbol identity across venues.
//!
//! Canonical form is uppercase `BASEUSDT` with no separator. Venues spell the
//! same pair as `BTCUSDT` (bybit, mexc, bitget) or `BTC-USDT` (okx, kucoin);
//! the mapper keeps the bidirectional association per exchange, built from
//! the instrument lists registered by market discovery plus a small override
//! table for venue symbols whose spelling does not follow their own rule.
//!
//! Symbols that canonicalize identically but trade different underlying
//! assets are NOT resolved here; the engine's identity filter splits those
//! downstream.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;

use crate::exchanges::VenueMarket;

/// Venue spellings whose canonical form is not derivable from base+quote.
/// `(exchange, venue_symbol) -> canonical_symbol`.
fn builtin_overrides() -> Vec<(&'static str, &'static str, &'static str)> {
    // bitget lists zkSync as ZKSYNCUSDT while everyone else uses ZKUSDT.
    vec![("bitget", "ZKSYNCUSDT", "ZKUSDT")]
}

#[derive(Default)]
struct MapperInner {
    /// (exchange, venue_symbol) -> canonical
    to_canonical: HashMap<(String, String), String>,
    /// (exchange, canonical) -> venue_symbol
    to_venue: HashMap<(String, String), String>,
    /// canonical -> exchanges listing it
    listings: HashMap<String, HashSet<String>>,
}

pub struct SymbolMapper {
    overrides: HashMap<(String, String), String>,
    reverse_overrides: HashMap<(String, String), String>,
    inner: RwLock<MapperInner>,
}

impl Default for SymbolMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolMapper {
    pub fn new() -> Self {
        Self::with_overrides(
            builtin_overrides()
                .into_iter()
                .map(|(e, v, c)| (e.to_string(), v.to_string(), c.to_string()))
                .collect(),
        )
    }

    pub fn with_overrides(entries: Vec<(String, String, String)>) -> Self {
        let mut overrides = HashMap::new();
        let mut reverse_overrides = HashMap::new();
        for (exchange, venue, canonical) in entries {
            let exchange = exchange.to_ascii_lowercase();
            let venue = venue.to_ascii_uppercase();
            let canonical = canonical.to_ascii_uppercase();
            reverse_overrides.insert((exchange.clone(), canonical.clone()), venue.clone());
            overrides.insert((exchange, venue), canonical);
        }
        Self {
            overrides,
            reverse_overrides,
            inner: RwLock::new(MapperInner::default()),
        }
    }

    /// Replace the registered instrument list for one exchange. Only
    /// USDT-quoted markets are retained.
    pub fn register_markets(&self, exchange: &str, markets: &[VenueMarket]) {
        let exchange = exchange.to_ascii_lowercase();
        let mut inner = self.inner.write();

        inner
            .to_canonical
            .retain(|(ex, _), _| ex != exchange.as_str());
        inner.to_venue.retain(|(ex, _), _| ex != exchange.as_str());
        for listed in inner.listings.values_mut() {
            listed.remove(exchange.as_str());
        }
        inner.listings.retain(|_, listed| !listed.is_empty());

        for market in markets {
            if !market.quote_asset.eq_ignore_ascii_case("USDT") {
                continue;
            }
            let venue = market.symbol.to_ascii_uppercase();
            if venue.is_empty() || market.base_asset.is_empty() {
                continue;
            }
            let canonical = self
                .overrides
                .get(&(exchange.clone(), venue.clone()))
                .cloned()
                .unwrap_or_else(|| {
                    format!(
                        "{}{}",
                        market.base_asset.to_ascii_uppercase(),
                        market.quote_asset.to_ascii_uppercase()
                    )
                });

            inner
                .to_canonical
                .insert((exchange.clone(), venue.clone()), canonical.clone());
            inner
                .to_venue
                .insert((exchange.clone(), canonical.clone()), venue);
            inner
                .listings
                .entry(canonical)
                .or_default()
                .insert(exchange.clone());
        }
    }

    /// Canonical symbol for a venue spelling, if known.
    pub fn canonical(&self, exchange: &str, venue_symbol: &str) -> Option<String> {
        let key = (
            exchange.to_ascii_lowercase(),
            venue_symbol.to_ascii_uppercase(),
        );
        if let Some(c) = self.overrides.get(&key) {
            return Some(c.clone());
        }
        self.inner.read().to_canonical.get(&key).cloned()
    }

    /// Venue spelling of a canonical symbol on one exchange, if listed there.
    pub fn venue(&self, exchange: &str, canonical_symbol: &str) -> Option<String> {
        let key = (
            exchange.to_ascii_lowercase(),
            canonical_symbol.to_ascii_uppercase(),
        );
        if let Some(v) = self.inner.read().to_venue.get(&key) {
            return Some(v.clone());
        }
        self.reverse_overrides.get(&key).cloned()
    }

    /// Canonical symbols tradable on at least two registered exchanges; the
    /// target universe handed to the adapters.
    pub fn intersection(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .listings
            .iter()
            .filter(|(_, listed)| listed.len() >= 2)
            .map(|(canonical, _)| canonical.clone())
            .collect()
    }

    /// Venue symbols on `exchange` whose canonical form is in the
    /// intersection universe.
    pub fn venue_targets(&self, exchange: &str) -> HashSet<String> {
        let exchange = exchange.to_ascii_lowercase();
        let inner = self.inner.read();
        let mut targets = HashSet::new();
        for ((ex, venue), canonical) in inner.to_canonical.iter() {
            if ex != &exchange {
                continue;
            }
            let listed_widely = inner
                .listings
                .get(canonical)
                .map(|listed| listed.len() >= 2)
                .unwrap_or(false);
            if listed_widely {
                targets.insert(venue.clone());
            }
        }
        targets
    }
}

/// Base portion of a venue spelling, used by the identity filter to tell
/// `ZKUSDT` from `ZKSYNCUSDT` when they share a canonical group.
pub fn venue_base(venue_symbol: &str) -> String {
    let s = venue_symbol.to_ascii_uppercase();
    for suffix in ["-USDT", "_USDT", "/USDT", "USDT"] {
        if let Some(base) = s.strip_suffix(suffix) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(symbol: &str, base: &str, quote: &str) -> VenueMarket {
        VenueMarket {
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
        }
    }

    fn mapper_with_universe() -> SymbolMapper {
        let mapper = SymbolMapper::new();
        mapper.register_markets(
            "bybit",
            &[
                market("BTCUSDT", "BTC", "USDT"),
                market("ETHUSDT", "ETH", "USDT"),
                market("ONLYBYBITUSDT", "ONLYBYBIT", "USDT"),
                market("ETHBTC", "ETH", "BTC"),
            ],
        );
        mapper.register_markets(
            "kucoin",
            &[
                market("BTC-USDT", "BTC", "USDT"),
                market("ETH-USDT", "ETH", "USDT"),
            ],
        );
        mapper.register_markets("bitget", &[market("ZKSYNCUSDT", "ZKSYNC", "USDT")]);
        mapper.register_markets("okx", &[market("ZK-USDT", "ZK", "USDT")]);
        mapper
    }

    #[test]
    fn round_trip_for_every_mapped_symbol() {
        let mapper = mapper_with_universe();
        for (exchange, venue) in [
            ("bybit", "BTCUSDT"),
            ("kucoin", "BTC-USDT"),
            ("kucoin", "ETH-USDT"),
            ("bitget", "ZKSYNCUSDT"),
            ("okx", "ZK-USDT"),
        ] {
            let canonical = mapper.canonical(exchange, venue).expect("mapped");
            assert_eq!(
                mapper.venue(exchange, &canonical).as_deref(),
                Some(venue),
                "round trip failed for {exchange}:{venue}"
            );
        }
    }

    #[test]
    fn override_canonicalizes_zksync() {
        let mapper = mapper_with_universe();
        assert_eq!(
            mapper.canonical("bitget", "ZKSYNCUSDT").as_deref(),
            Some("ZKUSDT")
        );
        assert_eq!(
            mapper.canonical("okx", "ZK-USDT").as_deref(),
            Some("ZKUSDT")
        );
    }

    #[test]
    fn intersection_requires_two_exchanges() {
        let mapper = mapper_with_universe();
        let universe = mapper.intersection();
        assert!(universe.contains("BTCUSDT"));
        assert!(universe.contains("ETHUSDT"));
        // Listed on one venue only.
        assert!(!universe.contains("ONLYBYBITUSDT"));
        // ZKUSDT listed on bitget (via override) and okx.
        assert!(universe.contains("ZKUSDT"));
    }

    #[test]
    fn non_usdt_markets_are_ignored() {
        let mapper = mapper_with_universe();
        assert!(mapper.canonical("bybit", "ETHBTC").is_none());
    }

    #[test]
    fn reregistration_replaces_previous_listing() {
        let mapper = mapper_with_universe();
        mapper.register_markets("kucoin", &[market("ETH-USDT", "ETH", "USDT")]);
        let universe = mapper.intersection();
        assert!(!universe.contains("BTCUSDT"));
        assert!(universe.contains("ETHUSDT"));
    }

    #[test]
    fn venue_targets_follow_intersection() {
        let mapper = mapper_with_universe();
        let targets = mapper.venue_targets("kucoin");
        assert!(targets.contains("BTC-USDT"));
        assert!(targets.contains("ETH-USDT"));
        let targets = mapper.venue_targets("bybit");
        assert!(!targets.contains("ONLYBYBITUSDT"));
    }

    #[test]
    fn venue_base_strips_quote_suffixes() {
        assert_eq!(venue_base("ZKSYNCUSDT"), "ZKSYNC");
        assert_eq!(venue_base("ZK-USDT"), "ZK");
        assert_eq!(venue_base("GAME_USDT"), "GAME");
        assert_eq!(venue_base("GAME/USDT"), "GAME");
    }
}
