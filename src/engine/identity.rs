//! Identity filter.
//!
//! Venues sometimes list different assets under the same ticker (the
//! `ZKUSDT` vs `ZKSYNCUSDT` class of problem), which shows up as absurd
//! cross-exchange "spreads". The filter looks at the price shape of each
//! canonical group and, instead of deleting suspicious opportunities,
//! assigns them synthetic group keys so downstream display treats them as
//! separate coins. The flat ranking order is never changed here.

use std::collections::HashMap;
use std::fmt;

use crate::config::FilterSettings;
use crate::models::Opportunity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Low,
    Normal,
    High,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Low => write!(f, "low"),
            Band::Normal => write!(f, "normal"),
            Band::High => write!(f, "high"),
        }
    }
}

/// Price shape of one canonical group.
struct GroupShape {
    avg: f64,
    price_diff: f64,
    ratio: f64,
    zero_alongside_normal: bool,
    band_lo: f64,
    band_hi: f64,
}

fn shape(prices: &HashMap<String, f64>, settings: &FilterSettings) -> Option<GroupShape> {
    let positive: Vec<f64> = prices.values().copied().filter(|p| *p > 0.0).collect();
    if positive.len() < 2 {
        return None;
    }

    let min = positive.iter().copied().fold(f64::INFINITY, f64::min);
    let max = positive.iter().copied().fold(0.0f64, f64::max);
    let avg = positive.iter().sum::<f64>() / positive.len() as f64;

    let normal: Vec<f64> = positive
        .iter()
        .copied()
        .filter(|p| *p >= settings.min_price_threshold)
        .collect();
    let zero_alongside_normal = positive.len() != normal.len() && !normal.is_empty();

    let ratio = if zero_alongside_normal {
        f64::INFINITY
    } else if normal.len() >= 2 {
        let n_min = normal.iter().copied().fold(f64::INFINITY, f64::min);
        let n_max = normal.iter().copied().fold(0.0f64, f64::max);
        n_max / n_min
    } else {
        1.0
    };

    let price_diff = if avg > 0.0 { (max - min) / avg } else { 0.0 };

    // The wide bands are for groups that already tripped the aggressive
    // tier; milder evidence gets the tighter bands so it still splits.
    let (lo_mult, hi_mult) = if price_diff > settings.price_diff_aggressive
        || ratio > settings.price_ratio_aggressive
    {
        (0.5, 1.5)
    } else {
        (0.7, 1.3)
    };

    Some(GroupShape {
        avg,
        price_diff,
        ratio,
        zero_alongside_normal,
        band_lo: lo_mult * avg,
        band_hi: hi_mult * avg,
    })
}

impl GroupShape {
    fn band(&self, price: f64) -> Band {
        if price < self.band_lo {
            Band::Low
        } else if price > self.band_hi {
            Band::High
        } else {
            Band::Normal
        }
    }
}

/// Assign a group key to every opportunity of one canonical group.
///
/// `prices` holds one representative price per exchange, `bases` the venue
/// base spelling per exchange (`ZK` vs `ZKSYNC`).
pub fn assign_groups(
    symbol: &str,
    prices: &HashMap<String, f64>,
    bases: &HashMap<String, String>,
    settings: &FilterSettings,
    opportunities: &mut [Opportunity],
) {
    let Some(shape) = shape(prices, settings) else {
        for opp in opportunities.iter_mut() {
            opp.group_key = symbol.to_string();
        }
        return;
    };

    let distinct_bases = {
        let mut seen: Vec<&str> = bases.values().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len() > 1
    };

    let definitely_different = shape.ratio > 100.0 || shape.zero_alongside_normal;
    let strong_mismatch = shape.price_diff > settings.price_diff_threshold
        || (shape.ratio > settings.price_ratio_threshold && opportunities.len() >= 2);
    let suspicious = shape.price_diff > settings.price_diff_suspicious
        || shape.ratio > settings.price_ratio_suspicious;

    for opp in opportunities.iter_mut() {
        let buy_price = prices.get(&opp.buy_exchange).copied().unwrap_or(0.0);
        let sell_price = prices.get(&opp.sell_exchange).copied().unwrap_or(0.0);
        let buy_band = shape.band(buy_price);
        let sell_band = shape.band(sell_price);
        let buy_base = bases
            .get(&opp.buy_exchange)
            .map(String::as_str)
            .unwrap_or(symbol);
        let sell_base = bases
            .get(&opp.sell_exchange)
            .map(String::as_str)
            .unwrap_or(symbol);

        opp.group_key = if definitely_different {
            // Different tokens sharing a ticker; the price band is the
            // identity signal.
            if buy_band == Band::Normal && sell_band == Band::Normal {
                symbol.to_string()
            } else {
                format!("{symbol}:{buy_band}-{sell_band}")
            }
        } else if strong_mismatch {
            if buy_base != sell_base {
                format!("{symbol}:{buy_base}/{sell_base}")
            } else if buy_band != sell_band {
                format!("{symbol}:{buy_band}-{sell_band}")
            } else {
                symbol.to_string()
            }
        } else if suspicious && distinct_bases {
            if buy_base != sell_base {
                format!("{symbol}:{buy_base}/{sell_base}")
            } else {
                symbol.to_string()
            }
        } else {
            symbol.to_string()
        };
    }
}
