//! Environment-keyed configuration.
//!
//! Every option has a default; a value that is present but unparsable is the
//! one fatal error class in the system and aborts startup with a clear
//! message.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::models::FeeSchedule;

/// Exchanges enabled when `EXCHANGES` is not set.
pub const DEFAULT_EXCHANGES: &[&str] = &["bybit", "mexc", "bitget", "okx", "kucoin"];

/// Default taker/maker fractions per venue, from their public fee schedules.
/// Overridable via `{NAME}_TAKER_PCT` / `{NAME}_MAKER_PCT`.
fn default_fees(exchange: &str) -> FeeSchedule {
    let (taker_pct, maker_pct) = match exchange {
        "mexc" => (0.002, 0.002),
        "okx" => (0.0015, 0.0008),
        _ => (0.001, 0.001),
    };
    FeeSchedule {
        taker_pct,
        maker_pct,
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub name: String,
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub fee: FeeSchedule,
}

impl ExchangeSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub interval_ms: u64,
    pub trade_notional_usdt: f64,
    pub min_spread_pct: f64,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub quote_ttl_ms: i64,
    pub intake_capacity: usize,
    pub batch_size: usize,
    /// Backoff for adapter streams after a venue error.
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

/// Thresholds for the identity filter that splits same-ticker-different-asset
/// groups, plus the stability window.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FilterSettings {
    pub min_price_threshold: f64,
    pub price_diff_suspicious: f64,
    pub price_diff_threshold: f64,
    pub price_diff_aggressive: f64,
    pub price_ratio_suspicious: f64,
    pub price_ratio_threshold: f64,
    pub price_ratio_aggressive: f64,
    pub stable_window_minutes: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_price_threshold: 1e-6,
            price_diff_suspicious: 0.3,
            price_diff_threshold: 1.0,
            price_diff_aggressive: 2.0,
            price_ratio_suspicious: 1.5,
            price_ratio_threshold: 2.0,
            price_ratio_aggressive: 3.0,
            stable_window_minutes: 5.0,
        }
    }
}

impl FilterSettings {
    pub fn stable_window_ms(&self) -> i64 {
        (self.stable_window_minutes * 60_000.0) as i64
    }
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    pub notify_interval_sec: u64,
    pub min_profit_usdt: f64,
}

impl TelegramSettings {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WebSettings {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub exchanges: Vec<ExchangeSettings>,
    pub evaluation: EvaluationSettings,
    pub store: StoreSettings,
    pub filtering: FilterSettings,
    pub telegram: TelegramSettings,
    pub web: WebSettings,
    pub discovery_refresh_sec: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let names: Vec<String> = match env::var("EXCHANGES") {
            Ok(v) => v
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_EXCHANGES.iter().map(|s| s.to_string()).collect(),
        };
        if names.is_empty() {
            bail!("EXCHANGES resolved to an empty list");
        }
        for name in &names {
            if !DEFAULT_EXCHANGES.contains(&name.as_str()) {
                bail!(
                    "unknown exchange {:?} in EXCHANGES (supported: {})",
                    name,
                    DEFAULT_EXCHANGES.join(", ")
                );
            }
        }

        let mut exchanges = Vec::with_capacity(names.len());
        for name in names {
            let upper = name.to_ascii_uppercase();
            let defaults = default_fees(&name);
            exchanges.push(ExchangeSettings {
                enabled: env_parse(&format!("{upper}_ENABLED"), true)?,
                poll_interval_ms: env_parse(&format!("{upper}_POLL_INTERVAL_MS"), 1500u64)?,
                fee: FeeSchedule {
                    taker_pct: env_parse(&format!("{upper}_TAKER_PCT"), defaults.taker_pct)?,
                    maker_pct: env_parse(&format!("{upper}_MAKER_PCT"), defaults.maker_pct)?,
                },
                name,
            });
        }

        Ok(Self {
            exchanges,
            evaluation: EvaluationSettings {
                interval_ms: env_parse("EVAL_INTERVAL_MS", 1000u64)?,
                trade_notional_usdt: env_parse("TRADE_NOTIONAL_USDT", 100.0f64)?,
                min_spread_pct: env_parse("MIN_SPREAD_PCT", 0.0f64)?,
            },
            store: StoreSettings {
                quote_ttl_ms: env_parse("QUOTE_TTL_MS", 15_000i64)?,
                intake_capacity: env_parse("INTAKE_CAPACITY", 10_000usize)?,
                batch_size: env_parse("BATCH_SIZE", 100usize)?,
                backoff_base_ms: env_parse("BACKOFF_BASE_MS", 1_000u64)?,
                backoff_cap_ms: env_parse("BACKOFF_CAP_MS", 60_000u64)?,
            },
            filtering: FilterSettings {
                min_price_threshold: env_parse("MIN_PRICE_THRESHOLD", 1e-6f64)?,
                price_diff_suspicious: env_parse("PRICE_DIFF_SUSPICIOUS", 0.3f64)?,
                price_diff_threshold: env_parse("PRICE_DIFF_THRESHOLD", 1.0f64)?,
                price_diff_aggressive: env_parse("PRICE_DIFF_AGGRESSIVE", 2.0f64)?,
                price_ratio_suspicious: env_parse("PRICE_RATIO_SUSPICIOUS", 1.5f64)?,
                price_ratio_threshold: env_parse("PRICE_RATIO_THRESHOLD", 2.0f64)?,
                price_ratio_aggressive: env_parse("PRICE_RATIO_AGGRESSIVE", 3.0f64)?,
                stable_window_minutes: env_parse("STABILITY_WINDOW_MINUTES", 5.0f64)?,
            },
            telegram: TelegramSettings {
                enabled: env_parse("TELEGRAM_ENABLED", false)?,
                bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
                chat_id: env::var("TELEGRAM_CHAT_ID").unwrap_or_default(),
                notify_interval_sec: env_parse("TELEGRAM_NOTIFY_INTERVAL_SEC", 60u64)?,
                min_profit_usdt: env_parse("TELEGRAM_MIN_PROFIT_USDT", 1.0f64)?,
            },
            web: WebSettings {
                port: env_parse("PORT", 5152u16)?,
            },
            discovery_refresh_sec: env_parse("DISCOVERY_REFRESH_SEC", 300u64)?,
        })
    }

    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeSettings> {
        self.exchanges.iter().filter(|e| e.enabled)
    }
}

/// Parse `key` from the environment, defaulting when unset. A set-but-invalid
/// value is a configuration error and aborts startup.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value {raw:?} for {key}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_exchanges() {
        // Serialized env access; tests in this module share process env.
        let settings = Settings::from_env().expect("default settings must parse");
        assert_eq!(settings.exchanges.len(), 5);
        assert_eq!(settings.evaluation.interval_ms, 1000);
        assert_eq!(settings.evaluation.trade_notional_usdt, 100.0);
        assert_eq!(settings.store.quote_ttl_ms, 15_000);
        assert_eq!(settings.store.intake_capacity, 10_000);
        assert_eq!(settings.store.batch_size, 100);
        assert_eq!(settings.filtering.stable_window_minutes, 5.0);
        let okx = settings
            .exchanges
            .iter()
            .find(|e| e.name == "okx")
            .expect("okx present");
        assert_eq!(okx.fee.taker_pct, 0.0015);
    }

    #[test]
    fn invalid_value_is_fatal() {
        std::env::set_var("SPREADBOT_TEST_BAD_U64", "not-a-number");
        let res = env_parse("SPREADBOT_TEST_BAD_U64", 5u64);
        std::env::remove_var("SPREADBOT_TEST_BAD_U64");
        assert!(res.is_err());
    }

    #[test]
    fn stable_window_converts_to_ms() {
        let f = FilterSettings::default();
        assert_eq!(f.stable_window_ms(), 300_000);
    }
}
