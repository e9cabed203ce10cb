use std::time::Duration;

use crate::{Error, Result, TradingMode};

pub const DEFAULT_STRATEGY_CONFIG_PATH: &str = "config/strategies.toml";

/// Process configuration loaded from environment variables at startup.
///
/// Validated once in `from_env`; a bad value is an `Error::Config` and the
/// binary refuses to start.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,

    // Exchange credentials (live mode only)
    pub binance_api_key: String,
    pub binance_secret: String,

    /// Asset whose balance sizes positions, e.g. "USDT".
    pub quote_asset: String,
    pub poll_interval: Duration,

    // Paper trading
    pub paper_balance: f64,
    pub paper_slippage_bps: f64,

    pub strategy_config_path: String,
}

impl Config {
    /// Load from the environment. Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        load_dotenv();

        let trading_mode = match optional_env("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let (binance_api_key, binance_secret) = match trading_mode {
            TradingMode::Live => (required_env("BINANCE_API_KEY")?, required_env("BINANCE_SECRET")?),
            TradingMode::Paper => (
                optional_env("BINANCE_API_KEY").unwrap_or_default(),
                optional_env("BINANCE_SECRET").unwrap_or_default(),
            ),
        };

        let poll_secs: u64 = parsed_env("POLL_INTERVAL_SECS", 300)?;
        if poll_secs == 0 {
            return Err(Error::Config("POLL_INTERVAL_SECS must be > 0".into()));
        }

        let paper_balance: f64 = parsed_env("PAPER_BALANCE", 10_000.0)?;
        if !(paper_balance.is_finite() && paper_balance >= 0.0) {
            return Err(Error::Config(format!(
                "PAPER_BALANCE must be a non-negative number, got {paper_balance}"
            )));
        }

        let paper_slippage_bps: f64 = parsed_env("PAPER_SLIPPAGE_BPS", 10.0)?;
        if !(paper_slippage_bps.is_finite() && paper_slippage_bps >= 0.0) {
            return Err(Error::Config(format!(
                "PAPER_SLIPPAGE_BPS must be a non-negative number, got {paper_slippage_bps}"
            )));
        }

        Ok(Config {
            trading_mode,
            binance_api_key,
            binance_secret,
            quote_asset: optional_env("QUOTE_ASSET").unwrap_or_else(|| "USDT".to_string()),
            poll_interval: Duration::from_secs(poll_secs),
            paper_balance,
            paper_slippage_bps,
            strategy_config_path: strategy_config_path(),
        })
    }

    /// Strategy file location alone, for commands that never touch an
    /// account and so need no credentials.
    pub fn strategy_path_from_env() -> String {
        load_dotenv();
        strategy_config_path()
    }
}

fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }
}

fn strategy_config_path() -> String {
    optional_env("STRATEGY_CONFIG_PATH").unwrap_or_else(|| DEFAULT_STRATEGY_CONFIG_PATH.to_string())
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns the process environment so nothing races on it.
    #[test]
    fn live_mode_needs_keys_but_strategy_path_does_not() {
        std::env::set_var("TRADING_MODE", "live");
        std::env::remove_var("BINANCE_API_KEY");
        std::env::remove_var("BINANCE_SECRET");
        std::env::remove_var("STRATEGY_CONFIG_PATH");

        assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        assert_eq!(Config::strategy_path_from_env(), DEFAULT_STRATEGY_CONFIG_PATH);

        std::env::set_var("STRATEGY_CONFIG_PATH", "alt.toml");
        assert_eq!(Config::strategy_path_from_env(), "alt.toml");

        std::env::set_var("BINANCE_API_KEY", "key");
        std::env::set_var("BINANCE_SECRET", "secret");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.strategy_config_path, "alt.toml");

        std::env::set_var("TRADING_MODE", "sideways");
        assert!(matches!(Config::from_env(), Err(Error::Config(_))));
    }
}
