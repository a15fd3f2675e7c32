use dotenv::dotenv;
use std::{env, error::Error, str::FromStr, time::Duration};

use crate::services::{
    market_data::MarketMode, scheduler::LoopConfig, strategies::StrategyParams,
};

const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_port: u16,
    /// Mode the shared `ModeCell` starts in.
    pub app_mode: MarketMode,
    pub coingecko_base_url: String,
    pub http_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub lookback_days: u32,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// How long a live `/api/coins` listing is served from memory.
    pub coins_cache_ttl_secs: u64,
    pub coins_per_page: usize,
}

impl Settings {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        dotenv().ok(); // loads `.env` file automatically
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup; every key is optional.
    pub fn from_lookup<F>(get: F) -> Result<Self, Box<dyn Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_port = parse_or(&get, "SERVER_PORT", 8000u16)?;
        let app_mode = parse_or(&get, "APP_MODE", MarketMode::Live)?;
        let coingecko_base_url = get("COINGECKO_BASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_COINGECKO_URL.into());

        let http_timeout_secs = parse_or(&get, "HTTP_TIMEOUT_SECS", 10u64)?;
        if http_timeout_secs == 0 {
            return Err("HTTP_TIMEOUT_SECS must be greater than zero".into());
        }
        let poll_interval_secs = parse_or(&get, "POLL_INTERVAL_SECS", 60u64)?;
        if poll_interval_secs == 0 {
            return Err("POLL_INTERVAL_SECS must be greater than zero".into());
        }
        let lookback_days = parse_or(&get, "LOOKBACK_DAYS", 14u32)?;
        if lookback_days == 0 {
            return Err("LOOKBACK_DAYS must be at least 1".into());
        }

        let coins_cache_ttl_secs = parse_or(&get, "COINS_CACHE_TTL_SECS", 300u64)?;
        let coins_per_page = parse_or(&get, "COINS_PER_PAGE", 100usize)?;
        if !(1..=250).contains(&coins_per_page) {
            return Err("COINS_PER_PAGE must be between 1 and 250".into());
        }

        let params = StrategyParams {
            stop_loss_pct: parse_or(&get, "STOP_LOSS_PCT", 5.0f64)?,
            take_profit_pct: parse_or(&get, "TAKE_PROFIT_PCT", 10.0f64)?,
            entry_price: None,
        };
        params.validate()?;

        Ok(Self {
            server_port,
            app_mode,
            coingecko_base_url,
            http_timeout_secs,
            poll_interval_secs,
            lookback_days,
            stop_loss_pct: params.stop_loss_pct,
            take_profit_pct: params.take_profit_pct,
            coins_cache_ttl_secs,
            coins_per_page,
        })
    }

    pub fn is_simulation(&self) -> bool {
        self.app_mode == MarketMode::Simulation
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn coins_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.coins_cache_ttl_secs)
    }

    /// Default strategy parameters; callers may override per request.
    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            entry_price: None,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            lookback_days: self.lookback_days,
            params: self.strategy_params(),
        }
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{key} has an invalid value '{raw}'").into()),
    }
}
