//! Price-history sources for the signal engine.
//! -----------------------------------------------------------------
//! ‣ `CoinGeckoClient` – live `market_chart` / `simple/price` over HTTP.
//! ‣ `SimulatedFeed`   – uniform random prices inside a fixed band per coin.
//! ‣ `MarketFeed`      – picks one of the two on *every* call from `ModeCell`.
//!
//! Usage from a handler or the scheduler:
//! ```ignore
//! let points = feed.fetch("bitcoin", 14).await?;
//! let series = PriceSeries::from_points(points).ok_or(EvaluationError::NoData)?;
//! ```
//! -----------------------------------------------------------------

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::services::strategies::PricePoint;
use crate::utils::{
    errors::{ApiError, MarketDataError},
    precision::round6,
};

/* ─────────────────────────────────────────  Mode switch ────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketMode {
    Live,
    Simulation,
}

impl FromStr for MarketMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(MarketMode::Live),
            "simulation" => Ok(MarketMode::Simulation),
            _ => Err("Invalid mode. Use 'live' or 'simulation'.".into()),
        }
    }
}

impl fmt::Display for MarketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketMode::Live => f.write_str("live"),
            MarketMode::Simulation => f.write_str("simulation"),
        }
    }
}

/// Shared live/simulation flag. Clones observe the same value; every fetch
/// reads it at call time.
#[derive(Debug, Clone)]
pub struct ModeCell {
    simulation: Arc<AtomicBool>,
}

impl ModeCell {
    pub fn new(mode: MarketMode) -> Self {
        Self {
            simulation: Arc::new(AtomicBool::new(mode == MarketMode::Simulation)),
        }
    }

    pub fn get(&self) -> MarketMode {
        if self.simulation.load(Ordering::SeqCst) {
            MarketMode::Simulation
        } else {
            MarketMode::Live
        }
    }

    /// Switches mode and returns the previous one.
    pub fn set(&self, mode: MarketMode) -> MarketMode {
        let was = self
            .simulation
            .swap(mode == MarketMode::Simulation, Ordering::SeqCst);
        if was {
            MarketMode::Simulation
        } else {
            MarketMode::Live
        }
    }
}

impl Default for ModeCell {
    fn default() -> Self {
        Self::new(MarketMode::Live)
    }
}

/* ─────────────────────────────────────────  Provider seam ──── */

#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    /// Time-ordered `(timestamp, price)` history covering `lookback_days`.
    async fn fetch(
        &self,
        coin_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, MarketDataError>;

    /// Current USD price per id. Unknown ids are left out of the map.
    async fn spot_prices(
        &self,
        coin_ids: &[String],
    ) -> Result<HashMap<String, f64>, MarketDataError>;

    /// Up to `limit` coins by market cap, largest first.
    async fn top_coins(&self, _limit: usize) -> Result<Vec<MarketCoin>, MarketDataError> {
        Err(MarketDataError::UpstreamUnavailable(
            "coin listing not supported by this provider".into(),
        ))
    }
}

/// One row of a market listing. Live rows carry CoinGecko's fields;
/// simulated rows only the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCoin {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
}

impl MarketCoin {
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            symbol: None,
            name: None,
            current_price: None,
            market_cap: None,
        }
    }
}

/* ─────────────────────────────────────────  Simulation ─────── */

/// Coins the simulated feed knows, with their `(low, high)` USD band.
pub const COIN_RANGES: &[(&str, f64, f64)] = &[
    ("bitcoin", 95_000.0, 105_000.0),
    ("ethereum", 2_500.0, 2_800.0),
    ("dogecoin", 0.25, 0.30),
    ("litecoin", 100.0, 140.0),
    ("ripple", 2.20, 2.50),
];

pub fn coin_range(coin_id: &str) -> Option<(f64, f64)> {
    let key = coin_id.trim().to_ascii_lowercase();
    COIN_RANGES
        .iter()
        .find(|(id, _, _)| *id == key)
        .map(|&(_, low, high)| (low, high))
}

/// Random daily prices drawn uniformly inside each coin's band. Output is
/// intentionally not reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedFeed;

impl SimulatedFeed {
    pub fn generate(coin_id: &str, days: u32) -> Result<Vec<PricePoint>, MarketDataError> {
        let (low, high) = coin_range(coin_id).ok_or_else(|| {
            log::warn!("simulation: invalid coin '{coin_id}'");
            MarketDataError::InvalidCoin(coin_id.to_string())
        })?;

        let n = i64::from(days.max(1));
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        Ok((0..n)
            .map(|i| {
                PricePoint::new(
                    now - chrono::Duration::days(n - 1 - i),
                    round6(rng.gen_range(low..=high)),
                )
            })
            .collect())
    }
}

#[async_trait]
impl PriceSeriesProvider for SimulatedFeed {
    async fn fetch(
        &self,
        coin_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        Self::generate(coin_id, lookback_days)
    }

    async fn spot_prices(
        &self,
        coin_ids: &[String],
    ) -> Result<HashMap<String, f64>, MarketDataError> {
        let mut rng = rand::thread_rng();
        Ok(coin_ids
            .iter()
            .filter_map(|id| {
                let (low, high) = coin_range(id)?;
                Some((id.trim().to_ascii_lowercase(), round6(rng.gen_range(low..=high))))
            })
            .collect())
    }

    /// The registry coins, in registry order; prices come from evaluation.
    async fn top_coins(&self, limit: usize) -> Result<Vec<MarketCoin>, MarketDataError> {
        Ok(COIN_RANGES
            .iter()
            .take(limit)
            .map(|(id, _, _)| MarketCoin::bare(id))
            .collect())
    }
}

/* ─────────────────────────────────────────  CoinGecko ──────── */

#[derive(Debug, Deserialize)]
struct MarketChart {
    /// `[[timestamp_ms, price], …]`; prices can be `null`.
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
}

/// CoinGecko's cap on `/coins/markets` page size.
const MARKETS_MAX_PER_PAGE: usize = 250;

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
}

impl CoinGeckoClient {
    /// `timeout` bounds every request, so a stuck call cannot stall a loop.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hodl-signal-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        coin_hint: &str,
    ) -> Result<T, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(ApiError::from)?;

        check_status(resp.status(), resp.headers(), coin_hint)?;

        let body = resp.bytes().await.map_err(ApiError::from)?;
        Ok(serde_json::from_slice(&body).map_err(ApiError::from)?)
    }
}

/// 429 → `RateLimited`, 404 → `InvalidCoin`, any other non-2xx →
/// `UpstreamUnavailable`.
fn check_status(
    status: StatusCode,
    headers: &HeaderMap,
    coin_id: &str,
) -> Result<(), MarketDataError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        log::warn!("coingecko rate limit hit (retry after {retry_after:?}s)");
        return Err(MarketDataError::RateLimited { retry_after });
    }
    if status == StatusCode::NOT_FOUND {
        return Err(MarketDataError::InvalidCoin(coin_id.to_string()));
    }
    if !status.is_success() {
        return Err(ApiError::Status(status).into());
    }
    Ok(())
}

fn normalise_id(coin_id: &str) -> Result<String, MarketDataError> {
    let id = coin_id.trim().to_ascii_lowercase();
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(id)
    } else {
        Err(MarketDataError::InvalidCoin(coin_id.to_string()))
    }
}

#[async_trait]
impl PriceSeriesProvider for CoinGeckoClient {
    async fn fetch(
        &self,
        coin_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let id = normalise_id(coin_id)?;
        let chart: MarketChart = self
            .get_json(
                &format!("/coins/{id}/market_chart"),
                &[
                    ("vs_currency", "usd".to_string()),
                    ("days", lookback_days.max(1).to_string()),
                ],
                &id,
            )
            .await?;

        let points: Vec<PricePoint> = chart
            .prices
            .into_iter()
            .filter_map(|(ts_ms, price)| {
                let price = price.filter(|p| p.is_finite() && *p > 0.0)?;
                let ts = DateTime::<Utc>::from_timestamp_millis(ts_ms as i64)?;
                Some(PricePoint::new(ts, round6(price)))
            })
            .collect();

        if points.is_empty() {
            log::warn!("coingecko: no valid price data for '{id}'");
            return Err(MarketDataError::InvalidCoin(id));
        }
        Ok(points)
    }

    async fn spot_prices(
        &self,
        coin_ids: &[String],
    ) -> Result<HashMap<String, f64>, MarketDataError> {
        let ids = coin_ids
            .iter()
            .map(|id| normalise_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids.join(",");

        let raw: HashMap<String, HashMap<String, Option<f64>>> = self
            .get_json(
                "/simple/price",
                &[("ids", joined.clone()), ("vs_currencies", "usd".to_string())],
                &joined,
            )
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(id, quotes)| {
                let usd = quotes.get("usd").copied().flatten()?;
                (usd.is_finite() && usd > 0.0).then_some((id, usd))
            })
            .collect())
    }

    async fn top_coins(&self, limit: usize) -> Result<Vec<MarketCoin>, MarketDataError> {
        let per_page = limit.clamp(1, MARKETS_MAX_PER_PAGE);
        let coins: Vec<MarketCoin> = self
            .get_json(
                "/coins/markets",
                &[
                    ("vs_currency", "usd".to_string()),
                    ("order", "market_cap_desc".to_string()),
                    ("per_page", per_page.to_string()),
                    ("page", "1".to_string()),
                    ("sparkline", "false".to_string()),
                ],
                "markets",
            )
            .await?;
        Ok(coins)
    }
}

/* ─────────────────────────────────────────  Mode dispatch ──── */

/// Routes each call to the live or simulated provider per the current mode.
#[derive(Clone)]
pub struct MarketFeed {
    mode: ModeCell,
    live: Arc<dyn PriceSeriesProvider>,
    simulated: Arc<dyn PriceSeriesProvider>,
}

impl MarketFeed {
    pub fn new(
        mode: ModeCell,
        live: Arc<dyn PriceSeriesProvider>,
        simulated: Arc<dyn PriceSeriesProvider>,
    ) -> Self {
        Self { mode, live, simulated }
    }

    pub fn mode(&self) -> &ModeCell {
        &self.mode
    }

    fn current(&self) -> &dyn PriceSeriesProvider {
        match self.mode.get() {
            MarketMode::Live => self.live.as_ref(),
            MarketMode::Simulation => self.simulated.as_ref(),
        }
    }
}

#[async_trait]
impl PriceSeriesProvider for MarketFeed {
    async fn fetch(
        &self,
        coin_id: &str,
        lookback_days: u32,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        self.current().fetch(coin_id, lookback_days).await
    }

    async fn spot_prices(
        &self,
        coin_ids: &[String],
    ) -> Result<HashMap<String, f64>, MarketDataError> {
        self.current().spot_prices(coin_ids).await
    }

    async fn top_coins(&self, limit: usize) -> Result<Vec<MarketCoin>, MarketDataError> {
        self.current().top_coins(limit).await
    }
}
