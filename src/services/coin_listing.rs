//! Coin listing with a decision per coin.
//!
//! Live listings hit `/coins/markets` plus one `market_chart` per coin, so
//! they are cached for a TTL. Simulated listings are rebuilt on every call.

use std::{
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::services::{
    market_data::{MarketCoin, MarketMode, PriceSeriesProvider},
    strategies::{Decision, StrategyParams},
    trading_engine::{evaluate, Evaluation},
};
use crate::utils::errors::{EvaluationError, MarketDataError};

/// Coins evaluated concurrently while building one listing.
const EVAL_CONCURRENCY: usize = 4;

/// Either a decision or the reason the coin could not be evaluated.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TradeIndicator {
    Decision(Decision),
    Error { decision: &'static str, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CoinRow {
    #[serde(flatten)]
    pub coin: MarketCoin,
    pub trade_indicator: TradeIndicator,
}

impl CoinRow {
    fn from_result(mut coin: MarketCoin, res: Result<Evaluation, EvaluationError>) -> Self {
        match res {
            Ok(ev) => {
                coin.current_price.get_or_insert(ev.latest.price);
                CoinRow { coin, trade_indicator: TradeIndicator::Decision(ev.decision) }
            }
            Err(e) => {
                log::warn!("coins: {} failed: {e}", coin.id);
                CoinRow {
                    coin,
                    trade_indicator: TradeIndicator::Error {
                        decision: "ERROR",
                        error: e.to_string(),
                    },
                }
            }
        }
    }
}

pub struct CoinListing {
    ttl: Duration,
    per_page: usize,
    cached: Mutex<Option<(Instant, Vec<CoinRow>)>>,
}

impl CoinListing {
    pub fn new(ttl: Duration, per_page: usize) -> Self {
        Self {
            ttl,
            per_page,
            cached: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<(Instant, Vec<CoinRow>)>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fresh(&self) -> Option<Vec<CoinRow>> {
        match &*self.slot() {
            Some((at, rows)) if at.elapsed() < self.ttl => Some(rows.clone()),
            _ => None,
        }
    }

    /// Lists up to `per_page` coins and evaluates each one. Only a failing
    /// listing call is an error.
    pub async fn list(
        &self,
        provider: &dyn PriceSeriesProvider,
        mode: MarketMode,
        lookback_days: u32,
        params: &StrategyParams,
    ) -> Result<Vec<CoinRow>, MarketDataError> {
        if mode == MarketMode::Live {
            if let Some(rows) = self.fresh() {
                log::debug!("coins: serving {} cached rows", rows.len());
                return Ok(rows);
            }
        }

        let coins = provider.top_coins(self.per_page).await?;
        let rows: Vec<CoinRow> = stream::iter(coins)
            .map(|coin| async move {
                let res = evaluate(provider, &coin.id, lookback_days, params).await;
                CoinRow::from_result(coin, res)
            })
            .buffered(EVAL_CONCURRENCY)
            .collect()
            .await;

        if mode == MarketMode::Live {
            *self.slot() = Some((Instant::now(), rows.clone()));
        }
        Ok(rows)
    }
}
