// src/services/trading_engine.rs

use serde::Serialize;

use crate::services::{
    market_data::PriceSeriesProvider,
    strategies::{decide, indicators, Decision, IndicatorSnapshot, PricePoint, PriceSeries, StrategyParams},
};
use crate::utils::errors::EvaluationError;

/// One provider → indicators → decision pass for a single coin.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub coin_id: String,
    pub latest: PricePoint,
    pub indicators: IndicatorSnapshot,
    pub decision: Decision,
}

/// Fetches `lookback_days` of history and runs the rule set on its last point.
pub async fn evaluate(
    provider: &dyn PriceSeriesProvider,
    coin_id: &str,
    lookback_days: u32,
    params: &StrategyParams,
) -> Result<Evaluation, EvaluationError> {
    let points = provider.fetch(coin_id, lookback_days).await?;
    let series = PriceSeries::from_points(points).ok_or(EvaluationError::NoData)?;

    let snapshot = indicators::compute(&series).snapshot();
    let undefined = snapshot.undefined_fields();
    if !undefined.is_empty() {
        log::debug!(
            "{coin_id}: {} points, undefined indicators {:?}",
            series.len(),
            undefined
        );
    }

    let latest = *series.latest();
    let decision = decide(&latest, &snapshot, params);

    Ok(Evaluation {
        coin_id: coin_id.trim().to_ascii_lowercase(),
        latest,
        indicators: snapshot,
        decision,
    })
}
