//! Rule-based signal engine (RSI × MACD × ADX, Bollinger breaks, stop-loss /
//! take-profit).
//!
//! Pure and deterministic: the same point, snapshot and parameters always
//! give the same [`Decision`]. An undefined indicator fails every comparison
//! that reads it, so short series simply fall through to later rules.

use serde::{Deserialize, Serialize};

use crate::services::strategies::{IndicatorSnapshot, PricePoint};
use crate::utils::precision::{round6, round6_opt};

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const ADX_TRENDING: f64 = 25.0;

pub const STOP_LOSS_REASON: &str = "stop-loss triggered";
pub const TAKE_PROFIT_REASON: &str = "take-profit triggered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

/// Which rule produced a decision, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    OversoldTrend,
    OverboughtTrend,
    LowerBandBreak,
    UpperBandBreak,
    StopLoss,
    TakeProfit,
    NoSignal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    #[serde(rename = "decision")]
    pub action: Action,
    pub price: f64,
    #[serde(rename = "RSI", skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub rule: DecisionRule,
}

/// --------------------------------------------------------------------
/// Caller-tunable parameters (defaults 5 % / 10 %)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    #[serde(default = "d5")]
    pub stop_loss_pct: f64,
    #[serde(default = "d10")]
    pub take_profit_pct: f64,
    /// Price the stop-loss / take-profit thresholds are anchored on. Without
    /// it the evaluated price is used, which keeps those two rules inert.
    #[serde(default)]
    pub entry_price: Option<f64>,
}
fn d5() -> f64 {
    5.0
}
fn d10() -> f64 {
    10.0
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: d5(),
            take_profit_pct: d10(),
            entry_price: None,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..100.0).contains(&self.stop_loss_pct) {
            return Err(format!(
                "stop_loss_pct must be in [0, 100), got {}",
                self.stop_loss_pct
            ));
        }
        if !(self.take_profit_pct.is_finite() && self.take_profit_pct >= 0.0) {
            return Err(format!(
                "take_profit_pct must be a non-negative number, got {}",
                self.take_profit_pct
            ));
        }
        if let Some(p) = self.entry_price {
            if !(p.is_finite() && p > 0.0) {
                return Err(format!("entry_price must be positive, got {p}"));
            }
        }
        Ok(())
    }
}

/// Stop-loss and take-profit prices for `price`, rounded to 6 digits.
pub fn calculate_stop_loss_and_take_profit(
    price: f64,
    stop_loss_pct: f64,
    take_profit_pct: f64,
) -> (f64, f64) {
    let stop_loss = price * (1.0 - stop_loss_pct / 100.0);
    let take_profit = price * (1.0 + take_profit_pct / 100.0);
    (round6(stop_loss), round6(take_profit))
}

fn lt(a: Option<f64>, b: Option<f64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a < b)
}

fn gt(a: Option<f64>, b: Option<f64>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a > b)
}

/// Applies the ordered rule set to the latest point. First match wins.
pub fn decide(latest: &PricePoint, snap: &IndicatorSnapshot, params: &StrategyParams) -> Decision {
    let price = latest.price;
    let anchor = params.entry_price.unwrap_or(price);
    let (stop_loss, take_profit) =
        calculate_stop_loss_and_take_profit(anchor, params.stop_loss_pct, params.take_profit_pct);

    let p = Some(price);
    let (action, rule) = if lt(snap.rsi, Some(RSI_OVERSOLD))
        && gt(snap.macd, snap.macd_signal)
        && gt(snap.adx, Some(ADX_TRENDING))
    {
        (Action::Buy, DecisionRule::OversoldTrend)
    } else if gt(snap.rsi, Some(RSI_OVERBOUGHT))
        && lt(snap.macd, snap.macd_signal)
        && gt(snap.adx, Some(ADX_TRENDING))
    {
        (Action::Sell, DecisionRule::OverboughtTrend)
    } else if lt(p, snap.bb_low) {
        (Action::Buy, DecisionRule::LowerBandBreak)
    } else if gt(p, snap.bb_high) {
        (Action::Sell, DecisionRule::UpperBandBreak)
    } else if price <= stop_loss {
        (Action::Sell, DecisionRule::StopLoss)
    } else if price >= take_profit {
        (Action::Sell, DecisionRule::TakeProfit)
    } else {
        (Action::Hold, DecisionRule::NoSignal)
    };

    let reason = match rule {
        DecisionRule::StopLoss => Some(STOP_LOSS_REASON.to_string()),
        DecisionRule::TakeProfit => Some(TAKE_PROFIT_REASON.to_string()),
        _ => None,
    };

    Decision {
        action,
        price: round6(price),
        rsi: round6_opt(snap.rsi),
        reason,
        rule,
    }
}

// ======================================================================
// UNIT TESTS
// ======================================================================
