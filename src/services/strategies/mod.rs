pub mod common;
pub use common::{PricePoint, PriceSeries};
pub mod indicators;
pub use indicators::{IndicatorFrame, IndicatorSnapshot};
pub mod signal;
pub use signal::{calculate_stop_loss_and_take_profit, decide, Action, Decision, DecisionRule, StrategyParams};
