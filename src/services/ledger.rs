//! ──────────────────────────────────────────────────────────────────────────
//! Paper-trading ledger
//! ──────────────────────────────────────────────────────────────────────────
//! * Holdings     – coin → quantity, never negative
//! * Transactions – append-only history of accepted trades
//!
//! In-memory only; the automation loops never write here.
//! ──────────────────────────────────────────────────────────────────────────

use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::market_data::PriceSeriesProvider;
use crate::utils::errors::{MarketDataError, TradeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl FromStr for TradeAction {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            _ => Err(TradeError::InvalidRequest(
                "Action must be 'buy' or 'sell'.".into(),
            )),
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => f.write_str("buy"),
            TradeAction::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub coin_id: String,
    pub action: TradeAction,
    /// USD notional.
    pub amount: f64,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub coin: String,
    pub quantity: f64,
    pub price: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub portfolio: Vec<Holding>,
    pub total_value: f64,
}

#[derive(Debug, Default)]
struct Book {
    holdings: BTreeMap<String, f64>,
    transactions: Vec<Transaction>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    book: Mutex<Book>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        // poisoned: keep serving the last written state
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies a trade of `amount` USD at `price` and appends it to the
    /// history. Selling more than is held leaves the book untouched.
    pub fn record_trade(
        &self,
        coin_id: &str,
        action: TradeAction,
        amount: f64,
        price: f64,
    ) -> Result<Transaction, TradeError> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(TradeError::InvalidRequest(format!(
                "amount must be a positive number, got {amount}"
            )));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(TradeError::InvalidRequest(format!(
                "Invalid coin ID: {coin_id}"
            )));
        }

        let coin = coin_id.trim().to_ascii_lowercase();
        let quantity = amount / price;

        let mut book = self.book();
        let held = book.holdings.get(&coin).copied().unwrap_or(0.0);
        let next = match action {
            TradeAction::Buy => held + quantity,
            TradeAction::Sell if held < quantity => {
                return Err(TradeError::InsufficientHoldings { coin });
            }
            TradeAction::Sell => held - quantity,
        };
        if next > 0.0 {
            book.holdings.insert(coin.clone(), next);
        } else {
            book.holdings.remove(&coin);
        }

        let tx = Transaction {
            id: Uuid::new_v4(),
            coin_id: coin,
            action,
            amount,
            price,
            quantity,
            timestamp: Utc::now(),
        };
        book.transactions.push(tx.clone());
        log::info!(
            "ledger: {} {:.8} {} @ {} (${amount})",
            tx.action,
            tx.quantity,
            tx.coin_id,
            tx.price
        );
        Ok(tx)
    }

    pub fn holdings(&self) -> BTreeMap<String, f64> {
        self.book().holdings.clone()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.book().transactions.clone()
    }
}

/// Prices `coin_id` through `provider` and records the trade.
pub async fn execute_paper_trade(
    ledger: &Ledger,
    provider: &dyn PriceSeriesProvider,
    coin_id: &str,
    action: TradeAction,
    amount: f64,
) -> Result<Transaction, TradeError> {
    let coin = coin_id.trim().to_ascii_lowercase();
    let invalid = || TradeError::InvalidRequest(format!("Invalid coin ID: {coin_id}"));

    let prices = match provider.spot_prices(std::slice::from_ref(&coin)).await {
        Ok(p) => p,
        Err(MarketDataError::InvalidCoin(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    let price = prices.get(&coin).copied().ok_or_else(invalid)?;

    ledger.record_trade(&coin, action, amount, price)
}

/// Values every holding at the provider's current price. Coins without a
/// quote are valued at zero.
pub async fn portfolio_summary(
    ledger: &Ledger,
    provider: &dyn PriceSeriesProvider,
) -> Result<PortfolioSummary, TradeError> {
    let holdings = ledger.holdings();
    if holdings.is_empty() {
        return Ok(PortfolioSummary { portfolio: vec![], total_value: 0.0 });
    }

    let ids: Vec<String> = holdings.keys().cloned().collect();
    let prices = provider.spot_prices(&ids).await?;

    let portfolio: Vec<Holding> = holdings
        .into_iter()
        .map(|(coin, quantity)| {
            let price = prices.get(&coin).copied().unwrap_or(0.0);
            Holding { value: quantity * price, coin, quantity, price }
        })
        .collect();
    let total_value = portfolio.iter().map(|h| h.value).sum();

    Ok(PortfolioSummary { portfolio, total_value })
}
