// src/routes/portfolio.rs

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;

use crate::services::{
    ledger::{execute_paper_trade, portfolio_summary, Ledger, TradeAction},
    market_data::PriceSeriesProvider,
};
use crate::utils::{errors::TradeError, types::ApiResponse};

#[derive(Debug, Deserialize)]
pub struct TradeParams {
    pub coin_id: String,
    /// "buy" | "sell"
    pub action: String,
    /// USD amount to spend or to sell.
    pub amount: f64,
}

#[post("/trade")]
pub async fn trade(
    params: web::Json<TradeParams>,
    ledger: web::Data<Ledger>,
    feed: web::Data<dyn PriceSeriesProvider>,
) -> Result<HttpResponse, TradeError> {
    let action: TradeAction = params.action.parse()?;

    let tx = execute_paper_trade(&ledger, feed.get_ref(), &params.coin_id, action, params.amount)
        .await
        .map_err(|e| {
            log::warn!("trade {} {}: {e}", params.action, params.coin_id);
            e
        })?;

    let msg = match action {
        TradeAction::Buy => "Buy successful",
        TradeAction::Sell => "Sell successful",
    };
    Ok(HttpResponse::Ok().json(ApiResponse::ok_with(msg, tx)))
}

#[get("/portfolio")]
pub async fn portfolio(
    ledger: web::Data<Ledger>,
    feed: web::Data<dyn PriceSeriesProvider>,
) -> impl Responder {
    match portfolio_summary(&ledger, feed.get_ref()).await {
        Ok(summary) => HttpResponse::Ok().json(ApiResponse::ok(summary)),
        Err(e) => {
            log::error!("portfolio: {e}");
            actix_web::ResponseError::error_response(&e)
        }
    }
}

#[get("/transactions")]
pub async fn transactions(ledger: web::Data<Ledger>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::ok(ledger.transactions()))
}
