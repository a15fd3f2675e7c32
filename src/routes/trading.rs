// src/routes/trading.rs

use actix_web::{get, post, web, HttpResponse, Responder, ResponseError, Scope};
use serde::{Deserialize, Serialize};

use crate::config::settings::Settings;
use crate::routes::automation::automation_scope;
use crate::services::{
    coin_listing::CoinListing,
    market_data::{MarketMode, ModeCell, PriceSeriesProvider},
    strategies::StrategyParams,
    trading_engine::evaluate,
};
use crate::utils::{errors::EvaluationError, types::ApiResponse};

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeBody {
    pub mode: String,
}

#[get("/mode")]
pub async fn get_mode(mode: web::Data<ModeCell>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::ok(ModeBody {
        mode: mode.get().to_string(),
    }))
}

#[post("/mode")]
pub async fn set_mode(mode: web::Data<ModeCell>, body: web::Json<ModeBody>) -> impl Responder {
    let next: MarketMode = match body.mode.parse() {
        Ok(m) => m,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::err(e)),
    };

    let prev = mode.set(next);
    if prev != next {
        log::info!("market mode switched {prev} → {next}");
    }
    HttpResponse::Ok().json(ApiResponse::ok_with(
        format!("Mode set to {next}"),
        ModeBody { mode: next.to_string() },
    ))
}

/// Optional overrides of the configured strategy parameters.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionQuery {
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub entry_price: Option<f64>,
}

impl DecisionQuery {
    fn params(&self, base: StrategyParams) -> Result<StrategyParams, String> {
        let params = StrategyParams {
            stop_loss_pct: self.stop_loss_pct.unwrap_or(base.stop_loss_pct),
            take_profit_pct: self.take_profit_pct.unwrap_or(base.take_profit_pct),
            entry_price: self.entry_price.or(base.entry_price),
        };
        params.validate()?;
        Ok(params)
    }
}

#[get("/decision/{coin}")]
async fn get_decision(
    path: web::Path<String>,
    query: web::Query<DecisionQuery>,
    feed: web::Data<dyn PriceSeriesProvider>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let coin = path.into_inner();
    let params = match query.params(settings.strategy_params()) {
        Ok(p) => p,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::err(e)),
    };

    match evaluate(feed.get_ref(), &coin, settings.lookback_days, &params).await {
        Ok(ev) => HttpResponse::Ok().json(ApiResponse::ok(ev.decision)),
        Err(e) => {
            log::error!("decision {coin}: {e}");
            e.error_response()
        }
    }
}

#[get("/indicators/{coin}")]
async fn get_indicators(
    path: web::Path<String>,
    feed: web::Data<dyn PriceSeriesProvider>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, EvaluationError> {
    let coin = path.into_inner();
    let ev = evaluate(
        feed.get_ref(),
        &coin,
        settings.lookback_days,
        &settings.strategy_params(),
    )
    .await
    .map_err(|e| {
        log::error!("indicators {coin}: {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(ev)))
}

/// Top coins with their latest price and decision. One failing coin does
/// not fail the listing; live results are cached.
#[get("/coins")]
pub async fn list_coins(
    feed: web::Data<dyn PriceSeriesProvider>,
    mode: web::Data<ModeCell>,
    listing: web::Data<CoinListing>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let params = settings.strategy_params();
    match listing
        .list(feed.get_ref(), mode.get(), settings.lookback_days, &params)
        .await
    {
        Ok(rows) => HttpResponse::Ok().json(ApiResponse::ok(rows)),
        Err(e) => {
            log::error!("coins: listing failed: {e}");
            e.error_response()
        }
    }
}

pub fn trading_scope() -> Scope {
    // `/automation` first: the nested scope owns everything under it
    web::scope("/trading")
        .service(automation_scope())
        .service(get_decision)
        .service(get_indicators)
}
