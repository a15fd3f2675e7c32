// src/routes/api.rs
use actix_web::{dev::HttpServiceFactory, web};

use crate::middleware::{metrics::metrics_endpoint, path_logger::PathLogger};
use crate::routes::{health::health_check, portfolio, trading};

pub fn api_scope() -> impl HttpServiceFactory {
    web::scope("/api")
        .wrap(PathLogger)
        .service(trading::trading_scope())
        .service(trading::get_mode)
        .service(trading::set_mode)
        .service(trading::list_coins)
        .service(portfolio::trade)
        .service(portfolio::portfolio)
        .service(portfolio::transactions)
}

/// Registers every route. Shared state (`ModeCell`, `Scheduler`, `Ledger`,
/// `CoinListing`, `Settings`, the price provider) is expected in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(metrics_endpoint)
        .service(api_scope());
}
