use actix_web::{get, web, HttpResponse};
use serde::Serialize;

use crate::services::{
    market_data::{MarketMode, ModeCell},
    scheduler::Scheduler,
};

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    mode: MarketMode,
    automated: Vec<String>,
}

#[get("/health")]
pub async fn health_check(
    mode: web::Data<ModeCell>,
    scheduler: web::Data<Scheduler>,
) -> HttpResponse {
    HttpResponse::Ok().json(Health {
        status: "ok",
        mode: mode.get(),
        automated: scheduler.running_coins(),
    })
}
