// src/routes/automation.rs
use actix_web::{get, post, web, HttpResponse, Responder, Scope};
use serde::Serialize;

use crate::{
    services::{
        scheduler::{Scheduler, StartOutcome, StopOutcome},
        strategies::StrategyParams,
    },
    utils::types::ApiResponse,
};

#[derive(Debug, Serialize)]
pub struct AutomationState {
    pub coin_id: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,
}

/// POST /api/trading/automation/{coin}/start
///
/// An empty body starts the loop with the configured `StrategyParams`; a
/// JSON body overrides them for this loop and must parse.
#[post("/{coin}/start")]
async fn start_automation(
    path: web::Path<String>,
    scheduler: web::Data<Scheduler>,
    body: web::Bytes,
) -> impl Responder {
    let coin = path.into_inner().trim().to_ascii_lowercase();

    let params = match parse_params(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("automation {coin}: rejected start body: {e}");
            return HttpResponse::BadRequest().json(ApiResponse::<()>::err(e));
        }
    };
    let outcome = match params {
        Some(p) => scheduler.start_with(&coin, p),
        None => scheduler.start(&coin),
    };

    let (msg, started) = match outcome {
        StartOutcome::Started => (format!("Automation started for {coin}"), true),
        StartOutcome::AlreadyRunning => (format!("Automation already running for {coin}"), false),
    };
    HttpResponse::Ok().json(ApiResponse::ok_with(
        msg,
        AutomationState {
            running: scheduler.is_running(&coin),
            coin_id: coin,
            started: Some(started),
            stopped: None,
        },
    ))
}

/// POST /api/trading/automation/{coin}/stop
#[post("/{coin}/stop")]
async fn stop_automation(path: web::Path<String>, scheduler: web::Data<Scheduler>) -> impl Responder {
    let coin = path.into_inner().trim().to_ascii_lowercase();

    let (msg, stopped) = match scheduler.stop(&coin) {
        StopOutcome::Stopped => (format!("Automation stopped for {coin}"), true),
        StopOutcome::NotRunning => (format!("Automation is not running for {coin}"), false),
    };
    HttpResponse::Ok().json(ApiResponse::ok_with(
        msg,
        AutomationState {
            running: scheduler.is_running(&coin),
            coin_id: coin,
            started: None,
            stopped: Some(stopped),
        },
    ))
}

/// GET /api/trading/automation/{coin}
#[get("/{coin}")]
async fn automation_status(path: web::Path<String>, scheduler: web::Data<Scheduler>) -> impl Responder {
    let coin = path.into_inner().trim().to_ascii_lowercase();
    HttpResponse::Ok().json(ApiResponse::ok(AutomationState {
        running: scheduler.is_running(&coin),
        coin_id: coin,
        started: None,
        stopped: None,
    }))
}

/// GET /api/trading/automation
#[get("")]
async fn list_automation(scheduler: web::Data<Scheduler>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::ok(scheduler.states()))
}

/// `None` for a blank body.
fn parse_params(body: &[u8]) -> Result<Option<StrategyParams>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let params: StrategyParams =
        serde_json::from_slice(body).map_err(|e| format!("Invalid strategy parameters: {e}"))?;
    params.validate()?;
    Ok(Some(params))
}

pub fn automation_scope() -> Scope {
    web::scope("/automation")
        .service(list_automation)
        .service(automation_status)
        .service(start_automation)
        .service(stop_automation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_means_defaults() {
        assert_eq!(parse_params(b"").unwrap(), None);
        assert_eq!(parse_params(b" \n").unwrap(), None);
    }

    #[test]
    fn body_overrides_params() {
        let p = parse_params(br#"{"stop_loss_pct": 2.0}"#).unwrap().unwrap();
        assert_eq!(p.stop_loss_pct, 2.0);
        assert_eq!(p.take_profit_pct, 10.0);
    }

    #[test]
    fn malformed_body_is_an_error() {
        let err = parse_params(br#"{"stop_loss_pct": "two"}"#).unwrap_err();
        assert!(err.starts_with("Invalid strategy parameters"));
        assert!(parse_params(b"{not json").is_err());
        assert!(parse_params(br#"{"stop_loss_pct": 150}"#).is_err());
    }
}
