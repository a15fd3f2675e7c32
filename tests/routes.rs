// tests/routes.rs
use std::{collections::HashMap, sync::Arc};

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};

use hodl_signal_backend::{
    config::settings::Settings,
    routes::api::configure,
    services::{
        coin_listing::CoinListing,
        ledger::Ledger,
        market_data::{
            MarketCoin, MarketFeed, MarketMode, ModeCell, PriceSeriesProvider, SimulatedFeed,
        },
        scheduler::Scheduler,
        strategies::PricePoint,
    },
    utils::errors::MarketDataError,
};

/// Live side of the feed in tests: the markets listing answers, every
/// price call fails.
struct Down;

#[async_trait]
impl PriceSeriesProvider for Down {
    async fn fetch(&self, _: &str, _: u32) -> Result<Vec<PricePoint>, MarketDataError> {
        Err(MarketDataError::UpstreamUnavailable("connection refused".into()))
    }
    async fn spot_prices(&self, _: &[String]) -> Result<HashMap<String, f64>, MarketDataError> {
        Err(MarketDataError::UpstreamUnavailable("connection refused".into()))
    }
    async fn top_coins(&self, _: usize) -> Result<Vec<MarketCoin>, MarketDataError> {
        Ok(vec![MarketCoin::bare("bitcoin"), MarketCoin::bare("ethereum")])
    }
}

/// Live side with no listing at all.
struct Unlisted;

#[async_trait]
impl PriceSeriesProvider for Unlisted {
    async fn fetch(&self, _: &str, _: u32) -> Result<Vec<PricePoint>, MarketDataError> {
        Err(MarketDataError::UpstreamUnavailable("connection refused".into()))
    }
    async fn spot_prices(&self, _: &[String]) -> Result<HashMap<String, f64>, MarketDataError> {
        Err(MarketDataError::UpstreamUnavailable("connection refused".into()))
    }
}

struct State {
    mode: ModeCell,
    settings: web::Data<Settings>,
    feed: web::Data<dyn PriceSeriesProvider>,
    scheduler: web::Data<Scheduler>,
    ledger: web::Data<Ledger>,
    listing: web::Data<CoinListing>,
}

fn state() -> State {
    state_with(Arc::new(Down))
}

fn state_with(live: Arc<dyn PriceSeriesProvider>) -> State {
    let settings = Settings::from_lookup(|key| match key {
        "APP_MODE" => Some("simulation".into()),
        _ => None,
    })
    .unwrap();

    let mode = ModeCell::new(settings.app_mode);
    let feed: Arc<dyn PriceSeriesProvider> =
        Arc::new(MarketFeed::new(mode.clone(), live, Arc::new(SimulatedFeed)));
    let scheduler = Scheduler::new(feed.clone(), settings.loop_config());
    let listing = CoinListing::new(settings.coins_cache_ttl(), settings.coins_per_page);

    State {
        mode,
        settings: web::Data::new(settings),
        feed: web::Data::from(feed),
        scheduler: web::Data::new(scheduler),
        ledger: web::Data::new(Ledger::new()),
        listing: web::Data::new(listing),
    }
}

macro_rules! app {
    ($s:expr) => {
        test::init_service(
            App::new()
                .app_data($s.settings.clone())
                .app_data(web::Data::new($s.mode.clone()))
                .app_data($s.feed.clone())
                .app_data($s.scheduler.clone())
                .app_data($s.ledger.clone())
                .app_data($s.listing.clone())
                .configure(configure),
        )
        .await
    };
}

macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

// ───── health / mode ─────

#[actix_rt::test]
async fn health_reports_mode() {
    let s = state();
    let app = app!(s);
    let (status, body) = call!(app, test::TestRequest::get().uri("/health"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mode"], "simulation");
}

#[actix_rt::test]
async fn mode_can_be_switched() {
    let s = state();
    let app = app!(s);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/mode"));
    assert_eq!(body["data"]["mode"], "simulation");

    let (status, body) = call!(
        app,
        test::TestRequest::post().uri("/api/mode").set_json(json!({"mode": "Live"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["mode"], "live");
    assert_eq!(s.mode.get(), MarketMode::Live);

    let (status, body) = call!(
        app,
        test::TestRequest::post().uri("/api/mode").set_json(json!({"mode": "paper"}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(s.mode.get(), MarketMode::Live);
}

// ───── decisions ─────

#[actix_rt::test]
async fn simulated_decision() {
    let s = state();
    let app = app!(s);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/trading/decision/Bitcoin"));
    assert_eq!(status, StatusCode::OK);

    let d = &body["data"];
    assert!(["BUY", "SELL", "HOLD"].contains(&d["decision"].as_str().unwrap()));
    let price = d["price"].as_f64().unwrap();
    assert!((95_000.0..=105_000.0).contains(&price));
}

#[actix_rt::test]
async fn unknown_coin_is_not_found() {
    let s = state();
    let app = app!(s);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/trading/decision/notacoin"));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[actix_rt::test]
async fn invalid_params_are_rejected() {
    let s = state();
    let app = app!(s);
    let (status, _) = call!(
        app,
        test::TestRequest::get().uri("/api/trading/decision/bitcoin?stop_loss_pct=150")
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn upstream_outage_is_service_unavailable() {
    let s = state();
    s.mode.set(MarketMode::Live);
    let app = app!(s);
    let (status, _) = call!(app, test::TestRequest::get().uri("/api/trading/indicators/bitcoin"));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_rt::test]
async fn indicators_leave_short_windows_null() {
    let s = state();
    let app = app!(s);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/trading/indicators/ethereum"));
    assert_eq!(status, StatusCode::OK);

    let ind = &body["data"]["indicators"];
    // 14 daily points: RSI defined, 20-point Bollinger not yet
    assert!(ind["rsi"].is_number());
    assert!(ind["bb_high"].is_null());
}

#[actix_rt::test]
async fn coin_listing_embeds_errors() {
    let s = state();
    let app = app!(s);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/coins"));
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r["current_price"].is_number()));

    s.mode.set(MarketMode::Live);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/coins"));
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], "bitcoin");
    assert!(rows[0]["current_price"].is_null());
    assert!(rows.iter().all(|r| r["trade_indicator"]["decision"] == "ERROR"));
    assert!(rows[1]["trade_indicator"]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[actix_rt::test]
async fn live_listing_outage_is_service_unavailable() {
    let s = state_with(Arc::new(Unlisted));
    s.mode.set(MarketMode::Live);
    let app = app!(s);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/coins"));
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

// ───── automation ─────

#[actix_rt::test]
async fn automation_lifecycle() {
    let s = state();
    let app = app!(s);

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/trading/automation/bitcoin/start"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["started"], true);
    assert_eq!(body["data"]["running"], true);

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/trading/automation/bitcoin/start"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["started"], false);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/trading/automation/bitcoin"));
    assert_eq!(body["data"]["running"], true);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/trading/automation"));
    assert_eq!(body["data"]["bitcoin"], true);

    let (_, body) = call!(app, test::TestRequest::post().uri("/api/trading/automation/bitcoin/stop"));
    assert_eq!(body["data"]["stopped"], true);
    assert_eq!(body["data"]["running"], false);
    assert!(!s.scheduler.is_running("bitcoin"));

    s.scheduler.shutdown();
}

#[actix_rt::test]
async fn start_body_overrides_or_is_rejected() {
    let s = state();
    let app = app!(s);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trading/automation/bitcoin/start")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"stop_loss_pct":"two"}"#)
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(!s.scheduler.is_running("bitcoin"));

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trading/automation/bitcoin/start")
            .set_json(json!({"stop_loss_pct": 150.0}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!s.scheduler.is_running("bitcoin"));

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trading/automation/ethereum/start")
            .set_json(json!({"stop_loss_pct": 2.0, "take_profit_pct": 4.0}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["started"], true);
    assert!(s.scheduler.is_running("ethereum"));

    s.scheduler.shutdown();
}

#[actix_rt::test]
async fn stopping_idle_coin_is_a_noop() {
    let s = state();
    let app = app!(s);

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/trading/automation/ethereum/stop"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stopped"], false);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/trading/automation"));
    assert!(body["data"].as_object().unwrap().is_empty());
}

// ───── paper trading ─────

#[actix_rt::test]
async fn paper_trading_flow() {
    let s = state();
    let app = app!(s);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trade")
            .set_json(json!({"coin_id": "bitcoin", "action": "buy", "amount": 1000.0}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Buy successful");
    assert!(body["data"]["quantity"].as_f64().unwrap() > 0.0);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trade")
            .set_json(json!({"coin_id": "bitcoin", "action": "sell", "amount": 1e9}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Not enough bitcoin to sell");

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trade")
            .set_json(json!({"coin_id": "notacoin", "action": "buy", "amount": 10.0}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/trade")
            .set_json(json!({"coin_id": "bitcoin", "action": "hold", "amount": 10.0}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/portfolio"));
    let holdings = body["data"]["portfolio"].as_array().unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0]["coin"], "bitcoin");
    assert!(body["data"]["total_value"].as_f64().unwrap() > 0.0);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/transactions"));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn metrics_without_recorder_is_unavailable() {
    let s = state();
    let app = app!(s);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
