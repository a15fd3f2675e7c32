// tests/market_data.rs
use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::json;

use hodl_signal_backend::{
    services::market_data::{CoinGeckoClient, PriceSeriesProvider},
    utils::errors::MarketDataError,
};

fn client(server: &Server) -> CoinGeckoClient {
    CoinGeckoClient::new(&server.url(), Duration::from_secs(2)).unwrap()
}

const CHART: &str = "/coins/bitcoin/market_chart";

#[tokio::test]
async fn market_chart_is_parsed_in_order() {
    let mut server = Server::new_async().await;
    let body = json!({
        "prices": [
            [1_700_000_000_000i64, 37000.123456789],
            [1_700_086_400_000i64, null],
            [1_700_172_800_000i64, 37500.5]
        ],
        "market_caps": [],
        "total_volumes": []
    });
    let mock = server
        .mock("GET", CHART)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
            Matcher::UrlEncoded("days".into(), "14".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let points = client(&server).fetch("Bitcoin", 14).await.unwrap();
    mock.assert_async().await;

    assert_eq!(points.len(), 2);
    assert_eq!(points[0].price, 37000.123457);
    assert_eq!(points[1].price, 37500.5);
    assert!(points[0].ts < points[1].ts);
}

#[tokio::test]
async fn not_found_is_invalid_coin() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/coins/notacoin/market_chart")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"error":"coin not found"}"#)
        .create_async()
        .await;

    let err = client(&server).fetch("notacoin", 14).await.unwrap_err();
    assert!(matches!(err, MarketDataError::InvalidCoin(id) if id == "notacoin"));
}

#[tokio::test]
async fn empty_prices_are_invalid_coin() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", CHART)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"prices":[]}"#)
        .create_async()
        .await;

    let err = client(&server).fetch("bitcoin", 14).await.unwrap_err();
    assert!(matches!(err, MarketDataError::InvalidCoin(_)));
}

#[tokio::test]
async fn too_many_requests_is_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", CHART)
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "60")
        .create_async()
        .await;

    let err = client(&server).fetch("bitcoin", 14).await.unwrap_err();
    assert!(matches!(err, MarketDataError::RateLimited { retry_after: Some(60) }));
}

#[tokio::test]
async fn server_errors_are_upstream_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", CHART)
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let err = client(&server).fetch("bitcoin", 14).await.unwrap_err();
    assert!(matches!(err, MarketDataError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn garbage_body_is_upstream_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", CHART)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let err = client(&server).fetch("bitcoin", 14).await.unwrap_err();
    assert!(matches!(err, MarketDataError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn simple_price_skips_missing_quotes() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/simple/price")
        .match_query(Matcher::UrlEncoded("vs_currencies".into(), "usd".into()))
        .with_status(200)
        .with_body(r#"{"bitcoin":{"usd":101000.5},"ethereum":{}}"#)
        .create_async()
        .await;

    let ids = vec!["bitcoin".to_string(), "ethereum".to_string()];
    let prices = client(&server).spot_prices(&ids).await.unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices["bitcoin"], 101000.5);
}

#[tokio::test]
async fn markets_listing_is_requested_by_market_cap() {
    let mut server = Server::new_async().await;
    let body = json!([
        {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 101000.0, "market_cap": 2.0e12, "total_volume": 3.1e10},
        {"id": "ethereum", "symbol": "eth", "name": "Ethereum", "current_price": null, "market_cap": null}
    ]);
    let mock = server
        .mock("GET", "/coins/markets")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("vs_currency".into(), "usd".into()),
            Matcher::UrlEncoded("order".into(), "market_cap_desc".into()),
            Matcher::UrlEncoded("per_page".into(), "100".into()),
        ]))
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let coins = client(&server).top_coins(100).await.unwrap();
    mock.assert_async().await;

    assert_eq!(coins.len(), 2);
    assert_eq!(coins[0].id, "bitcoin");
    assert_eq!(coins[0].symbol.as_deref(), Some("btc"));
    assert_eq!(coins[0].current_price, Some(101000.0));
    assert_eq!(coins[1].current_price, None);
}

#[tokio::test]
async fn markets_outage_is_upstream_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/coins/markets")
        .match_query(Matcher::Any)
        .with_status(502)
        .create_async()
        .await;

    let err = client(&server).top_coins(100).await.unwrap_err();
    assert!(matches!(err, MarketDataError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn silent_upstream_hits_the_timeout() {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });

    let client = CoinGeckoClient::new(&format!("http://{addr}"), Duration::from_millis(300)).unwrap();
    let started = std::time::Instant::now();
    let err = client.fetch("bitcoin", 14).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    match err {
        MarketDataError::UpstreamUnavailable(msg) => assert!(msg.contains("timeout"), "{msg}"),
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
}
