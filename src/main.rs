use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

use hodl_signal_backend::{
    config::settings::Settings,
    middleware::metrics::Metrics,
    routes::api::configure,
    services::{
        coin_listing::CoinListing,
        ledger::Ledger,
        market_data::{CoinGeckoClient, MarketFeed, ModeCell, PriceSeriesProvider, SimulatedFeed},
        scheduler::Scheduler,
    },
};

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    log::info!("Starting hodl signal backend…");

    let settings = Settings::new()
        .map_err(|e| anyhow::anyhow!("failed to load settings: {e}"))?;
    let port = settings.server_port;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus recorder")?;

    // --- market data -------------------------------------------------------
    let mode = ModeCell::new(settings.app_mode);
    let live = CoinGeckoClient::new(&settings.coingecko_base_url, settings.http_timeout())
        .context("coingecko client")?;
    let feed: Arc<dyn PriceSeriesProvider> = Arc::new(MarketFeed::new(
        mode.clone(),
        Arc::new(live),
        Arc::new(SimulatedFeed),
    ));
    log::info!(
        "market mode {} (upstream {})",
        mode.get(),
        settings.coingecko_base_url
    );
    if settings.is_simulation() {
        log::warn!("starting in simulation mode: prices are random and not market data");
    }

    // --- shared state ------------------------------------------------------
    let scheduler = Scheduler::new(feed.clone(), settings.loop_config());
    let ledger = web::Data::new(Ledger::new());
    let listing = web::Data::new(CoinListing::new(
        settings.coins_cache_ttl(),
        settings.coins_per_page,
    ));
    let feed_data: web::Data<dyn PriceSeriesProvider> = web::Data::from(feed);
    let scheduler_data = web::Data::new(scheduler.clone());
    let settings_data = web::Data::new(settings);
    let mode_data = web::Data::new(mode);
    let prom_data = web::Data::new(prometheus);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Metrics)
            .app_data(settings_data.clone())
            .app_data(mode_data.clone())
            .app_data(feed_data.clone())
            .app_data(scheduler_data.clone())
            .app_data(ledger.clone())
            .app_data(listing.clone())
            .app_data(prom_data.clone())
            .configure(configure)
    })
    .bind(("0.0.0.0", port))
    .with_context(|| format!("bind port {port}"))?
    .run();

    log::info!("listening on 0.0.0.0:{port}");
    let result = server.await;

    scheduler.shutdown();
    result.context("http server")
}
