pub mod config;
pub mod middleware {
    pub mod metrics;
    pub mod path_logger;
}
pub mod routes {
    pub mod api;
    pub mod automation;
    pub mod health;
    pub mod portfolio;
    pub mod trading;
}
pub mod services {
    pub mod coin_listing;
    pub mod ledger;
    pub mod market_data;
    pub mod scheduler;
    pub mod trading_engine;

    pub mod strategies;
}

pub mod utils;
