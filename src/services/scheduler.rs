//! Per-coin automation loops.
//!
//! Each started coin gets one tokio task that evaluates, reports through a
//! [`DecisionObserver`], then waits one interval. Stopping only clears the
//! coin's flag; the task sees it after its current wait and exits.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::{mapref::entry::Entry, DashMap};
use metrics::increment_counter;
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::services::{
    market_data::PriceSeriesProvider,
    strategies::StrategyParams,
    trading_engine::{evaluate, Evaluation},
};
use crate::utils::errors::EvaluationError;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub interval: Duration,
    pub lookback_days: u32,
    pub params: StrategyParams,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lookback_days: 14,
            params: StrategyParams::default(),
        }
    }
}

/// Side-effect sink for automation loops.
///
/// `generation` counts the starts of one coin, so a winding-down loop's
/// `on_stopped` can be told apart from the loop that replaced it.
pub trait DecisionObserver: Send + Sync {
    fn on_started(&self, _coin_id: &str, _generation: u64) {}
    fn on_decision(&self, coin_id: &str, evaluation: &Evaluation);
    fn on_error(&self, coin_id: &str, error: &EvaluationError);
    fn on_stopped(&self, _coin_id: &str, _generation: u64) {}
}

/// Writes every event to the log and bumps the signal counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DecisionObserver for LogObserver {
    fn on_started(&self, coin_id: &str, generation: u64) {
        log::info!("automation: {coin_id} gen {generation} started");
    }

    fn on_decision(&self, coin_id: &str, ev: &Evaluation) {
        let d = &ev.decision;
        log::info!(
            "automation: {coin_id} {} at {} (rsi {:?}, rule {:?})",
            d.action.as_str(),
            d.price,
            d.rsi,
            d.rule
        );
        increment_counter!(
            "signal_decisions_total",
            "coin"   => coin_id.to_string(),
            "action" => d.action.as_str(),
        );
    }

    fn on_error(&self, coin_id: &str, err: &EvaluationError) {
        log::error!("automation: {coin_id} evaluation failed: {err}");
        increment_counter!(
            "signal_errors_total",
            "coin" => coin_id.to_string(),
            "kind" => err.kind(),
        );
    }

    fn on_stopped(&self, coin_id: &str, generation: u64) {
        log::info!("automation: {coin_id} gen {generation} stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

struct CoinTask {
    /// Flag of the current generation; every start installs a fresh one.
    running: Arc<AtomicBool>,
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    provider: Arc<dyn PriceSeriesProvider>,
    observer: Arc<dyn DecisionObserver>,
    cfg: LoopConfig,
    tasks: DashMap<String, CoinTask>,
}

/// Registry of automation loops, keyed by lower-cased coin id.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

fn coin_key(coin_id: &str) -> String {
    coin_id.trim().to_ascii_lowercase()
}

impl Scheduler {
    pub fn new(provider: Arc<dyn PriceSeriesProvider>, cfg: LoopConfig) -> Self {
        Self::with_observer(provider, Arc::new(LogObserver), cfg)
    }

    pub fn with_observer(
        provider: Arc<dyn PriceSeriesProvider>,
        observer: Arc<dyn DecisionObserver>,
        cfg: LoopConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                observer,
                cfg,
                tasks: DashMap::new(),
            }),
        }
    }

    pub fn start(&self, coin_id: &str) -> StartOutcome {
        self.start_with(coin_id, self.inner.cfg.params)
    }

    /// Starts a loop with explicit parameters. A coin that is already
    /// running is left untouched.
    pub fn start_with(&self, coin_id: &str, params: StrategyParams) -> StartOutcome {
        let key = coin_key(coin_id);
        match self.inner.tasks.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().running.load(Ordering::SeqCst) {
                    log::warn!("automation: {key} is already running");
                    return StartOutcome::AlreadyRunning;
                }
                // The previous generation keeps its own (cleared) flag and
                // winds down on its own.
                let generation = slot.get().generation + 1;
                slot.insert(self.spawn(key, generation, params));
            }
            Entry::Vacant(slot) => {
                slot.insert(self.spawn(key, 1, params));
            }
        }
        StartOutcome::Started
    }

    pub fn stop(&self, coin_id: &str) -> StopOutcome {
        let key = coin_key(coin_id);
        let was_running = self
            .inner
            .tasks
            .get(&key)
            .map(|task| task.running.swap(false, Ordering::SeqCst))
            .unwrap_or(false);

        if was_running {
            log::info!("automation: stop requested for {key}");
            StopOutcome::Stopped
        } else {
            log::warn!("automation: {key} is not running");
            StopOutcome::NotRunning
        }
    }

    pub fn is_running(&self, coin_id: &str) -> bool {
        self.inner
            .tasks
            .get(&coin_key(coin_id))
            .map(|task| task.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Every coin ever started, with its current flag.
    pub fn states(&self) -> BTreeMap<String, bool> {
        self.inner
            .tasks
            .iter()
            .map(|e| (e.key().clone(), e.value().running.load(Ordering::SeqCst)))
            .collect()
    }

    pub fn running_coins(&self) -> Vec<String> {
        self.states()
            .into_iter()
            .filter_map(|(coin, running)| running.then_some(coin))
            .collect()
    }

    /// Clears every flag and aborts the tasks. Used on process exit.
    pub fn shutdown(&self) {
        let mut stopped = 0usize;
        for task in self.inner.tasks.iter() {
            if task.running.swap(false, Ordering::SeqCst) {
                stopped += 1;
            }
            task.handle.abort();
        }
        log::info!("automation: shutdown, {stopped} loop(s) stopped");
    }

    fn spawn(&self, coin_id: String, generation: u64, params: StrategyParams) -> CoinTask {
        let running = Arc::new(AtomicBool::new(true));
        let handle = tokio::spawn(run_loop(
            coin_id,
            generation,
            running.clone(),
            self.inner.provider.clone(),
            self.inner.observer.clone(),
            self.inner.cfg.clone(),
            params,
        ));
        CoinTask { running, generation, handle }
    }
}

async fn run_loop(
    coin_id: String,
    generation: u64,
    running: Arc<AtomicBool>,
    provider: Arc<dyn PriceSeriesProvider>,
    observer: Arc<dyn DecisionObserver>,
    cfg: LoopConfig,
    mut params: StrategyParams,
) {
    observer.on_started(&coin_id, generation);

    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick is immediate

    while running.load(Ordering::SeqCst) {
        match evaluate(provider.as_ref(), &coin_id, cfg.lookback_days, &params).await {
            Ok(ev) => {
                if params.entry_price.is_none() {
                    log::info!("automation: {coin_id} entry price {}", ev.latest.price);
                    params.entry_price = Some(ev.latest.price);
                }
                observer.on_decision(&coin_id, &ev);
            }
            Err(e) => observer.on_error(&coin_id, &e),
        }
        ticker.tick().await;
    }

    observer.on_stopped(&coin_id, generation);
}
