//! Periodic evaluation of every market.
//!
//! Each cycle aggregates market data, evaluates every market in its own
//! task and publishes the resulting decisions and prices as a single
//! immutable [`PublishedState`]. Readers always see one complete cycle.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::SkipReason;
use crate::market::{
    Direction, FundingHistorySource, FundingSeries, MarketDataAggregator, MarketDataSource,
    MarketFailure, MarketSnapshot, PriceOracle,
};
use crate::risk::PositionAdvisor;

use super::decision::{decision_key, MarketDecision};
use super::ema::ema;
use super::evaluation::{evaluate_market, EvaluationSettings, FundingTrend};
use super::planner::{plan_decisions, DecisionView};

/// What happened to one market in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarketOutcome {
    Evaluated,
    Skipped { reason: SkipReason },
}

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub markets_seen: usize,
    pub evaluated: usize,
    /// Outcome per market address
    pub outcomes: BTreeMap<String, MarketOutcome>,
    /// Markets the aggregator could not fetch at all
    pub aggregation_failures: Vec<MarketFailure>,
}

impl CycleReport {
    /// Markets skipped during evaluation, with their reasons.
    pub fn skipped(&self) -> impl Iterator<Item = (&String, &SkipReason)> {
        self.outcomes.iter().filter_map(|(addr, outcome)| match outcome {
            MarketOutcome::Skipped { reason } => Some((addr, reason)),
            MarketOutcome::Evaluated => None,
        })
    }
}

/// Everything produced by one completed cycle.
///
/// Generation 0 is the empty state before the first cycle completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishedState {
    pub generation: u64,
    pub completed_at: Option<DateTime<Utc>>,
    /// Keyed by `"{market_addr}|{direction}"`
    pub decisions: HashMap<String, MarketDecision>,
    /// Spot price per market address
    pub prices: HashMap<String, f64>,
    /// Snapshot per market address
    pub markets: HashMap<String, MarketSnapshot>,
    pub report: CycleReport,
}

impl PublishedState {
    pub fn decision(&self, market_addr: &str, direction: Direction) -> Option<&MarketDecision> {
        self.decisions.get(&decision_key(market_addr, direction))
    }
}

/// Result of evaluating one market.
struct MarketEvaluation {
    price: f64,
    decisions: [MarketDecision; 2],
}

/// Drives refresh cycles and owns the published state.
pub struct Evaluator {
    aggregator: MarketDataAggregator,
    oracle: Arc<dyn PriceOracle>,
    history: Arc<dyn FundingHistorySource>,
    settings: EvaluationSettings,
    advisor: PositionAdvisor,
    /// Market id -> price feed id
    price_feeds: HashMap<String, String>,
    max_concurrency: usize,
    refresh_interval: Duration,
    state: RwLock<Arc<PublishedState>>,
    /// Held for the whole of a cycle so generations publish in order
    cycle_lock: Mutex<()>,
}

impl Evaluator {
    /// Create an evaluator from configuration and its collaborators.
    pub fn new(
        config: &Config,
        source: Arc<dyn MarketDataSource>,
        oracle: Arc<dyn PriceOracle>,
        history: Arc<dyn FundingHistorySource>,
    ) -> Self {
        let max_concurrency = config.evaluator.max_concurrency.max(1);
        Self {
            aggregator: MarketDataAggregator::new(
                source,
                config.chain.executor_address.clone(),
                max_concurrency,
            ),
            oracle,
            history,
            settings: EvaluationSettings::from_config(config),
            advisor: PositionAdvisor::from_config(&config.lifecycle),
            price_feeds: config.price_feeds.clone(),
            max_concurrency,
            refresh_interval: Duration::from_secs(config.evaluator.refresh_interval_secs.max(1)),
            state: RwLock::new(Arc::new(PublishedState::default())),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Spawn the periodic driver.
    ///
    /// The first cycle starts immediately. Cancelling `shutdown` stops new
    /// cycles from being scheduled; a cycle already running completes and
    /// publishes.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.refresh_interval.as_secs(),
            max_concurrency = self.max_concurrency,
            "Evaluator started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Evaluator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %format!("{:#}", e), "Refresh cycle failed, keeping previous state");
                    }
                }
            }
        }
    }

    /// Current published state.
    pub async fn published(&self) -> Arc<PublishedState> {
        self.state.read().await.clone()
    }

    /// Run one evaluation cycle and publish its result.
    ///
    /// Fails only when the market list cannot be fetched, in which case the
    /// previously published state is kept.
    #[instrument(skip(self), name = "refresh_cycle")]
    pub async fn refresh(&self) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;
        let generation = self.published().await.generation + 1;
        let started_at = Utc::now();

        let aggregate = self.aggregator.aggregate().await?;

        let tasks = aggregate
            .markets
            .values()
            .map(|snapshot| {
                let task = evaluate_one(
                    snapshot.clone(),
                    self.price_feeds.get(&snapshot.market_id).cloned(),
                    self.oracle.clone(),
                    self.history.clone(),
                    self.settings,
                    generation,
                    started_at,
                );
                (snapshot.market_addr.clone(), task)
            })
            .collect();

        let results = run_bounded(self.max_concurrency, tasks).await;

        let mut decisions = HashMap::with_capacity(results.len() * 2);
        let mut prices = HashMap::with_capacity(results.len());
        let mut outcomes = BTreeMap::new();

        for (market_addr, result) in results {
            match result {
                Ok(evaluation) => {
                    prices.insert(market_addr.clone(), evaluation.price);
                    for decision in evaluation.decisions {
                        decisions.insert(decision.key(), decision);
                    }
                    outcomes.insert(market_addr, MarketOutcome::Evaluated);
                }
                Err(reason) => {
                    debug!(market = %market_addr, %reason, "Market skipped");
                    outcomes.insert(market_addr, MarketOutcome::Skipped { reason });
                }
            }
        }

        let report = CycleReport {
            generation,
            started_at,
            markets_seen: aggregate.markets.len() + aggregate.failures.len(),
            evaluated: prices.len(),
            outcomes,
            aggregation_failures: aggregate.failures,
        };

        let next = Arc::new(PublishedState {
            generation,
            completed_at: Some(Utc::now()),
            decisions,
            prices,
            markets: aggregate.markets,
            report: report.clone(),
        });
        *self.state.write().await = next;

        info!(
            generation,
            markets_seen = report.markets_seen,
            evaluated = report.evaluated,
            skipped = report.skipped().count(),
            failed = report.aggregation_failures.len(),
            "Published evaluation cycle"
        );

        Ok(report)
    }

    /// Rank opportunities and position adjustments from the published state.
    ///
    /// Trends are recomputed from fresh funding history; only markets with a
    /// published price are planned.
    #[instrument(skip(self), name = "decision_plan")]
    pub async fn generate_decision_plan(&self) -> DecisionView {
        let state = self.published().await;
        let now = Utc::now();
        let mut skipped = Vec::new();

        let tasks = state
            .markets
            .values()
            .filter(|snapshot| {
                if state.prices.contains_key(&snapshot.market_addr) {
                    return true;
                }
                let reason = match state.report.outcomes.get(&snapshot.market_addr) {
                    Some(MarketOutcome::Skipped { reason }) => reason.clone(),
                    _ => SkipReason::PriceUnavailable("no cached price".to_string()),
                };
                skipped.push((snapshot.market_addr.clone(), reason));
                false
            })
            .map(|snapshot| {
                let task = candidates_for(
                    snapshot.clone(),
                    self.history.clone(),
                    self.settings,
                    state.generation,
                    now,
                );
                (snapshot.market_addr.clone(), task)
            })
            .collect();

        let mut candidates = BTreeMap::new();
        for (market_addr, result) in run_bounded(self.max_concurrency, tasks).await {
            match result {
                Ok(pair) => {
                    candidates.insert(market_addr, pair);
                }
                Err(reason) => {
                    debug!(market = %market_addr, %reason, "Market left out of plan");
                    skipped.push((market_addr, reason));
                }
            }
        }
        skipped.sort_by(|a, b| a.0.cmp(&b.0));

        let (opportunities, position_adjustments) =
            plan_decisions(&state.markets, &candidates, &state.prices, &self.advisor);

        debug!(
            generation = state.generation,
            opportunities = opportunities.len(),
            adjustments = position_adjustments.len(),
            skipped = skipped.len(),
            "Built decision plan"
        );

        DecisionView {
            generation: state.generation,
            opportunities,
            position_adjustments,
            skipped,
        }
    }

    /// Best next action from a fresh plan.
    pub async fn suggest_investment(&self) -> Option<MarketDecision> {
        self.generate_decision_plan()
            .await
            .suggest_investment()
            .cloned()
    }
}

/// Run keyed tasks with at most `limit` in flight. A panicked task is
/// reported as [`SkipReason::TaskFailed`].
async fn run_bounded<T, F>(limit: usize, tasks: Vec<(String, F)>) -> Vec<(String, Result<T, SkipReason>)>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SkipReason>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut handles = Vec::with_capacity(tasks.len());

    for (key, task) in tasks {
        let sem = semaphore.clone();
        let handle = tokio::spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| SkipReason::TaskFailed(e.to_string()))?;
            task.await
        });
        handles.push((key, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (key, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(SkipReason::TaskFailed(e.to_string())),
        };
        results.push((key, result));
    }
    results
}

async fn evaluate_one(
    snapshot: MarketSnapshot,
    feed_id: Option<String>,
    oracle: Arc<dyn PriceOracle>,
    history: Arc<dyn FundingHistorySource>,
    settings: EvaluationSettings,
    generation: u64,
    now: DateTime<Utc>,
) -> Result<MarketEvaluation, SkipReason> {
    let feed_id = feed_id.ok_or(SkipReason::NoPriceFeed)?;
    let price = oracle
        .latest_scaled_price(&feed_id)
        .await
        .map_err(|e| SkipReason::PriceUnavailable(format!("{:#}", e)))?;

    let trend = fetch_trend(history.as_ref(), &snapshot.market_addr, &settings, now).await?;
    let decisions = evaluate_market(&snapshot, trend, &settings, generation, now)?;

    Ok(MarketEvaluation { price, decisions })
}

async fn candidates_for(
    snapshot: MarketSnapshot,
    history: Arc<dyn FundingHistorySource>,
    settings: EvaluationSettings,
    generation: u64,
    now: DateTime<Utc>,
) -> Result<[MarketDecision; 2], SkipReason> {
    let trend = fetch_trend(history.as_ref(), &snapshot.market_addr, &settings, now).await?;
    Ok(evaluate_market(&snapshot, trend, &settings, generation, now)?)
}

/// Fetch the trailing funding history and smooth both sides.
async fn fetch_trend(
    history: &dyn FundingHistorySource,
    market_addr: &str,
    settings: &EvaluationSettings,
    now: DateTime<Utc>,
) -> Result<FundingTrend, SkipReason> {
    let start_date = (now - ChronoDuration::hours(settings.history_window_hours))
        .format("%Y-%m-%d")
        .to_string();
    let end_date = now.format("%Y-%m-%d").to_string();

    let records = history
        .funding_rate_history(market_addr, &start_date, &end_date)
        .await
        .map_err(|e| SkipReason::HistoryUnavailable(format!("{:#}", e)))?;

    let series = FundingSeries::from_records(&records);
    if series.discarded > 0 {
        warn!(market = %market_addr, discarded = series.discarded, "Discarded unparseable funding samples");
    }

    let ema_long = ema(&series.long, settings.ema_period)
        .map_err(|e| SkipReason::InsufficientHistory(format!("long: {}", e)))?;
    let ema_short = ema(&series.short, settings.ema_period)
        .map_err(|e| SkipReason::InsufficientHistory(format!("short: {}", e)))?;

    Ok(FundingTrend {
        ema_long,
        ema_short,
    })
}
