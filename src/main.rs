//! Funding Evaluator - Main Entry Point
//!
//! Runs the evaluator against a fixture-backed market source for paper runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use funding_evaluator::config::Config;
use funding_evaluator::market::MockMarketSource;
use funding_evaluator::strategy::{DecisionView, Evaluator};
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Funding Evaluator CLI
#[derive(Parser)]
#[command(name = "funding-evaluator")]
#[command(version, about = "Funding-rate evaluation for perpetual-futures markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic evaluator and log the plan after every cycle
    Run {
        /// Path to a JSON market fixture
        #[arg(short, long)]
        fixture: PathBuf,

        /// Stop after this many cycles (default: run until Ctrl-C)
        #[arg(short, long)]
        cycles: Option<u64>,
    },

    /// Run one cycle and print the decision plan as JSON
    Plan {
        /// Path to a JSON market fixture
        #[arg(short, long)]
        fixture: PathBuf,
    },

    /// Load and validate configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let mut config = Config::load()?;

    match cli.command {
        Commands::Run { fixture, cycles } => {
            let evaluator = build_evaluator(&mut config, &fixture)?;
            run(evaluator, cycles).await
        }
        Commands::Plan { fixture } => {
            let evaluator = build_evaluator(&mut config, &fixture)?;
            let report = evaluator.refresh().await?;
            info!(
                generation = report.generation,
                evaluated = report.evaluated,
                "Evaluation cycle complete"
            );
            let view = evaluator.generate_decision_plan().await;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Commands::CheckConfig => {
            config.validate()?;
            log_config(&config);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Build an evaluator over a fixture source. Feeds from the fixture fill in
/// any market the configuration does not map.
fn build_evaluator(config: &mut Config, fixture: &Path) -> Result<Arc<Evaluator>> {
    let (source, fixture_feeds) = MockMarketSource::from_fixture(fixture)?;
    for (market_id, feed_id) in fixture_feeds {
        config.price_feeds.entry(market_id).or_insert(feed_id);
    }

    config.validate().context("Invalid configuration")?;
    log_config(config);

    let source = Arc::new(source);
    Ok(Arc::new(Evaluator::new(
        config,
        source.clone(),
        source.clone(),
        source,
    )))
}

async fn run(evaluator: Arc<Evaluator>, cycles: Option<u64>) -> Result<()> {
    info!("Funding Evaluator v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        signal.cancel();
    });

    let driver = evaluator.clone().start(shutdown.clone());

    let mut last_generation = 0;
    let mut poll = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = poll.tick() => {
                let generation = evaluator.published().await.generation;
                if generation == last_generation {
                    continue;
                }
                last_generation = generation;

                let view = evaluator.generate_decision_plan().await;
                log_plan(&view);

                if cycles.is_some_and(|limit| generation >= limit) {
                    info!(generation, "Cycle limit reached");
                    shutdown.cancel();
                }
            }
        }
    }

    driver.await.context("Evaluator task failed")?;
    info!("Evaluator stopped");
    Ok(())
}

/// Log the top of a decision plan.
fn log_plan(view: &DecisionView) {
    info!(
        generation = view.generation,
        opportunities = view.opportunities.len(),
        adjustments = view.position_adjustments.len(),
        skipped = view.skipped.len(),
        "Decision plan"
    );

    for (i, d) in view.opportunities.iter().take(5).enumerate() {
        info!(
            "   #{}: {} {} | Profit: {:.4}% | Rate: {:.4} -> {:.4} | Fee: {:.4}%",
            i + 1,
            d.market_id,
            d.direction,
            d.profit_estimate * 100.0,
            d.current_rate,
            d.projected_rate,
            d.fee_estimate * 100.0
        );
    }

    for d in &view.position_adjustments {
        info!(
            "   Position {} on {} {} -> {}{}",
            d.position_id.as_deref().unwrap_or("?"),
            d.market_id,
            d.direction,
            d.action,
            d.note.as_deref().map(|n| format!(" ({})", n)).unwrap_or_default()
        );
    }

    for (market, reason) in &view.skipped {
        warn!(%market, %reason, "Market not planned");
    }

    if let Some(best) = view.suggest_investment() {
        info!(
            market = %best.market_id,
            direction = %best.direction,
            action = %best.action,
            profit = best.profit_estimate,
            "Suggested investment"
        );
    }
}

/// Initialize logging with file and console output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "funding-evaluator.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_evaluator=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stderr.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let ev = &config.evaluator;
    info!("Configuration:");
    info!("   Refresh Interval: {}s", ev.refresh_interval_secs);
    info!("   Max Concurrency: {}", ev.max_concurrency);
    info!("   Trade Size: ${}", ev.trade_size_usd);
    info!("   Evaluation Leverage: {}x", ev.evaluation_leverage);
    info!("   Holding Period: {}h", ev.holding_period_hours);
    info!(
        "   EMA: {} samples over {}h",
        ev.ema_period, ev.history_window_hours
    );
    info!(
        "   Price Buffer: {:.1}%",
        config.lifecycle.price_buffer * dec!(100)
    );
    info!(
        "   Rate Divergence: {:.0}%",
        config.lifecycle.rate_divergence * dec!(100)
    );
    info!("   Price Feeds: {}", config.price_feeds.len());
    if config.chain.executor_address.is_empty() {
        warn!("   No executor address configured; no positions will be tracked");
    }
}
