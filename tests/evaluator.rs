//! End-to-end evaluator runs against the in-memory market source.

use chrono::Utc;
use funding_evaluator::error::SkipReason;
use funding_evaluator::market::mock::{
    hourly_history, sample_position, sample_status, FailurePoint, MockMarket,
};
use funding_evaluator::market::{Direction, MockMarketSource};
use funding_evaluator::strategy::{Action, Evaluator, MarketOutcome};
use funding_evaluator::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const OWNER: &str = "demo-executor";

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.chain.executor_address = OWNER.to_string();
    config.evaluator.max_concurrency = 4;
    config
}

fn evaluator(config: &Config, source: &Arc<MockMarketSource>) -> Evaluator {
    Evaluator::new(config, source.clone(), source.clone(), source.clone())
}

/// `count` markets named M0..Mn with constant histories and distinct prices.
async fn many_markets(count: usize, config: &mut Config) -> Arc<MockMarketSource> {
    let source = MockMarketSource::new();
    let now = Utc::now();
    for i in 0..count {
        let id = format!("M{}", i);
        let long = format!("{}", 10_000 + i * 1_000);
        source
            .add_market(
                MockMarket::new(&id, &format!("addr{}", i), sample_status(&long, "10000", "0.2", "-0.2"))
                    .with_history(hourly_history(now, 24, "0.2", "-0.2")),
            )
            .await;
        source
            .set_price(&format!("feed{}", i), 100.0 * (i + 1) as f64)
            .await;
        config.price_feeds.insert(id, format!("feed{}", i));
    }
    Arc::new(source)
}

#[tokio::test]
async fn test_demo_fixture_end_to_end() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/demo.json");
    let (source, feeds) = assert_ok!(MockMarketSource::from_fixture(path));
    let mut config = base_config();
    config.price_feeds.extend(feeds);
    let source = Arc::new(source);
    let ev = evaluator(&config, &source);

    let report = assert_ok!(ev.refresh().await);
    assert_eq!(report.markets_seen, 4);
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.outcomes["osmo1eth"], MarketOutcome::Evaluated);
    assert_eq!(report.outcomes["osmo1btc"], MarketOutcome::Evaluated);
    assert_eq!(
        report.outcomes["osmo1atom"],
        MarketOutcome::Skipped {
            reason: SkipReason::NoPriceFeed
        }
    );
    assert!(matches!(
        report.outcomes["osmo1osmo"],
        MarketOutcome::Skipped {
            reason: SkipReason::InsufficientHistory(_)
        }
    ));

    let state = ev.published().await;
    assert_eq!(state.decisions.len(), 4);
    assert_close(state.prices["osmo1eth"], 2480.5);
    let eth_short = state.decision("osmo1eth", Direction::Short).unwrap();
    assert_close(eth_short.current_rate, -1.35);
    assert_eq!(eth_short.action, Action::Ignore);

    let view = ev.generate_decision_plan().await;
    let mut held: Vec<_> = view
        .position_adjustments
        .iter()
        .filter_map(|d| d.position_id.clone())
        .collect();
    held.sort();
    assert_eq!(held, vec!["101".to_string(), "202".to_string()]);
    assert!(view.position_adjustments.iter().all(|d| d.has_position));
    assert_eq!(view.skipped.len(), 2);

    for pair in view.opportunities.windows(2) {
        assert!(pair[0].profit_estimate >= pair[1].profit_estimate);
    }
    assert!(view
        .opportunities
        .iter()
        .all(|d| d.action == Action::Open && d.profit_estimate > 0.0));
}

#[tokio::test]
async fn test_failed_market_is_omitted() {
    let mut config = base_config();
    let source = many_markets(5, &mut config).await;
    source.fail("M2", FailurePoint::MarketStatus).await;
    let ev = evaluator(&config, &source);

    let report = assert_ok!(ev.refresh().await);
    assert_eq!(report.markets_seen, 5);
    assert_eq!(report.evaluated, 4);
    assert_eq!(report.aggregation_failures.len(), 1);
    assert_eq!(report.aggregation_failures[0].market_id, "M2");

    let state = ev.published().await;
    assert!(state.decision("addr2", Direction::Long).is_none());
    assert!(!state.prices.contains_key("addr2"));
    for i in [0, 1, 3, 4] {
        let addr = format!("addr{}", i);
        assert!(state.decision(&addr, Direction::Long).is_some());
        assert!(state.decision(&addr, Direction::Short).is_some());
    }

    // The market comes back once the failure clears, with its latest status
    source.clear_failures().await;
    source
        .set_status("M2", sample_status("12000", "10000", "0.3", "-0.35"))
        .await;
    let report = assert_ok!(ev.refresh().await);
    assert_eq!(report.evaluated, 5);

    let state = ev.published().await;
    assert_close(state.decision("addr2", Direction::Long).unwrap().current_rate, 0.3);
    assert_close(state.decision("addr2", Direction::Short).unwrap().current_rate, -0.35);
}

#[tokio::test]
async fn test_listing_failure_is_an_error() {
    let mut config = base_config();
    let source = many_markets(2, &mut config).await;
    let ev = evaluator(&config, &source);

    source.fail_listing(true);
    assert_err!(ev.refresh().await);
    assert_eq!(ev.published().await.generation, 0);

    source.fail_listing(false);
    assert_ok!(ev.refresh().await);
    assert_eq!(ev.published().await.generation, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_mixed_cycles() {
    let mut config = base_config();
    config.evaluator.max_concurrency = 3;
    let source = many_markets(12, &mut config).await;
    let ev = Arc::new(evaluator(&config, &source));

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let ev = ev.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut observed = 0u64;
            while !done.load(Ordering::SeqCst) {
                let state = ev.published().await;
                let generation = state.generation;
                assert!(generation >= observed, "generation went backwards");
                observed = generation;

                for decision in state.decisions.values() {
                    assert_eq!(decision.generation, generation);
                }
                // Every price was read while the source epoch equalled the generation
                for (addr, price) in &state.prices {
                    let index: f64 = addr.trim_start_matches("addr").parse().unwrap();
                    assert_close(*price, 100.0 * (index + 1.0) + generation as f64);
                }
                tokio::task::yield_now().await;
            }
            observed
        })
    };

    for generation in 1..=10u64 {
        source.set_price_epoch(generation);
        let report = assert_ok!(ev.refresh().await);
        assert_eq!(report.generation, generation);
    }
    done.store(true, Ordering::SeqCst);

    let observed = reader.await.unwrap();
    assert!(observed <= 10);
    let state = ev.published().await;
    assert_eq!(state.generation, 10);
    assert_eq!(state.decisions.len(), 24);
}

#[tokio::test]
async fn test_concurrent_refreshes_publish_in_order() {
    let mut config = base_config();
    let source = many_markets(4, &mut config).await;
    let ev = Arc::new(evaluator(&config, &source));

    let (a, b) = tokio::join!(ev.refresh(), ev.refresh());
    let mut generations = vec![assert_ok!(a).generation, assert_ok!(b).generation];
    generations.sort();
    assert_eq!(generations, vec![1, 2]);
    assert_eq!(ev.published().await.generation, 2);
}

#[tokio::test]
async fn test_held_positions_follow_lifecycle_rules() {
    let mut config = base_config();
    let source = many_markets(1, &mut config).await;

    // Long funding in M0 is positive, so the long closes whatever its levels
    let mut long = sample_position("9", Direction::Long);
    long.liquidation_price = Some("50".to_string());
    source.add_position("M0", OWNER, long).await;

    // Price is 100: (104 - 100) / 104 is inside the 5% buffer
    let mut short = sample_position("10", Direction::Short);
    short.liquidation_price = Some("104".to_string());
    source.add_position("M0", OWNER, short).await;

    let ev = evaluator(&config, &source);
    assert_ok!(ev.refresh().await);

    let view = ev.generate_decision_plan().await;
    assert_eq!(view.position_adjustments.len(), 2);
    for adj in &view.position_adjustments {
        assert_eq!(adj.action, Action::Close);
        let expected = match adj.position_id.as_deref() {
            Some("9") => "funding-positive",
            Some("10") => "liquidation-risk",
            other => panic!("unexpected position {:?}", other),
        };
        assert_eq!(adj.note.as_deref(), Some(expected));
    }
    assert!(view.opportunities.iter().all(|d| d.market_addr != "addr0"));
}

#[tokio::test]
async fn test_suggest_investment_picks_best_opportunity() {
    let mut config = base_config();
    let source = many_markets(3, &mut config).await;
    let ev = evaluator(&config, &source);
    assert_ok!(ev.refresh().await);

    let view = ev.generate_decision_plan().await;
    let best = ev.suggest_investment().await;
    match view.opportunities.first() {
        Some(top) => {
            let best = best.unwrap();
            assert_eq!(best.key(), top.key());
            assert_eq!(best.action, Action::Open);
        }
        None => assert!(best.is_none()),
    }
}
