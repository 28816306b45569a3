//! Decision planning: matches candidate decisions against held positions,
//! applies lifecycle rules and ranks the result.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::error::SkipReason;
use crate::market::MarketSnapshot;
use crate::risk::{PositionAdvisor, PositionLevels};

use super::decision::{Action, MarketDecision};

/// Ranked decisions for the caller.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionView {
    /// Generation of the published state the plan was built from
    pub generation: u64,
    /// Markets to enter, best first
    pub opportunities: Vec<MarketDecision>,
    /// Actions for held positions, best first
    pub position_adjustments: Vec<MarketDecision>,
    /// Markets left out of this plan, keyed by address
    pub skipped: Vec<(String, SkipReason)>,
}

impl DecisionView {
    /// The single best next action, if any.
    ///
    /// The top opportunity wins unless the top adjustment is positive and
    /// strictly better.
    pub fn suggest_investment(&self) -> Option<&MarketDecision> {
        let top_adjustment = self
            .position_adjustments
            .first()
            .filter(|d| d.profit_estimate > 0.0);

        match (self.opportunities.first(), top_adjustment) {
            (Some(opp), Some(adj)) if adj.profit_estimate > opp.profit_estimate => Some(adj),
            (Some(opp), _) => Some(opp),
            (None, adj) => adj,
        }
    }
}

/// Assign final actions and split candidates into opportunities and
/// position adjustments, both sorted by profit estimate (descending).
///
/// `candidates` holds the `[short, long]` pair per market address. Positions
/// are only advised for markets with a price in `prices`.
pub fn plan_decisions(
    markets: &HashMap<String, MarketSnapshot>,
    candidates: &BTreeMap<String, [MarketDecision; 2]>,
    prices: &HashMap<String, f64>,
    advisor: &PositionAdvisor,
) -> (Vec<MarketDecision>, Vec<MarketDecision>) {
    let mut opportunities = Vec::new();
    let mut adjustments = Vec::new();

    for (market_addr, pair) in candidates {
        let Some(snapshot) = markets.get(market_addr) else {
            continue;
        };
        let price = prices.get(market_addr).copied();

        for position in &snapshot.positions {
            let Some(candidate) = pair.iter().find(|d| d.direction == position.direction) else {
                continue;
            };
            let Some(price) = price else {
                debug!(market = %market_addr, position = %position.id, "No price, skipping position");
                continue;
            };
            let levels = match PositionLevels::try_from(position) {
                Ok(levels) => levels,
                Err(e) => {
                    warn!(market = %market_addr, position = %position.id, error = %e, "Unreadable position");
                    continue;
                }
            };

            let advice = advisor.advise(&levels, candidate.current_rate, candidate.ema_rate, price);

            let mut decision = candidate.clone();
            decision.has_position = true;
            decision.position_id = Some(position.id.clone());
            decision.action = advice.action;
            decision.note = advice.reason.map(|r| r.to_string());
            adjustments.push(decision);
        }

        for candidate in pair {
            let held = snapshot.positions_in(candidate.direction).next().is_some();
            if !held && candidate.profit_estimate > 0.0 {
                let mut decision = candidate.clone();
                decision.action = Action::Open;
                opportunities.push(decision);
            }
        }
    }

    sort_by_profit(&mut opportunities);
    sort_by_profit(&mut adjustments);
    (opportunities, adjustments)
}

fn sort_by_profit(decisions: &mut [MarketDecision]) {
    decisions.sort_by(|a, b| b.profit_estimate.total_cmp(&a.profit_estimate));
}
