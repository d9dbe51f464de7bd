//! Buy/sell rule forests.
//!
//! A side's decision is the OR over that side's groups. Inside a group only
//! conditions whose `side` matches participate, combined with the group's
//! logic; a group with no participating conditions is false.

use serde::{Deserialize, Serialize};

use crate::domain::condition::{Condition, ConditionGroup, Logic, Side};
use crate::domain::error::SigtraderError;
use crate::domain::indicator::EnrichedFrame;
use crate::domain::signal;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub buy_groups: Vec<ConditionGroup>,
    #[serde(default)]
    pub sell_groups: Vec<ConditionGroup>,
}

impl RuleSet {
    /// Parse the JSON wire format. Unknown top-level fields are ignored.
    pub fn from_json(json: &str) -> Result<Self, SigtraderError> {
        serde_json::from_str(json).map_err(|e| SigtraderError::RuleParse {
            reason: e.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, SigtraderError> {
        serde_json::to_string(self).map_err(|e| SigtraderError::RuleParse {
            reason: e.to_string(),
        })
    }

    pub fn groups(&self, side: Side) -> &[ConditionGroup] {
        match side {
            Side::Buy => &self.buy_groups,
            Side::Sell => &self.sell_groups,
        }
    }

    pub fn decide(&self, frame: &EnrichedFrame, idx: usize, side: Side) -> bool {
        self.groups(side)
            .iter()
            .any(|g| evaluate_group(g, frame, idx, side))
    }

    pub fn should_buy(&self, frame: &EnrichedFrame, idx: usize) -> bool {
        self.decide(frame, idx, Side::Buy)
    }

    pub fn should_sell(&self, frame: &EnrichedFrame, idx: usize) -> bool {
        self.decide(frame, idx, Side::Sell)
    }

    /// Conditions that can never influence a decision: those filed under the
    /// opposite side's groups, and catalogue signals without an evaluator.
    pub fn inert_conditions(&self) -> Vec<(Side, &Condition, &'static str)> {
        let mut out = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            for cond in self.groups(side).iter().flat_map(|g| &g.conditions) {
                if cond.side != side {
                    out.push((side, cond, "side does not match its group list"));
                } else if !signal::is_implemented(cond.signal_type) {
                    out.push((side, cond, "signal has no evaluator and never fires"));
                }
            }
        }
        out
    }

    pub fn condition_count(&self) -> usize {
        self.buy_groups
            .iter()
            .chain(&self.sell_groups)
            .map(|g| g.conditions.len())
            .sum()
    }
}

pub fn evaluate_group(group: &ConditionGroup, frame: &EnrichedFrame, idx: usize, side: Side) -> bool {
    let mut matching = group
        .conditions
        .iter()
        .filter(|c| c.side == side)
        .peekable();
    if matching.peek().is_none() {
        return false;
    }
    match group.logic {
        Logic::And => matching.all(|c| signal::evaluate(c, frame, idx)),
        Logic::Or => matching.any(|c| signal::evaluate(c, frame, idx)),
    }
}
