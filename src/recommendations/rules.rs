//! Recommendation rule registry.
//!
//! Each rule is a pure predicate over the snapshot and the score breakdown. A rule
//! that fires reports the signed score impact it is associated with.

use crate::models::metrics_snapshot;
use crate::models::readiness_score::ScoreComponents;
use crate::models::recommendation::Category;
use crate::scoring::BASE_SCORE;

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub snapshot: &'a metrics_snapshot::Model,
    pub score: i32,
    pub components: ScoreComponents,
}

pub type RuleFn = fn(&RuleInput<'_>) -> Option<i32>;

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub evaluate: RuleFn,
}

pub const REDUCE_CHARGEBACKS: &str = "reduce_chargebacks";
pub const STABILIZE_REVENUE: &str = "stabilize_revenue";
pub const IMPROVE_PAYOUT_TIMING: &str = "improve_payout_timing";
pub const FOCUS_CORE_METRICS: &str = "focus_core_metrics";

fn reduce_chargebacks(input: &RuleInput<'_>) -> Option<i32> {
    (input.snapshot.chargeback_ratio > 0.02).then_some(input.components.chargeback)
}

fn stabilize_revenue(input: &RuleInput<'_>) -> Option<i32> {
    (input.snapshot.revenue_volatility > 0.5).then_some(input.components.volatility)
}

fn improve_payout_timing(input: &RuleInput<'_>) -> Option<i32> {
    (input.snapshot.payout_reliability < 0.80).then_some(input.components.payout)
}

fn focus_core_metrics(input: &RuleInput<'_>) -> Option<i32> {
    (input.score < BASE_SCORE).then_some(input.score - BASE_SCORE)
}

static RULES: &[Rule] = &[
    Rule {
        id: REDUCE_CHARGEBACKS,
        title: "Reduce chargebacks",
        description: "Chargebacks exceed 2% of charges. Tighten fraud screening, \
                      clarify billing descriptors and respond to disputes promptly.",
        category: Category::Risk,
        evaluate: reduce_chargebacks,
    },
    Rule {
        id: STABILIZE_REVENUE,
        title: "Stabilize revenue streams",
        description: "Daily revenue varies widely. Recurring billing or a broader \
                      customer base smooths cash flow.",
        category: Category::Revenue,
        evaluate: stabilize_revenue,
    },
    Rule {
        id: IMPROVE_PAYOUT_TIMING,
        title: "Improve payout timing",
        description: "Fewer than 80% of payouts settled on schedule. Review bank \
                      details and payout holds with the provider.",
        category: Category::Operations,
        evaluate: improve_payout_timing,
    },
    Rule {
        id: FOCUS_CORE_METRICS,
        title: "Focus on core metrics",
        description: "The readiness score is below the baseline. Work on the \
                      highest-priority recommendations first.",
        category: Category::General,
        evaluate: focus_core_metrics,
    },
];

pub fn registry() -> &'static [Rule] {
    RULES
}
