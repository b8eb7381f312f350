//! # Metrics Aggregation
//!
//! Windows raw events into a period-bounded [`MetricValues`]. The math here is
//! pure and deterministic; [`MetricsAggregator`] wraps it with event-store reads
//! and snapshot persistence.
//!
//! Conventions:
//! - day buckets are UTC calendar days
//! - volatility is the population coefficient of variation over days that have revenue
//! - a payout is reliable when it settled within the tolerance of its expected date
//! - payouts are folded to their latest state per `payout_id`; pending payouts do not count
//! - a refund or chargeback counts only when the charge it reverses is in the window,
//!   and each charge counts at most once, so both ratios stay in `[0, 1]`
//! - events fold in `(occurred_at, provider_event_id)` order

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::EngineError;
use crate::models::raw_event;
use crate::normalization::{ChargeStatus, EventPayload, PayoutStatus};

mod service;

pub use service::MetricsAggregator;

/// One stored event, decoded for aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEvent {
    pub provider_event_id: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl TryFrom<&raw_event::Model> for WindowEvent {
    type Error = EngineError;

    fn try_from(row: &raw_event::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            provider_event_id: row.provider_event_id.clone(),
            occurred_at: row.occurred_at.with_timezone(&Utc),
            payload: row.decoded_payload()?,
        })
    }
}

/// Aggregated metrics for one business over `[period_start, period_end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValues {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub revenue_total: i64,
    pub revenue_volatility: f64,
    pub chargeback_count: i32,
    pub chargeback_ratio: f64,
    pub refund_count: i32,
    pub refund_ratio: f64,
    pub payout_reliability: f64,
    pub transaction_count: i32,
    pub average_transaction_size: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregationPolicy {
    pub payout_tolerance: Duration,
}

impl AggregationPolicy {
    pub fn with_tolerance_days(days: i64) -> Self {
        Self {
            payout_tolerance: Duration::days(days),
        }
    }
}

pub fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), EngineError> {
    if start >= end {
        return Err(EngineError::validation(format!(
            "period_start ({start}) must be before period_end ({end})"
        )));
    }
    Ok(())
}

/// Ratios must already be in `[0, 1]`; they are never clamped.
pub fn ensure_ratio(name: &str, value: f64) -> Result<f64, EngineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(EngineError::inconsistency(format!(
            "{name} is outside [0, 1]: {value}"
        )))
    }
}

fn to_count(name: &str, value: usize) -> Result<i32, EngineError> {
    i32::try_from(value)
        .map_err(|_| EngineError::inconsistency(format!("{name} overflows: {value}")))
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Population standard deviation over mean, `0` below two samples or at zero mean.
pub fn coefficient_of_variation(values: &[i64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| {
            let delta = *v as f64 - mean;
            delta * delta
        })
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Latest known state of one payout within the window.
#[derive(Debug, Clone, Copy)]
struct PayoutState {
    status: PayoutStatus,
    expected_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl PayoutState {
    fn is_reliable(&self, tolerance: Duration) -> bool {
        self.status == PayoutStatus::Paid
            && self
                .settled_at
                .is_some_and(|settled| (settled - self.expected_at).abs() <= tolerance)
    }
}

/// Aggregate `events` over `[period_start, period_end)`.
///
/// Events outside the window are ignored, so callers may pass a superset.
pub fn compute_metrics(
    events: &[WindowEvent],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    policy: AggregationPolicy,
) -> Result<MetricValues, EngineError> {
    validate_period(period_start, period_end)?;

    let mut ordered: Vec<&WindowEvent> = events
        .iter()
        .filter(|e| e.occurred_at >= period_start && e.occurred_at < period_end)
        .collect();
    ordered.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then_with(|| a.provider_event_id.cmp(&b.provider_event_id))
    });

    let mut revenue_total: i64 = 0;
    let mut daily_revenue: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut successful_charges = 0usize;
    let mut charges: BTreeSet<&str> = BTreeSet::new();
    let mut charged_back: BTreeSet<&str> = BTreeSet::new();
    let mut refunded: BTreeSet<&str> = BTreeSet::new();
    let mut payouts: BTreeMap<&str, PayoutState> = BTreeMap::new();

    // Reversals may precede their charge in fold order, so they are matched afterwards.
    for event in ordered {
        match &event.payload {
            EventPayload::Charge {
                charge_id,
                amount,
                status,
            } => {
                charges.insert(charge_id.as_str());
                if *status == ChargeStatus::Succeeded {
                    successful_charges += 1;
                    revenue_total = revenue_total.checked_add(*amount).ok_or_else(|| {
                        EngineError::inconsistency("revenue_total overflows i64")
                    })?;
                    let day = daily_revenue
                        .entry(event.occurred_at.date_naive())
                        .or_insert(0);
                    *day = day.checked_add(*amount).ok_or_else(|| {
                        EngineError::inconsistency("daily revenue overflows i64")
                    })?;
                }
            }
            EventPayload::Refund { charge_id, .. } => {
                refunded.insert(charge_id.as_str());
            }
            EventPayload::Chargeback { charge_id, .. } => {
                charged_back.insert(charge_id.as_str());
            }
            EventPayload::Payout {
                payout_id,
                status,
                expected_at,
                settled_at,
                ..
            } => {
                let next = PayoutState {
                    status: *status,
                    expected_at: *expected_at,
                    settled_at: *settled_at,
                };
                payouts
                    .entry(payout_id.as_str())
                    .and_modify(|current| {
                        if next.status.is_terminal() || !current.status.is_terminal() {
                            *current = next;
                        }
                    })
                    .or_insert(next);
            }
        }
    }

    let chargebacks = charged_back.intersection(&charges).count();
    let refunds = refunded.intersection(&charges).count();
    let all_charges = charges.len();

    let settled: Vec<&PayoutState> = payouts
        .values()
        .filter(|payout| payout.status.is_terminal())
        .collect();
    let reliable_payouts = settled
        .iter()
        .filter(|payout| payout.is_reliable(policy.payout_tolerance))
        .count();

    let daily: Vec<i64> = daily_revenue.into_values().collect();
    let revenue_volatility = coefficient_of_variation(&daily);

    let chargeback_ratio = ensure_ratio("chargeback_ratio", ratio(chargebacks, all_charges))?;
    let refund_ratio = ensure_ratio("refund_ratio", ratio(refunds, all_charges))?;
    let payout_reliability = if settled.is_empty() {
        1.0
    } else {
        ensure_ratio(
            "payout_reliability",
            ratio(reliable_payouts, settled.len()),
        )?
    };

    let average_transaction_size = if successful_charges == 0 {
        0.0
    } else {
        revenue_total as f64 / successful_charges as f64
    };

    Ok(MetricValues {
        period_start,
        period_end,
        revenue_total,
        revenue_volatility,
        chargeback_count: to_count("chargeback_count", chargebacks)?,
        chargeback_ratio,
        refund_count: to_count("refund_count", refunds)?,
        refund_ratio,
        payout_reliability,
        transaction_count: to_count("transaction_count", successful_charges)?,
        average_transaction_size,
    })
}
