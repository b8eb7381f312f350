//! # Readiness Scoring
//!
//! Fixed-magnitude heuristic over one metrics snapshot. Each factor contributes
//! one of a few constant adjustments to a base of 50; the sum is clamped to
//! `[0, 100]` and banded into a [`Tier`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregation::ensure_ratio;
use crate::db::to_db_time;
use crate::error::EngineError;
use crate::models::metrics_snapshot;
use crate::models::readiness_score::{self, ScoreComponents, Tier};

mod service;

pub use service::ReadinessScorer;

pub const BASE_SCORE: i32 = 50;
pub const MIN_SCORE: i32 = 0;
pub const MAX_SCORE: i32 = 100;

const VOLATILITY_HIGH: f64 = 0.5;
const VOLATILITY_LOW: f64 = 0.2;
const CHARGEBACK_HIGH: f64 = 0.02;
const CHARGEBACK_LOW: f64 = 0.005;
const PAYOUT_RELIABLE: f64 = 0.95;
const PAYOUT_UNRELIABLE: f64 = 0.80;

/// Result of scoring a snapshot, before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScoreBreakdown {
    pub base: i32,
    pub components: ScoreComponents,
    pub score: i32,
    pub tier: Tier,
}

pub fn tier_for(score: i32) -> Tier {
    match score {
        i32::MIN..=40 => Tier::NotReady,
        41..=70 => Tier::Improving,
        71..=85 => Tier::FundingReady,
        _ => Tier::HighlyAttractive,
    }
}

fn trend_adjustment(current: i64, previous: Option<i64>) -> i32 {
    match previous {
        Some(prev) if current > prev => 10,
        Some(prev) if current < prev => -5,
        _ => 0,
    }
}

fn volatility_adjustment(volatility: f64) -> i32 {
    if volatility > VOLATILITY_HIGH {
        -10
    } else if volatility < VOLATILITY_LOW {
        5
    } else {
        0
    }
}

fn chargeback_adjustment(ratio: f64) -> i32 {
    if ratio > CHARGEBACK_HIGH {
        -15
    } else if ratio < CHARGEBACK_LOW {
        5
    } else {
        0
    }
}

fn payout_adjustment(reliability: f64) -> i32 {
    if reliability > PAYOUT_RELIABLE {
        10
    } else if reliability < PAYOUT_UNRELIABLE {
        -10
    } else {
        0
    }
}

fn validate_snapshot(snapshot: &metrics_snapshot::Model) -> Result<(), EngineError> {
    ensure_ratio("chargeback_ratio", snapshot.chargeback_ratio)?;
    ensure_ratio("refund_ratio", snapshot.refund_ratio)?;
    ensure_ratio("payout_reliability", snapshot.payout_reliability)?;
    if !snapshot.revenue_volatility.is_finite() || snapshot.revenue_volatility < 0.0 {
        return Err(EngineError::inconsistency(format!(
            "revenue_volatility is invalid: {}",
            snapshot.revenue_volatility
        )));
    }
    if snapshot.transaction_count < 0 {
        return Err(EngineError::inconsistency(format!(
            "transaction_count is negative: {}",
            snapshot.transaction_count
        )));
    }
    Ok(())
}

/// Score `snapshot` against the prior period, if any. Pure.
pub fn evaluate(
    snapshot: &metrics_snapshot::Model,
    previous: Option<&metrics_snapshot::Model>,
) -> Result<ScoreBreakdown, EngineError> {
    validate_snapshot(snapshot)?;

    let components = ScoreComponents {
        trend: trend_adjustment(snapshot.revenue_total, previous.map(|p| p.revenue_total)),
        volatility: volatility_adjustment(snapshot.revenue_volatility),
        chargeback: chargeback_adjustment(snapshot.chargeback_ratio),
        payout: payout_adjustment(snapshot.payout_reliability),
    };
    let score = (BASE_SCORE + components.total()).clamp(MIN_SCORE, MAX_SCORE);

    Ok(ScoreBreakdown {
        base: BASE_SCORE,
        components,
        score,
        tier: tier_for(score),
    })
}

/// Build the persisted score row for `snapshot`, stamped with `computed_at`.
pub fn score(
    snapshot: &metrics_snapshot::Model,
    previous: Option<&metrics_snapshot::Model>,
    computed_at: DateTime<Utc>,
) -> Result<readiness_score::Model, EngineError> {
    let breakdown = evaluate(snapshot, previous)?;
    let components = serde_json::to_value(breakdown.components).map_err(|err| {
        EngineError::inconsistency(format!("failed to encode score components: {err}"))
    })?;

    Ok(readiness_score::Model {
        id: Uuid::new_v4(),
        business_id: snapshot.business_id,
        snapshot_id: snapshot.id,
        score: breakdown.score,
        tier: breakdown.tier,
        components,
        computed_at: to_db_time(computed_at),
    })
}
