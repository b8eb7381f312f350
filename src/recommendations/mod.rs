//! # Recommendation Engine
//!
//! Maps score components to prioritized recommendations. Issuance is
//! de-duplicated per `(business_id, rule_id)`:
//! - a pending recommendation for the rule blocks a new one
//! - a dismissal suppresses the rule until `suppressed_until`
//! - otherwise a fresh pending recommendation is issued

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::db::{from_db_time, to_db_time};
use crate::error::EngineError;
use crate::models::recommendation::{self, Priority, RecommendationStatus};
use crate::models::{metrics_snapshot, readiness_score};

pub mod rules;
mod service;

pub use rules::{Rule, RuleInput};
pub use service::RecommendationEngine;

/// `|impact| > 10` is high, `5..=10` medium, below that low.
pub fn priority_for(impact: i32) -> Priority {
    match impact.unsigned_abs() {
        11.. => Priority::High,
        5..=10 => Priority::Medium,
        _ => Priority::Low,
    }
}

fn latest_per_rule(existing: &[recommendation::Model]) -> HashMap<&str, &recommendation::Model> {
    let mut latest: HashMap<&str, &recommendation::Model> = HashMap::new();
    for rec in existing {
        latest
            .entry(rec.rule_id.as_str())
            .and_modify(|current| {
                if rec.created_at > current.created_at {
                    *current = rec;
                }
            })
            .or_insert(rec);
    }
    latest
}

fn is_suppressed(latest: Option<&&recommendation::Model>, now: DateTime<Utc>) -> bool {
    let Some(latest) = latest else {
        return false;
    };
    latest.status == RecommendationStatus::Dismissed
        && latest
            .suppressed_until
            .is_some_and(|until| now < from_db_time(until))
}

/// Evaluate every rule and return only the recommendations to create.
///
/// `existing` is the business's full recommendation history; it is never modified.
pub fn generate(
    business_id: Uuid,
    score: &readiness_score::Model,
    snapshot: &metrics_snapshot::Model,
    existing: &[recommendation::Model],
    now: DateTime<Utc>,
) -> Result<Vec<recommendation::Model>, EngineError> {
    if score.business_id != business_id || snapshot.business_id != business_id {
        return Err(EngineError::inconsistency(format!(
            "score/snapshot do not belong to business {business_id}"
        )));
    }

    let input = RuleInput {
        snapshot,
        score: score.score,
        components: score.decoded_components()?,
    };
    let latest = latest_per_rule(existing);
    let timestamp = to_db_time(now);

    let mut issued = Vec::new();
    for rule in rules::registry() {
        let Some(impact) = (rule.evaluate)(&input) else {
            continue;
        };

        let has_pending = existing
            .iter()
            .any(|rec| rec.rule_id == rule.id && rec.status == RecommendationStatus::Pending);
        if has_pending || is_suppressed(latest.get(rule.id), now) {
            continue;
        }

        issued.push(recommendation::Model {
            id: Uuid::new_v4(),
            business_id,
            rule_id: rule.id.to_string(),
            title: rule.title.to_string(),
            description: rule.description.to_string(),
            priority: priority_for(impact),
            category: rule.category,
            status: RecommendationStatus::Pending,
            estimated_impact: impact.abs(),
            created_at: timestamp,
            updated_at: timestamp,
            suppressed_until: None,
        });
    }

    Ok(issued)
}

/// Compute the record after moving `current` to `new_status`.
///
/// Returns `None` when nothing changes. Leaving a resolved state is rejected.
pub fn transition(
    current: &recommendation::Model,
    new_status: RecommendationStatus,
    now: DateTime<Utc>,
    suppression: Duration,
) -> Result<Option<recommendation::Model>, EngineError> {
    if current.status == new_status {
        return Ok(None);
    }
    if current.status.is_resolved() {
        return Err(EngineError::validation(format!(
            "recommendation {} is already {:?} and cannot become {:?}",
            current.id, current.status, new_status
        )));
    }

    let mut updated = current.clone();
    updated.status = new_status;
    updated.updated_at = to_db_time(now);
    if new_status == RecommendationStatus::Dismissed {
        updated.suppressed_until = Some(to_db_time(now + suppression));
    }
    Ok(Some(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::readiness_score::{ScoreComponents, Tier};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn snapshot(business_id: Uuid) -> metrics_snapshot::Model {
        metrics_snapshot::Model {
            id: Uuid::new_v4(),
            business_id,
            period_start: to_db_time(now() - Duration::days(30)),
            period_end: to_db_time(now()),
            revenue_total: 5_000,
            revenue_volatility: 0.8,
            chargeback_count: 5,
            chargeback_ratio: 0.05,
            refund_count: 0,
            refund_ratio: 0.0,
            payout_reliability: 0.5,
            transaction_count: 100,
            average_transaction_size: 50.0,
            computed_at: to_db_time(now()),
        }
    }

    fn score_for(snapshot: &metrics_snapshot::Model) -> readiness_score::Model {
        crate::scoring::score(snapshot, None, now()).unwrap()
    }

    fn existing(
        business_id: Uuid,
        rule_id: &str,
        status: RecommendationStatus,
        created_at: DateTime<Utc>,
        suppressed_until: Option<DateTime<Utc>>,
    ) -> recommendation::Model {
        recommendation::Model {
            id: Uuid::new_v4(),
            business_id,
            rule_id: rule_id.to_string(),
            title: "t".into(),
            description: "d".into(),
            priority: Priority::High,
            category: recommendation::Category::Risk,
            status,
            estimated_impact: 15,
            created_at: to_db_time(created_at),
            updated_at: to_db_time(created_at),
            suppressed_until: suppressed_until.map(to_db_time),
        }
    }

    #[test]
    fn priority_classification_boundaries() {
        assert_eq!(priority_for(-15), Priority::High);
        assert_eq!(priority_for(11), Priority::High);
        assert_eq!(priority_for(-10), Priority::Medium);
        assert_eq!(priority_for(5), Priority::Medium);
        assert_eq!(priority_for(-4), Priority::Low);
        assert_eq!(priority_for(0), Priority::Low);
    }

    #[test]
    fn all_rules_fire_on_weak_snapshot() {
        let business_id = Uuid::new_v4();
        let snap = snapshot(business_id);
        let score = score_for(&snap);
        // 50 - 10 - 15 - 10
        assert_eq!(score.score, 15);
        assert_eq!(score.tier, Tier::NotReady);

        let issued = generate(business_id, &score, &snap, &[], now()).unwrap();
        let summary: Vec<_> = issued
            .iter()
            .map(|r| (r.rule_id.as_str(), r.priority, r.estimated_impact))
            .collect();
        assert_eq!(
            summary,
            vec![
                (rules::REDUCE_CHARGEBACKS, Priority::High, 15),
                (rules::STABILIZE_REVENUE, Priority::Medium, 10),
                (rules::IMPROVE_PAYOUT_TIMING, Priority::Medium, 10),
                (rules::FOCUS_CORE_METRICS, Priority::High, 35),
            ]
        );
        assert!(issued.iter().all(|r| r.status == RecommendationStatus::Pending));
    }

    #[test]
    fn healthy_snapshot_issues_nothing() {
        let business_id = Uuid::new_v4();
        let mut snap = snapshot(business_id);
        snap.revenue_volatility = 0.1;
        snap.chargeback_ratio = 0.0;
        snap.payout_reliability = 1.0;
        let score = score_for(&snap);
        assert_eq!(
            score.decoded_components().unwrap(),
            ScoreComponents {
                trend: 0,
                volatility: 5,
                chargeback: 5,
                payout: 10,
            }
        );

        assert!(generate(business_id, &score, &snap, &[], now()).unwrap().is_empty());
    }

    #[test]
    fn pending_recommendation_is_not_duplicated() {
        let business_id = Uuid::new_v4();
        let snap = snapshot(business_id);
        let score = score_for(&snap);
        let history = vec![existing(
            business_id,
            rules::REDUCE_CHARGEBACKS,
            RecommendationStatus::Pending,
            now() - Duration::days(3),
            None,
        )];

        let issued = generate(business_id, &score, &snap, &history, now()).unwrap();
        assert!(issued.iter().all(|r| r.rule_id != rules::REDUCE_CHARGEBACKS));
        assert_eq!(issued.len(), 3);
    }

    #[test]
    fn dismissal_suppresses_until_window_ends() {
        let business_id = Uuid::new_v4();
        let snap = snapshot(business_id);
        let score = score_for(&snap);
        let t0 = now();
        let history = vec![existing(
            business_id,
            rules::REDUCE_CHARGEBACKS,
            RecommendationStatus::Dismissed,
            t0 - Duration::days(1),
            Some(t0 + Duration::days(30)),
        )];

        let at_ten_days = generate(business_id, &score, &snap, &history, t0 + Duration::days(10))
            .unwrap();
        assert!(at_ten_days
            .iter()
            .all(|r| r.rule_id != rules::REDUCE_CHARGEBACKS));

        let at_expiry = generate(business_id, &score, &snap, &history, t0 + Duration::days(30))
            .unwrap();
        assert!(at_expiry
            .iter()
            .any(|r| r.rule_id == rules::REDUCE_CHARGEBACKS));
    }

    #[test]
    fn accepted_rule_can_be_reissued() {
        let business_id = Uuid::new_v4();
        let snap = snapshot(business_id);
        let score = score_for(&snap);
        let history = vec![existing(
            business_id,
            rules::STABILIZE_REVENUE,
            RecommendationStatus::Accepted,
            now() - Duration::days(40),
            None,
        )];

        let issued = generate(business_id, &score, &snap, &history, now()).unwrap();
        assert!(issued.iter().any(|r| r.rule_id == rules::STABILIZE_REVENUE));
    }

    #[test]
    fn only_most_recent_record_decides_suppression() {
        let business_id = Uuid::new_v4();
        let snap = snapshot(business_id);
        let score = score_for(&snap);
        let history = vec![
            existing(
                business_id,
                rules::IMPROVE_PAYOUT_TIMING,
                RecommendationStatus::Dismissed,
                now() - Duration::days(20),
                Some(now() + Duration::days(10)),
            ),
            existing(
                business_id,
                rules::IMPROVE_PAYOUT_TIMING,
                RecommendationStatus::Accepted,
                now() - Duration::days(5),
                None,
            ),
        ];

        let issued = generate(business_id, &score, &snap, &history, now()).unwrap();
        assert!(issued.iter().any(|r| r.rule_id == rules::IMPROVE_PAYOUT_TIMING));
    }

    #[test]
    fn rejects_foreign_score() {
        let snap = snapshot(Uuid::new_v4());
        let score = score_for(&snap);
        assert!(matches!(
            generate(Uuid::new_v4(), &score, &snap, &[], now()),
            Err(EngineError::InternalInconsistency(_))
        ));
    }

    #[test]
    fn transitions_are_idempotent_and_terminal() {
        let business_id = Uuid::new_v4();
        let pending = existing(
            business_id,
            rules::REDUCE_CHARGEBACKS,
            RecommendationStatus::Pending,
            now(),
            None,
        );
        let window = Duration::days(30);

        assert!(transition(&pending, RecommendationStatus::Pending, now(), window)
            .unwrap()
            .is_none());

        let dismissed = transition(&pending, RecommendationStatus::Dismissed, now(), window)
            .unwrap()
            .unwrap();
        assert_eq!(dismissed.status, RecommendationStatus::Dismissed);
        assert_eq!(
            dismissed.suppressed_until.map(from_db_time),
            Some(now() + window)
        );

        assert!(transition(&dismissed, RecommendationStatus::Dismissed, now(), window)
            .unwrap()
            .is_none());
        assert!(matches!(
            transition(&dismissed, RecommendationStatus::Accepted, now(), window),
            Err(EngineError::Validation(_))
        ));

        let accepted = transition(&pending, RecommendationStatus::Accepted, now(), window)
            .unwrap()
            .unwrap();
        assert!(accepted.suppressed_until.is_none());
        assert!(matches!(
            transition(&accepted, RecommendationStatus::Pending, now(), window),
            Err(EngineError::Validation(_))
        ));
    }
}
