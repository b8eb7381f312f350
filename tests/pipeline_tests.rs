mod test_utils;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::json;
use uuid::Uuid;

use readiness::ingestion::{IngestionService, WebhookSettings};
use readiness::models::pipeline_run::{self, JobKind, RunStatus};
use readiness::models::raw_event::{self, EventType};
use readiness::models::readiness_score::Tier;
use readiness::models::recommendation::{self, Priority, RecommendationStatus};
use readiness::normalization::{NormalizedEvent, normalize_envelope};
use readiness::pipeline::{Eligibility, PassOutcome, PipelineScheduler};
use readiness::recommendations::RecommendationEngine;
use readiness::recommendations::rules::REDUCE_CHARGEBACKS;
use readiness::repositories::{
    MetricsRepository, PipelineRunRepository, ReadinessRepository, RecommendationRepository,
    SyncStateRepository,
};
use test_utils::{
    ScriptedProvider, charge, chargeback, days_before, payout, payout_envelope, setup_test_db, t0,
    test_config,
};

fn scheduler(db: &DatabaseConnection, provider: Arc<ScriptedProvider>) -> PipelineScheduler {
    PipelineScheduler::new(db.clone(), Arc::new(test_config()), provider)
}

async fn ingest_all(db: &DatabaseConnection, business_id: Uuid, events: &[NormalizedEvent]) {
    let ingestion = IngestionService::new(db.clone(), WebhookSettings::from_config(&test_config()));
    for event in events {
        ingestion.ingest(business_id, event, t0()).await.unwrap();
    }
}

/// Thirty days of constant 1000/day revenue from 50 charges, one chargeback,
/// and ten payouts of which nine settle on time.
fn steady_business(anchor: DateTime<Utc>) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();
    for k in 1..=30 {
        let day = days_before(anchor, k);
        if k <= 10 {
            events.push(charge(&format!("ch_{k}_a"), day, 1_000));
        } else {
            events.push(charge(&format!("ch_{k}_a"), day, 500));
            events.push(charge(&format!("ch_{k}_b"), day + Duration::hours(1), 500));
        }
    }
    events.push(chargeback("cb_1", "ch_5_a", days_before(anchor, 5), 1_000));
    for k in 1..=10 {
        let day = days_before(anchor, k);
        let settled = if k == 10 { day + Duration::days(5) } else { day };
        events.push(payout(&format!("po_{k}"), day, day, Some(settled)));
    }
    events
}

/// Ten days of charges with a 20% chargeback rate.
fn chargeback_heavy(anchor: DateTime<Utc>, prefix: &str) -> Vec<NormalizedEvent> {
    let mut events: Vec<NormalizedEvent> = (1..=10)
        .map(|k| charge(&format!("{prefix}_ch_{k}"), days_before(anchor, k), 1_000))
        .collect();
    events.push(chargeback(
        &format!("{prefix}_cb_1"),
        &format!("{prefix}_ch_2"),
        days_before(anchor, 2),
        1_000,
    ));
    events.push(chargeback(
        &format!("{prefix}_cb_2"),
        &format!("{prefix}_ch_3"),
        days_before(anchor, 3),
        1_000,
    ));
    events
}

async fn pending_chargeback_recs(
    recommendations: &RecommendationRepository,
    business_id: Uuid,
) -> Vec<recommendation::Model> {
    recommendations
        .list(business_id, Some(RecommendationStatus::Pending), None)
        .await
        .unwrap()
        .into_iter()
        .filter(|rec| rec.rule_id == REDUCE_CHARGEBACKS)
        .collect()
}

fn run_of(runs: &[pipeline_run::Model], kind: JobKind) -> &pipeline_run::Model {
    runs.iter()
        .find(|run| run.job_kind == kind)
        .unwrap_or_else(|| panic!("no {kind} run"))
}

#[tokio::test]
async fn steady_business_scores_fifty_five() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();
    ingest_all(&db, business_id, &steady_business(t0())).await;

    let report = scheduler(&db, ScriptedProvider::new())
        .run_pass(business_id, t0())
        .await
        .unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.runs.len(), 4);
    assert!(report.runs.iter().all(|run| run.status == RunStatus::Succeeded));

    let snapshot = MetricsRepository::new(db.clone())
        .latest(business_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.revenue_total, 30_000);
    assert_eq!(snapshot.revenue_volatility, 0.0);
    assert_eq!(snapshot.chargeback_count, 1);
    assert_eq!(snapshot.chargeback_ratio, 0.02);
    assert!((snapshot.payout_reliability - 0.9).abs() < 1e-9);
    assert_eq!(snapshot.transaction_count, 50);
    assert_eq!(snapshot.average_transaction_size, 600.0);

    let score = ReadinessRepository::new(db.clone())
        .latest(business_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(score.score, 55);
    assert_eq!(score.tier, Tier::Improving);
    assert_eq!(score.snapshot_id, snapshot.id);

    let components = score.decoded_components().unwrap();
    assert_eq!(components.volatility, 5);
    assert_eq!(components.chargeback, 0);
    assert_eq!(components.payout, 0);
    assert_eq!(components.trend, 0);

    let recommendations = RecommendationRepository::new(db.clone())
        .for_business(business_id)
        .await
        .unwrap();
    assert!(recommendations.is_empty());
}

#[tokio::test]
async fn provider_outage_for_one_business_leaves_others_untouched() {
    let db = setup_test_db().await.unwrap();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    ingest_all(&db, a, &[charge("a_1", days_before(t0(), 2), 7_000)]).await;
    ingest_all(
        &db,
        b,
        &[
            charge("b_1", days_before(t0(), 2), 1_000),
            charge("b_2", days_before(t0(), 1), 2_000),
        ],
    )
    .await;

    let provider = ScriptedProvider::new();
    provider.set_down(a, true);
    let scheduler = scheduler(&db, provider.clone());

    let stats = scheduler.tick(t0()).await.unwrap();
    assert_eq!(stats.enrolled, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);

    let metrics = MetricsRepository::new(db.clone());
    assert!(metrics.latest(a).await.unwrap().is_none());
    let b_snapshot = metrics.latest(b).await.unwrap().unwrap();
    assert_eq!(b_snapshot.revenue_total, 3_000);
    assert_eq!(b_snapshot.transaction_count, 2);

    let a_runs = PipelineRunRepository::new(db.clone())
        .list_for_business(a, 10)
        .await
        .unwrap();
    let sync = run_of(&a_runs, JobKind::Sync);
    assert_eq!(sync.status, RunStatus::Failed);
    assert_eq!(sync.attempt, 1);
    assert_eq!(
        sync.next_eligible_at.map(|at| at.with_timezone(&Utc)),
        Some(t0() + Duration::seconds(30))
    );
    for kind in [JobKind::Aggregate, JobKind::Score, JobKind::Recommend] {
        assert_eq!(run_of(&a_runs, kind).status, RunStatus::Skipped);
    }

    // A backs off while B keeps running.
    let later = t0() + Duration::seconds(10);
    let stats = scheduler.tick(later).await.unwrap();
    assert_eq!(stats.ineligible, 1);
    assert_eq!(stats.completed, 1);

    let a_state = SyncStateRepository::new(db.clone()).get(a).await.unwrap().unwrap();
    assert_eq!(
        scheduler.eligibility(&a_state, later).await.unwrap(),
        Eligibility::BackingOff {
            job_kind: JobKind::Sync,
            until: t0() + Duration::seconds(30),
        }
    );
}

#[tokio::test]
async fn unreadable_event_dead_letters_only_its_business() {
    let db = setup_test_db().await.unwrap();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    SyncStateRepository::enroll(&db, a, t0()).await.unwrap();
    raw_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(a),
        provider_event_id: Set("evt_corrupt".to_string()),
        event_type: Set(EventType::Charge),
        occurred_at: Set(days_before(t0(), 2).fixed_offset()),
        payload: Set(json!({ "kind": "mystery" })),
        received_at: Set(t0().fixed_offset()),
    }
    .insert(&db)
    .await
    .unwrap();
    ingest_all(&db, b, &[charge("b_1", days_before(t0(), 3), 4_200)]).await;

    let stats = scheduler(&db, ScriptedProvider::new())
        .tick(t0())
        .await
        .unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);

    let b_snapshot = MetricsRepository::new(db.clone())
        .latest(b)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(b_snapshot.revenue_total, 4_200);

    let dead = PipelineRunRepository::new(db.clone())
        .dead_letters(10)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].business_id, a);
    assert_eq!(dead[0].job_kind, JobKind::Aggregate);
    assert_eq!(dead[0].error.as_ref().unwrap()["kind"], "internal_inconsistency");

    let a_state = SyncStateRepository::new(db.clone()).get(a).await.unwrap().unwrap();
    assert!(a_state.needs_resync);
}

#[tokio::test]
async fn exhausted_retries_wait_for_manual_resync() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();
    ingest_all(&db, business_id, &[charge("ch_1", days_before(t0(), 1), 1_000)]).await;

    let provider = ScriptedProvider::new();
    provider.set_down(business_id, true);
    let scheduler = scheduler(&db, provider.clone());

    // Backoff doubles from 30s; the third attempt exhausts max_attempts.
    let attempts = [
        t0(),
        t0() + Duration::seconds(31),
        t0() + Duration::seconds(92),
    ];
    for at in attempts {
        let stats = scheduler.tick(at).await.unwrap();
        assert_eq!(stats.failed, 1, "tick at {at}");
    }

    let runs = PipelineRunRepository::new(db.clone());
    let sync = runs
        .latest_attempt(business_id, JobKind::Sync)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sync.status, RunStatus::DeadLettered);
    assert_eq!(sync.attempt, 3);

    let stats = scheduler.tick(t0() + Duration::seconds(200)).await.unwrap();
    assert_eq!(stats.ineligible, 1);

    provider.set_down(business_id, false);
    let state = scheduler
        .resync(business_id, t0() + Duration::seconds(300))
        .await
        .unwrap();
    assert!(!state.needs_resync);

    let stats = scheduler.tick(t0() + Duration::seconds(301)).await.unwrap();
    assert_eq!(stats.completed, 1);
    let sync = runs
        .latest_attempt(business_id, JobKind::Sync)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sync.status, RunStatus::Succeeded);
    assert_eq!(sync.attempt, 1);
}

#[tokio::test]
async fn resync_of_unknown_business_is_not_found() {
    let db = setup_test_db().await.unwrap();
    let err = scheduler(&db, ScriptedProvider::new())
        .resync(Uuid::new_v4(), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, readiness::error::EngineError::NotFound(_)));
}

#[tokio::test]
async fn dismissed_recommendation_is_suppressed_for_thirty_days() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();
    ingest_all(&db, business_id, &chargeback_heavy(t0(), "w1")).await;
    let scheduler = scheduler(&db, ScriptedProvider::new());
    let recommendations = RecommendationRepository::new(db.clone());

    scheduler.run_pass(business_id, t0()).await.unwrap();
    let issued = pending_chargeback_recs(&recommendations, business_id).await;
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].priority, Priority::High);
    assert_eq!(issued[0].estimated_impact, 15);

    let dismissed = RecommendationEngine::new(db.clone(), 30)
        .update_status(issued[0].id, RecommendationStatus::Dismissed, t0())
        .await
        .unwrap();
    assert_eq!(
        dismissed.suppressed_until.map(|at| at.with_timezone(&Utc)),
        Some(t0() + Duration::days(30))
    );

    let report = scheduler
        .run_pass(business_id, t0() + Duration::days(10))
        .await
        .unwrap();
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert!(pending_chargeback_recs(&recommendations, business_id).await.is_empty());

    let t31 = t0() + Duration::days(31);
    ingest_all(&db, business_id, &chargeback_heavy(t31, "w2")).await;
    scheduler.run_pass(business_id, t31).await.unwrap();
    assert_eq!(pending_chargeback_recs(&recommendations, business_id).await.len(), 1);
}

#[tokio::test]
async fn payout_lifecycle_events_count_once_per_payout() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();

    let mut events = Vec::new();
    for k in 1..=5 {
        let expected = days_before(t0(), k);
        let payout_id = format!("po_{k}");
        let created = payout_envelope(
            &format!("evt_created_{k}"),
            "payout.created",
            &payout_id,
            expected - Duration::days(1),
            expected,
            None,
        );
        let paid = payout_envelope(
            &format!("evt_paid_{k}"),
            "payout.paid",
            &payout_id,
            expected,
            expected,
            Some(expected),
        );
        events.push(normalize_envelope(&created).unwrap());
        events.push(normalize_envelope(&paid).unwrap());
    }
    // Announced yesterday, due in three days.
    let upcoming = payout_envelope(
        "evt_created_6",
        "payout.created",
        "po_6",
        days_before(t0(), 1),
        t0() + Duration::days(3),
        None,
    );
    events.push(normalize_envelope(&upcoming).unwrap());
    ingest_all(&db, business_id, &events).await;

    let report = scheduler(&db, ScriptedProvider::new())
        .run_pass(business_id, t0())
        .await
        .unwrap();
    assert_eq!(report.outcome, PassOutcome::Completed);

    let snapshot = MetricsRepository::new(db.clone())
        .latest(business_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.payout_reliability, 1.0);

    let score = ReadinessRepository::new(db.clone())
        .latest(business_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(score.decoded_components().unwrap().payout, 10);
}

#[tokio::test]
async fn disputes_of_charges_from_an_earlier_window_do_not_dead_letter() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();
    ingest_all(
        &db,
        business_id,
        &[
            charge("ch_old_1", days_before(t0(), 40), 1_000),
            charge("ch_old_2", days_before(t0(), 39), 1_000),
            charge("ch_new", days_before(t0(), 2), 1_000),
            chargeback("cb_1", "ch_old_1", days_before(t0(), 1), 1_000),
            chargeback("cb_2", "ch_old_2", days_before(t0(), 1), 1_000),
        ],
    )
    .await;

    let report = scheduler(&db, ScriptedProvider::new())
        .run_pass(business_id, t0())
        .await
        .unwrap();
    assert_eq!(report.outcome, PassOutcome::Completed);

    let snapshot = MetricsRepository::new(db.clone())
        .latest(business_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.transaction_count, 1);
    assert_eq!(snapshot.chargeback_count, 0);
    assert_eq!(snapshot.chargeback_ratio, 0.0);

    let state = SyncStateRepository::new(db.clone())
        .get(business_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!state.needs_resync);
}

#[tokio::test]
async fn hung_provider_times_out_then_dead_letters() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();
    ingest_all(&db, business_id, &[charge("ch_1", days_before(t0(), 1), 1_000)]).await;

    let provider = ScriptedProvider::new();
    provider.set_hung(business_id, true);
    let mut config = test_config();
    config.pipeline.stage_timeout_seconds = 1;
    let scheduler = PipelineScheduler::new(db.clone(), Arc::new(config), provider);

    let report = scheduler.run_pass(business_id, t0()).await.unwrap();
    assert_eq!(
        report.outcome,
        PassOutcome::Failed {
            job_kind: JobKind::Sync,
            dead_lettered: false,
        }
    );
    let sync = run_of(&report.runs, JobKind::Sync);
    assert_eq!(sync.status, RunStatus::Failed);
    let error = sync.error.as_ref().unwrap();
    assert_eq!(error["kind"], "timeout");
    assert_eq!(error["retryable"], true);
    assert_eq!(
        sync.next_eligible_at.map(|at| at.with_timezone(&Utc)),
        Some(t0() + Duration::seconds(30))
    );
    for kind in [JobKind::Aggregate, JobKind::Score, JobKind::Recommend] {
        assert_eq!(run_of(&report.runs, kind).status, RunStatus::Skipped);
    }

    let mut last = report;
    for at in [t0() + Duration::seconds(31), t0() + Duration::seconds(92)] {
        last = scheduler.run_pass(business_id, at).await.unwrap();
    }
    assert_eq!(
        last.outcome,
        PassOutcome::Failed {
            job_kind: JobKind::Sync,
            dead_lettered: true,
        }
    );
    let sync = run_of(&last.runs, JobKind::Sync);
    assert_eq!(sync.status, RunStatus::DeadLettered);
    assert_eq!(sync.attempt, 3);
    assert_eq!(sync.error.as_ref().unwrap()["kind"], "timeout");

    let state = SyncStateRepository::new(db.clone())
        .get(business_id)
        .await
        .unwrap()
        .unwrap();
    assert!(state.needs_resync);
}
