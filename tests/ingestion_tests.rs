mod test_utils;

use chrono::Utc;
use uuid::Uuid;

use readiness::error::EngineError;
use readiness::ingestion::{IngestOutcome, IngestionService, WebhookSettings};
use readiness::repositories::{EventRepository, SyncStateRepository};
use readiness::webhook_verification::sign_payload;
use test_utils::{WEBHOOK_SECRET, charge, charge_envelope, setup_test_db, t0, test_config};

fn service(db: &sea_orm::DatabaseConnection) -> IngestionService {
    IngestionService::new(db.clone(), WebhookSettings::from_config(&test_config()))
}

#[tokio::test]
async fn redelivery_is_reported_as_duplicate() {
    let db = setup_test_db().await.unwrap();
    let ingestion = service(&db);
    let business_id = Uuid::new_v4();
    let event = charge("evt_1", t0(), 1_500);

    let first = ingestion.ingest(business_id, &event, t0()).await.unwrap();
    let second = ingestion.ingest(business_id, &event, t0()).await.unwrap();

    assert_eq!(first, IngestOutcome::Inserted);
    assert_eq!(second, IngestOutcome::Duplicate);
    let stored = EventRepository::new(db.clone())
        .count_for_business(business_id)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn idempotency_key_is_scoped_per_business() {
    let db = setup_test_db().await.unwrap();
    let ingestion = service(&db);
    let event = charge("evt_shared", t0(), 900);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    assert_eq!(
        ingestion.ingest(a, &event, t0()).await.unwrap(),
        IngestOutcome::Inserted
    );
    assert_eq!(
        ingestion.ingest(b, &event, t0()).await.unwrap(),
        IngestOutcome::Inserted
    );
}

#[tokio::test]
async fn first_event_enrolls_the_business() {
    let db = setup_test_db().await.unwrap();
    let business_id = Uuid::new_v4();

    service(&db)
        .ingest(business_id, &charge("evt_1", t0(), 100), t0())
        .await
        .unwrap();

    let state = SyncStateRepository::new(db.clone())
        .get(business_id)
        .await
        .unwrap()
        .expect("business enrolled");
    assert!(!state.needs_resync);
    assert!(state.cursor.is_none());
}

#[tokio::test]
async fn signed_webhook_is_stored_once() {
    let db = setup_test_db().await.unwrap();
    let ingestion = service(&db);
    let business_id = Uuid::new_v4();
    let now = Utc::now();

    let body = serde_json::to_vec(&charge_envelope("evt_wh_1", now, 2_000)).unwrap();
    let header = sign_payload(WEBHOOK_SECRET, business_id, now.timestamp() as u64, &body).unwrap();

    let first = ingestion
        .ingest_webhook(business_id, &body, Some(&header), now)
        .await
        .unwrap();
    let second = ingestion
        .ingest_webhook(business_id, &body, Some(&header), now)
        .await
        .unwrap();

    assert_eq!(first, IngestOutcome::Inserted);
    assert_eq!(second, IngestOutcome::Duplicate);
}

#[tokio::test]
async fn bad_signature_is_rejected_without_storing() {
    let db = setup_test_db().await.unwrap();
    let ingestion = service(&db);
    let business_id = Uuid::new_v4();
    let now = Utc::now();

    let body = serde_json::to_vec(&charge_envelope("evt_forged", now, 2_000)).unwrap();
    let header = sign_payload("not-the-secret", business_id, now.timestamp() as u64, &body).unwrap();

    let err = ingestion
        .ingest_webhook(business_id, &body, Some(&header), now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Authentication(_)));

    let err = ingestion
        .ingest_webhook(business_id, &body, None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Authentication(_)));

    let stored = EventRepository::new(db.clone())
        .count_for_business(business_id)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn signed_but_malformed_payload_is_a_validation_failure() {
    let db = setup_test_db().await.unwrap();
    let now = Utc::now();
    let body = br#"{"id":"evt_bad","type":"charge.succeeded","created":"2025-01-01T00:00:00Z","data":{"amount":-5}}"#;
    let business_id = Uuid::new_v4();
    let header = sign_payload(WEBHOOK_SECRET, business_id, now.timestamp() as u64, body).unwrap();

    let err = service(&db)
        .ingest_webhook(business_id, body, Some(&header), now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn delivery_signed_for_one_business_is_rejected_for_another() {
    let db = setup_test_db().await.unwrap();
    let ingestion = service(&db);
    let (owner, other) = (Uuid::new_v4(), Uuid::new_v4());
    let now = Utc::now();

    let body = serde_json::to_vec(&charge_envelope("evt_replayed", now, 2_000)).unwrap();
    let header = sign_payload(WEBHOOK_SECRET, owner, now.timestamp() as u64, &body).unwrap();

    let err = ingestion
        .ingest_webhook(other, &body, Some(&header), now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Authentication(_)));

    let events = EventRepository::new(db.clone());
    assert_eq!(events.count_for_business(other).await.unwrap(), 0);

    let outcome = ingestion
        .ingest_webhook(owner, &body, Some(&header), now)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Inserted);
}
