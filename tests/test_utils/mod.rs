//! Test utilities for database testing.
//!
//! In-memory SQLite with all migrations applied, event builders in both the
//! normalized and the provider-envelope shape, and a scripted payment provider.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::{Value, json};
use uuid::Uuid;

use readiness::config::{AppConfig, PipelineConfig};
use readiness::error::EngineError;
use readiness::normalization::{ChargeStatus, EventPayload, NormalizedEvent, PayoutStatus};
use readiness::provider::{EventPage, PaymentProvider};

pub const OPERATOR_TOKEN: &str = "test-operator-token";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// A single pooled connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Local-profile configuration with a deterministic pipeline (no jitter).
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        webhook_signing_secret: Some(WEBHOOK_SECRET.to_string()),
        pipeline: PipelineConfig {
            concurrency: 4,
            stage_timeout_seconds: 30,
            max_attempts: 3,
            backoff_base_seconds: 30,
            backoff_max_seconds: 3600,
            backoff_jitter_factor: 0.0,
            ..PipelineConfig::default()
        },
        ..AppConfig::default()
    }
}

/// Fixed reference clock used by pipeline tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
}

/// Noon UTC, `days` before `anchor`'s midnight.
pub fn days_before(anchor: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    anchor - Duration::days(days) + Duration::hours(12)
}

pub fn charge(id: &str, occurred_at: DateTime<Utc>, amount: i64) -> NormalizedEvent {
    NormalizedEvent {
        provider_event_id: id.to_string(),
        occurred_at,
        payload: EventPayload::Charge {
            charge_id: id.to_string(),
            amount,
            status: ChargeStatus::Succeeded,
        },
    }
}

/// A chargeback reversing the charge built with `charge(charge_id, ..)`.
pub fn chargeback(
    id: &str,
    charge_id: &str,
    occurred_at: DateTime<Utc>,
    amount: i64,
) -> NormalizedEvent {
    NormalizedEvent {
        provider_event_id: id.to_string(),
        occurred_at,
        payload: EventPayload::Chargeback {
            charge_id: charge_id.to_string(),
            amount,
        },
    }
}

pub fn payout(
    id: &str,
    occurred_at: DateTime<Utc>,
    expected_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
) -> NormalizedEvent {
    NormalizedEvent {
        provider_event_id: id.to_string(),
        occurred_at,
        payload: EventPayload::Payout {
            payout_id: id.to_string(),
            amount: 10_000,
            status: PayoutStatus::Paid,
            expected_at,
            settled_at,
        },
    }
}

/// Provider envelope for a succeeded charge.
pub fn charge_envelope(id: &str, created: DateTime<Utc>, amount: i64) -> Value {
    json!({
        "id": id,
        "type": "charge.succeeded",
        "created": created.to_rfc3339(),
        "data": { "amount": amount }
    })
}

pub fn chargeback_envelope(
    id: &str,
    charge_id: &str,
    created: DateTime<Utc>,
    amount: i64,
) -> Value {
    json!({
        "id": id,
        "type": "chargeback.created",
        "created": created.to_rfc3339(),
        "data": { "amount": amount, "charge": charge_id }
    })
}

/// Provider envelope for one payout lifecycle event; `kind` is e.g. `payout.paid`.
pub fn payout_envelope(
    id: &str,
    kind: &str,
    payout_id: &str,
    created: DateTime<Utc>,
    expected_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
) -> Value {
    json!({
        "id": id,
        "type": kind,
        "created": created.to_rfc3339(),
        "data": {
            "id": payout_id,
            "amount": 10_000,
            "expected_at": expected_at.to_rfc3339(),
            "settled_at": settled_at.map(|at| at.to_rfc3339()),
        }
    })
}

/// Payment provider whose pages are queued per business.
///
/// Businesses without queued pages see an empty history. Businesses marked as
/// down fail every fetch with a retryable upstream error; hung businesses never
/// get an answer.
#[derive(Default)]
pub struct ScriptedProvider {
    pages: Mutex<HashMap<Uuid, VecDeque<EventPage>>>,
    down: Mutex<HashSet<Uuid>>,
    hung: Mutex<HashSet<Uuid>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, business_id: Uuid, page: EventPage) {
        self.pages
            .lock()
            .unwrap()
            .entry(business_id)
            .or_default()
            .push_back(page);
    }

    pub fn set_down(&self, business_id: Uuid, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(business_id);
        } else {
            set.remove(&business_id);
        }
    }

    pub fn set_hung(&self, business_id: Uuid, hung: bool) {
        let mut set = self.hung.lock().unwrap();
        if hung {
            set.insert(business_id);
        } else {
            set.remove(&business_id);
        }
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn fetch_events(
        &self,
        business_id: Uuid,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<EventPage, EngineError> {
        if self.down.lock().unwrap().contains(&business_id) {
            return Err(EngineError::upstream("simulated provider outage"));
        }
        let hung = self.hung.lock().unwrap().contains(&business_id);
        if hung {
            std::future::pending::<()>().await;
        }
        let page = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&business_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        Ok(page)
    }
}
