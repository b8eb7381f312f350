//! # Ingestion Service
//!
//! Idempotent entry point into the event store. Events arrive either pushed
//! (signed webhook bodies) or pulled page by page from a [`PaymentProvider`].
//! The idempotency key is `(business_id, provider_event_id)`: a re-delivery is
//! reported as [`IngestOutcome::Duplicate`] and changes nothing.

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{AppConfig, ProviderConfig};
use crate::error::EngineError;
use crate::normalization::{NormalizedEvent, normalize_body, normalize_envelope};
use crate::provider::PaymentProvider;
use crate::repositories::{EventRepository, SyncStateRepository};
use crate::webhook_verification::verify_signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Inserted,
    Duplicate,
}

impl IngestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestOutcome::Inserted => "inserted",
            IngestOutcome::Duplicate => "duplicate",
        }
    }

    fn record(self) {
        counter!("ingest_events_total", "outcome" => self.as_str()).increment(1);
    }
}

/// Webhook authentication settings.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub signing_secret: Option<String>,
    pub tolerance_seconds: u64,
}

impl WebhookSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            signing_secret: config.webhook_signing_secret.clone(),
            tolerance_seconds: config.webhook_tolerance_seconds,
        }
    }
}

/// Totals for one pull-sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncReport {
    pub pages: u32,
    pub inserted: u64,
    pub duplicates: u64,
    /// Entries dropped because they failed normalization
    pub skipped: u64,
    pub cursor: Option<String>,
}

pub struct IngestionService {
    db: DatabaseConnection,
    webhook: WebhookSettings,
    sync_states: SyncStateRepository,
}

impl IngestionService {
    pub fn new(db: DatabaseConnection, webhook: WebhookSettings) -> Self {
        Self {
            sync_states: SyncStateRepository::new(db.clone()),
            db,
            webhook,
        }
    }

    /// Store one normalized event, enrolling the business on first contact.
    #[instrument(skip(self, event), fields(business_id = %business_id, provider_event_id = %event.provider_event_id))]
    pub async fn ingest(
        &self,
        business_id: Uuid,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, EngineError> {
        let txn = self.db.begin().await?;
        SyncStateRepository::enroll(&txn, business_id, now).await?;
        let inserted = EventRepository::insert_if_absent(&txn, business_id, event, now).await?;
        txn.commit().await?;

        let outcome = if inserted {
            IngestOutcome::Inserted
        } else {
            debug!("Duplicate delivery ignored");
            IngestOutcome::Duplicate
        };
        outcome.record();
        Ok(outcome)
    }

    /// Authenticate and store a pushed webhook body.
    ///
    /// Signature failures are rejections, never duplicates. The body is only
    /// parsed after the signature has been checked.
    #[instrument(skip(self, body, signature), fields(business_id = %business_id, body_size = body.len()))]
    pub async fn ingest_webhook(
        &self,
        business_id: Uuid,
        body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, EngineError> {
        let now_unix = u64::try_from(now.timestamp()).unwrap_or_default();
        if let Err(err) = verify_signature(
            business_id,
            body,
            signature,
            self.webhook.signing_secret.as_deref(),
            self.webhook.tolerance_seconds,
            now_unix,
        ) {
            warn!(error = %err, "Webhook signature rejected");
            counter!("webhook_rejections_total", "reason" => "signature").increment(1);
            return Err(err.into());
        }

        let event = normalize_body(body).map_err(|err| {
            warn!(error = %err, "Webhook payload rejected");
            counter!("webhook_rejections_total", "reason" => "payload").increment(1);
            EngineError::from(err)
        })?;

        self.ingest(business_id, &event, now).await
    }

    /// Pull provider history after the stored cursor.
    ///
    /// Each page's events and the cursor move are committed together, so a crash
    /// re-fetches at most one page, which the idempotency key absorbs.
    #[instrument(skip(self, provider, config), fields(business_id = %business_id))]
    pub async fn sync(
        &self,
        business_id: Uuid,
        provider: &dyn PaymentProvider,
        config: &ProviderConfig,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, EngineError> {
        let mut cursor = match self.sync_states.get(business_id).await? {
            Some(state) => state.cursor,
            None => {
                SyncStateRepository::enroll(&self.db, business_id, now).await?;
                None
            }
        };

        let mut report = SyncReport {
            cursor: cursor.clone(),
            ..SyncReport::default()
        };

        loop {
            let page = provider
                .fetch_events(business_id, cursor.as_deref(), config.page_size)
                .await?;
            report.pages += 1;

            let mut events = Vec::with_capacity(page.events.len());
            for raw in &page.events {
                match normalize_envelope(raw) {
                    Ok(event) => events.push(event),
                    Err(err) => {
                        report.skipped += 1;
                        warn!(error = %err, "Skipping malformed provider event");
                    }
                }
            }

            let txn = self.db.begin().await?;
            let mut inserted = 0u64;
            for event in &events {
                if EventRepository::insert_if_absent(&txn, business_id, event, now).await? {
                    inserted += 1;
                }
            }
            SyncStateRepository::advance_cursor(&txn, business_id, page.next_cursor.clone(), now)
                .await?;
            txn.commit().await?;

            let duplicates = events.len() as u64 - inserted;
            report.inserted += inserted;
            report.duplicates += duplicates;
            counter!("ingest_events_total", "outcome" => IngestOutcome::Inserted.as_str())
                .increment(inserted);
            counter!("ingest_events_total", "outcome" => IngestOutcome::Duplicate.as_str())
                .increment(duplicates);

            if page.next_cursor.is_some() {
                cursor = page.next_cursor;
                report.cursor = cursor.clone();
            } else if page.has_more {
                warn!("Provider reported more events without a cursor; stopping");
                break;
            }

            if !page.has_more {
                break;
            }
            if report.pages >= config.max_pages_per_sync {
                info!(pages = report.pages, "Page limit reached; resuming next pass");
                break;
            }
        }

        info!(
            pages = report.pages,
            inserted = report.inserted,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Sync finished"
        );
        Ok(report)
    }
}
