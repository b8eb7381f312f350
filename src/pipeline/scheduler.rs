//! # Pipeline Scheduler
//!
//! Drives `sync -> aggregate -> score -> recommend` for every enrolled business.
//! Businesses run in parallel on a bounded worker pool; the stages of one
//! business run strictly in order, each only after the previous stage's writes
//! are committed. Every stage attempt is recorded in `pipeline_runs`, which also
//! carries retry backoff across restarts.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Duration as TokioDuration, Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use uuid::Uuid;

use super::backoff::{compute_backoff, sample_jitter_seconds};
use super::locks::BusinessLocks;
use crate::aggregation::{AggregationPolicy, MetricsAggregator};
use crate::config::AppConfig;
use crate::db::from_db_time;
use crate::error::EngineError;
use crate::ingestion::{IngestionService, WebhookSettings};
use crate::models::pipeline_run::{self, JobKind, RunStatus};
use crate::models::{metrics_snapshot, readiness_score, sync_state};
use crate::provider::PaymentProvider;
use crate::recommendations::RecommendationEngine;
use crate::repositories::{PipelineRunRepository, SyncStateRepository};
use crate::scoring::ReadinessScorer;

/// Counters for one scheduler tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub enrolled: u64,
    pub ineligible: u64,
    /// Passes skipped because another pass held the business
    pub busy: u64,
    pub completed: u64,
    pub failed: u64,
    pub halted: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Completed,
    /// A stage failed; later stages were skipped.
    Failed {
        job_kind: JobKind,
        dead_lettered: bool,
    },
    /// A stage had nothing to consume yet; the pass stopped without a failure.
    Halted { job_kind: JobKind },
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub business_id: Uuid,
    pub outcome: PassOutcome,
    pub runs: Vec<pipeline_run::Model>,
}

/// Why a business is left out of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NeedsResync,
    BackingOff {
        job_kind: JobKind,
        until: DateTime<Utc>,
    },
    DeadLettered {
        job_kind: JobKind,
    },
}

/// Outputs handed from one stage to the next within a pass.
#[derive(Default)]
struct PassState {
    snapshot: Option<metrics_snapshot::Model>,
    score: Option<readiness_score::Model>,
}

#[derive(Clone)]
pub struct PipelineScheduler {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    provider: Arc<dyn PaymentProvider>,
    runs: PipelineRunRepository,
    locks: Arc<BusinessLocks>,
}

impl PipelineScheduler {
    pub fn new(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            runs: PipelineRunRepository::new(db.clone()),
            db,
            config,
            provider,
            locks: Arc::new(BusinessLocks::default()),
        }
    }

    /// Tick until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.pipeline.tick_interval_seconds,
            concurrency = self.config.pipeline.concurrency,
            "Starting pipeline scheduler"
        );
        let tick_interval = TokioDuration::from_secs(self.config.pipeline.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Pipeline scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    if let Err(err) = self.tick(Utc::now()).await {
                        error!(error = %err, "Pipeline tick failed");
                    }
                }
            }
        }

        info!("Pipeline scheduler stopped");
    }

    /// Run one pass for every eligible enrolled business.
    ///
    /// Passes already started are awaited even when enumerating a later page fails.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickStats, EngineError> {
        let tick_started = Instant::now();
        let mut stats = TickStats::default();
        let mut handles = Vec::new();

        let spawned = self.spawn_eligible(now, &mut stats, &mut handles).await;

        for (business_id, handle) in handles {
            match handle.await {
                Ok(Ok(Some(report))) => match report.outcome {
                    PassOutcome::Completed => stats.completed += 1,
                    PassOutcome::Failed { .. } => stats.failed += 1,
                    PassOutcome::Halted { .. } => stats.halted += 1,
                },
                Ok(Ok(None)) => stats.busy += 1,
                Ok(Err(err)) => {
                    stats.errors += 1;
                    error!(%business_id, error = %err, "Pipeline pass aborted");
                }
                Err(err) => {
                    stats.errors += 1;
                    error!(%business_id, error = %err, "Pipeline worker panicked");
                }
            }
        }

        histogram!("pipeline_tick_duration_ms").record(tick_started.elapsed().as_secs_f64() * 1_000.0);
        if let Err(err) = spawned {
            warn!(
                enrolled = stats.enrolled,
                completed = stats.completed,
                failed = stats.failed,
                "Pipeline tick stopped enumerating businesses; started passes were awaited"
            );
            return Err(err);
        }
        info!(
            enrolled = stats.enrolled,
            completed = stats.completed,
            failed = stats.failed,
            halted = stats.halted,
            ineligible = stats.ineligible,
            busy = stats.busy,
            errors = stats.errors,
            "Pipeline tick finished"
        );
        Ok(stats)
    }

    /// Page through enrolled businesses, spawning a pass for each eligible one.
    async fn spawn_eligible(
        &self,
        now: DateTime<Utc>,
        stats: &mut TickStats,
        handles: &mut Vec<(Uuid, JoinHandle<Result<Option<PassReport>, EngineError>>)>,
    ) -> Result<(), EngineError> {
        let sync_states = SyncStateRepository::new(self.db.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.concurrency));
        let batch_size = self.config.pipeline.batch_size;
        let mut after = None;

        loop {
            let page = sync_states.list_enrolled(after, batch_size).await?;
            let page_len = page.len() as u64;
            after = page.last().map(|state| state.business_id);

            for state in page {
                stats.enrolled += 1;
                match self.eligibility(&state, now).await {
                    Ok(Eligibility::Eligible) => {}
                    Ok(reason) => {
                        stats.ineligible += 1;
                        debug!(business_id = %state.business_id, ?reason, "Business not eligible");
                        continue;
                    }
                    Err(err) => {
                        stats.errors += 1;
                        error!(business_id = %state.business_id, error = %err, "Eligibility check failed");
                        continue;
                    }
                }

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::inconsistency("pipeline worker pool closed"))?;
                let scheduler = self.clone();
                let business_id = state.business_id;
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    scheduler.try_run_pass(business_id, now).await
                });
                handles.push((business_id, handle));
            }

            if page_len < batch_size {
                return Ok(());
            }
        }
    }

    /// Whether `state`'s business should run this tick.
    pub async fn eligibility(
        &self,
        state: &sync_state::Model,
        now: DateTime<Utc>,
    ) -> Result<Eligibility, EngineError> {
        if state.needs_resync {
            return Ok(Eligibility::NeedsResync);
        }

        let resynced_at = state.resynced_at.map(from_db_time);
        for run in self.runs.latest_attempts(state.business_id).await? {
            match run.status {
                RunStatus::Failed => {
                    if let Some(until) = run.next_eligible_at.map(from_db_time)
                        && until > now
                    {
                        return Ok(Eligibility::BackingOff {
                            job_kind: run.job_kind,
                            until,
                        });
                    }
                }
                RunStatus::DeadLettered => {
                    let finished_at = from_db_time(run.finished_at.unwrap_or(run.started_at));
                    if resynced_at.is_none_or(|resynced| resynced < finished_at) {
                        return Ok(Eligibility::DeadLettered {
                            job_kind: run.job_kind,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(Eligibility::Eligible)
    }

    /// Run one pass for `business_id`, waiting for any pass already in flight.
    ///
    /// Eligibility is not checked; this is the manual entry point.
    pub async fn run_pass(
        &self,
        business_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PassReport, EngineError> {
        let _guard = self.locks.acquire(business_id).await;
        self.execute_pass(business_id, now).await
    }

    async fn try_run_pass(
        &self,
        business_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PassReport>, EngineError> {
        let Some(_guard) = self.locks.try_acquire(business_id) else {
            debug!(%business_id, "Pass already running");
            return Ok(None);
        };
        self.execute_pass(business_id, now).await.map(Some)
    }

    /// Clear the manual-resync flag so the next tick picks the business up again.
    #[instrument(skip(self), fields(business_id = %business_id))]
    pub async fn resync(
        &self,
        business_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<sync_state::Model, EngineError> {
        let state = SyncStateRepository::set_needs_resync(&self.db, business_id, false, now).await?;
        info!("Business cleared for resync");
        Ok(state)
    }

    #[instrument(skip(self), fields(business_id = %business_id))]
    async fn execute_pass(
        &self,
        business_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PassReport, EngineError> {
        let mut state = PassState::default();
        let mut runs = Vec::with_capacity(JobKind::ORDERED.len());
        let mut outcome = PassOutcome::Completed;

        for kind in JobKind::ORDERED {
            if let PassOutcome::Failed { job_kind, .. } | PassOutcome::Halted { job_kind } =
                &outcome
            {
                let reason = match outcome {
                    PassOutcome::Halted { .. } => "upstream_not_ready",
                    _ => "upstream_failed",
                };
                let skipped = self
                    .runs
                    .record_skipped(
                        business_id,
                        kind,
                        now,
                        json!({ "reason": reason, "upstream": job_kind }),
                    )
                    .await?;
                runs.push(skipped);
                continue;
            }

            let attempt = self.next_attempt(business_id, kind).await?;
            let run = self.runs.start(business_id, kind, attempt, now).await?;

            let span = info_span!("pipeline_stage", %business_id, job_kind = %kind, attempt);
            let started = Instant::now();
            let result = self
                .run_stage_with_timeout(kind, business_id, now, &mut state)
                .instrument(span)
                .await;
            histogram!("pipeline_stage_duration_ms", "job_kind" => kind.as_str())
                .record(started.elapsed().as_secs_f64() * 1_000.0);

            let finished = match result {
                Ok(()) => {
                    self.runs
                        .finish(run, RunStatus::Succeeded, now, None, None)
                        .await?
                }
                Err(EngineError::DependencyNotReady(message)) => {
                    info!(job_kind = %kind, %message, "Stage skipped; dependency not ready");
                    outcome = PassOutcome::Halted { job_kind: kind };
                    self.runs
                        .finish(
                            run,
                            RunStatus::Skipped,
                            now,
                            None,
                            Some(json!({ "kind": "dependency_not_ready", "message": message })),
                        )
                        .await?
                }
                Err(err) => {
                    let finished = self.record_failure(run, &err, now).await?;
                    outcome = PassOutcome::Failed {
                        job_kind: kind,
                        dead_lettered: finished.status == RunStatus::DeadLettered,
                    };
                    finished
                }
            };
            runs.push(finished);
        }

        Ok(PassReport {
            business_id,
            outcome,
            runs,
        })
    }

    /// Consecutive failures of the same stage increase the attempt number.
    async fn next_attempt(&self, business_id: Uuid, kind: JobKind) -> Result<i32, EngineError> {
        let attempt = match self.runs.latest_attempt(business_id, kind).await? {
            Some(run) if run.status == RunStatus::Failed => run.attempt.saturating_add(1),
            _ => 1,
        };
        Ok(attempt)
    }

    async fn run_stage_with_timeout(
        &self,
        kind: JobKind,
        business_id: Uuid,
        now: DateTime<Utc>,
        state: &mut PassState,
    ) -> Result<(), EngineError> {
        let seconds = self.config.pipeline.stage_timeout_seconds;
        timeout(
            TokioDuration::from_secs(seconds),
            self.run_stage(kind, business_id, now, state),
        )
        .await
        .map_err(|_| EngineError::Timeout { seconds })?
    }

    async fn run_stage(
        &self,
        kind: JobKind,
        business_id: Uuid,
        now: DateTime<Utc>,
        state: &mut PassState,
    ) -> Result<(), EngineError> {
        match kind {
            JobKind::Sync => {
                let ingestion = IngestionService::new(
                    self.db.clone(),
                    WebhookSettings::from_config(&self.config),
                );
                let report = ingestion
                    .sync(business_id, self.provider.as_ref(), &self.config.provider, now)
                    .await?;
                debug!(inserted = report.inserted, pages = report.pages, "Sync stage done");
            }
            JobKind::Aggregate => {
                let aggregation = &self.config.aggregation;
                let aggregator = MetricsAggregator::new(
                    self.db.clone(),
                    AggregationPolicy::with_tolerance_days(aggregation.payout_tolerance_days),
                );
                let period_start = now - Duration::days(aggregation.window_days);
                let snapshot = aggregator
                    .aggregate(business_id, period_start, now, now)
                    .await?;
                state.snapshot = Some(snapshot);
            }
            JobKind::Score => {
                let snapshot = state.snapshot.as_ref().ok_or_else(|| {
                    EngineError::DependencyNotReady("no snapshot from this pass".to_string())
                })?;
                let score = ReadinessScorer::new(self.db.clone())
                    .score_snapshot(snapshot, now)
                    .await?;
                state.score = Some(score);
            }
            JobKind::Recommend => {
                let (Some(score), Some(snapshot)) = (state.score.as_ref(), state.snapshot.as_ref())
                else {
                    return Err(EngineError::DependencyNotReady(
                        "no score from this pass".to_string(),
                    ));
                };
                let engine = RecommendationEngine::new(
                    self.db.clone(),
                    self.config.recommendation_suppression_days,
                );
                let issued = engine.recommend(score, snapshot, now).await?;
                debug!(issued = issued.len(), "Recommend stage done");
            }
        }
        Ok(())
    }

    /// Mark `run` failed with backoff, or dead-letter it when retrying is pointless.
    async fn record_failure(
        &self,
        run: pipeline_run::Model,
        err: &EngineError,
        now: DateTime<Utc>,
    ) -> Result<pipeline_run::Model, EngineError> {
        let pipeline = &self.config.pipeline;
        let business_id = run.business_id;
        let kind = run.job_kind;
        let attempt = run.attempt;
        let retryable = err.is_retryable();

        counter!("pipeline_stage_failures_total", "job_kind" => kind.as_str()).increment(1);

        let mut details = json!({
            "kind": err.kind(),
            "message": err.to_string(),
            "retryable": retryable,
            "attempt": attempt,
        });

        if !retryable || attempt >= pipeline.max_attempts {
            let finished = self
                .runs
                .finish(run, RunStatus::DeadLettered, now, None, Some(details))
                .await?;
            match SyncStateRepository::set_needs_resync(&self.db, business_id, true, now).await {
                Ok(_) | Err(EngineError::NotFound(_)) => {}
                Err(flag_err) => return Err(flag_err),
            }
            counter!("pipeline_dead_letters_total", "job_kind" => kind.as_str()).increment(1);
            error!(
                %business_id,
                job_kind = %kind,
                attempt,
                error_kind = err.kind(),
                error = %err,
                "Stage dead-lettered; business flagged for manual resync"
            );
            return Ok(finished);
        }

        let delay = compute_backoff(pipeline, attempt, err.retry_after_secs());
        let backoff = delay + sample_jitter_seconds(pipeline, delay);
        let next_eligible_at = now + Duration::seconds(backoff as i64);
        details["backoff_seconds"] = json!(backoff);

        warn!(
            %business_id,
            job_kind = %kind,
            attempt,
            backoff_seconds = backoff,
            error = %err,
            "Stage failed; retrying after backoff"
        );
        self.runs
            .finish(run, RunStatus::Failed, now, Some(next_eligible_at), Some(details))
            .await
    }
}
