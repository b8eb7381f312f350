//! Connection pool setup, migrations, and timestamp conversion helpers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_CONNECT_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: DbErr,
    },
    #[error("invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("migration failed: {0}")]
    Migration(#[source] DbErr),
}

fn connect_options(cfg: &AppConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    // An in-memory SQLite database lives only as long as its single connection.
    if cfg.database_url.starts_with("sqlite::memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(cfg.db_max_connections)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800));
    }
    opt
}

/// Opens the pool, retrying transient connect failures with doubling delays.
///
/// ```no_run
/// use readiness::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let db = init_pool(&AppConfig::default()).await?;
///     readiness::db::migrate(&db).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.trim().is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "database URL cannot be empty".to_string(),
        }
        .into());
    }

    let opt = connect_options(cfg);
    let mut delay = INITIAL_CONNECT_DELAY;
    let mut attempt = 1;
    loop {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, backend = ?conn.get_database_backend(), "Connected to database");
                return Ok(conn);
            }
            Err(source) if attempt >= CONNECT_ATTEMPTS => {
                tracing::error!(attempts = attempt, error = %source, "Giving up on database connection");
                return Err(DatabaseError::Unreachable {
                    attempts: attempt,
                    source,
                }
                .into());
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, retry_in = ?delay, "Database connection failed");
                sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Applies every pending migration.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    Migrator::up(db, None).await.map_err(DatabaseError::Migration)?;
    tracing::info!("Database migrations are up to date");
    Ok(())
}

pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .context("database health check failed")?;
    Ok(())
}

/// Timestamps are always persisted with a UTC offset.
pub fn to_db_time(value: DateTime<Utc>) -> DateTimeWithTimeZone {
    value.fixed_offset()
}

pub fn from_db_time(value: DateTimeWithTimeZone) -> DateTime<Utc> {
    value.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn empty_database_url_is_rejected() {
        let config = AppConfig {
            database_url: "  ".to_string(),
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;
        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn in_memory_pool_migrates_and_answers_health_checks() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.unwrap();
        migrate(&db).await.unwrap();
        health_check(&db).await.unwrap();
    }

    #[test]
    fn db_time_round_trips_through_utc() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let stored = to_db_time(now);
        assert_eq!(stored.offset().local_minus_utc(), 0);
        assert_eq!(from_db_time(stored), now);
    }
}
