//! Payment-provider pull client.
//!
//! The pipeline's sync stage pages through a provider's event history with
//! [`PaymentProvider::fetch_events`], starting after the stored cursor.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::EngineError;

mod http;

pub use http::HttpPaymentProvider;

/// One page of provider history.
///
/// `events` are raw provider envelopes; normalization happens at ingestion so a
/// single malformed entry does not void the page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventPage {
    #[serde(default, alias = "data")]
    pub events: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Fetch up to `limit` events strictly after `cursor` (from the beginning when `None`).
    async fn fetch_events(
        &self,
        business_id: Uuid,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<EventPage, EngineError>;
}

/// Provider used when no API base is configured: every sync sees an empty history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPaymentProvider;

#[async_trait]
impl PaymentProvider for NullPaymentProvider {
    async fn fetch_events(
        &self,
        _business_id: Uuid,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<EventPage, EngineError> {
        Ok(EventPage::default())
    }
}

/// Build the provider client described by `config`.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn PaymentProvider>, EngineError> {
    match &config.api_base {
        Some(base) => Ok(Arc::new(HttpPaymentProvider::new(
            base,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?)),
        None => {
            tracing::info!("No provider API base configured; pull-sync will see no events");
            Ok(Arc::new(NullPaymentProvider))
        }
    }
}
