//! HTTP implementation of [`PaymentProvider`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::{EventPage, PaymentProvider};
use crate::error::EngineError;

const BODY_SNIPPET_CHARS: usize = 200;

/// Calls `GET {base}/v1/businesses/{business_id}/events?limit=N[&after=cursor]`.
#[derive(Debug, Clone)]
pub struct HttpPaymentProvider {
    http_client: Client,
    api_base: Url,
    api_key: Option<String>,
}

impl HttpPaymentProvider {
    pub fn new(
        api_base: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let api_base = Url::parse(api_base.trim_end_matches('/')).map_err(|err| {
            EngineError::validation(format!("invalid provider api base '{api_base}': {err}"))
        })?;
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EngineError::upstream(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http_client,
            api_base,
            api_key,
        })
    }

    fn events_url(
        &self,
        business_id: Uuid,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<Url, EngineError> {
        let mut url = Url::parse(&format!(
            "{}/v1/businesses/{}/events",
            self.api_base.as_str().trim_end_matches('/'),
            business_id
        ))
        .map_err(|err| EngineError::validation(format!("invalid provider url: {err}")))?;

        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("after", cursor);
        }
        Ok(url)
    }
}

fn snippet(body: &str) -> String {
    if body.chars().count() > BODY_SNIPPET_CHARS {
        let truncated: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip(self), fields(%business_id))]
    async fn fetch_events(
        &self,
        business_id: Uuid,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<EventPage, EngineError> {
        let url = self.events_url(business_id, cursor, limit)?;

        let mut request = self
            .http_client
            .get(url)
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| EngineError::UpstreamUnavailable {
            message: format!("provider request failed: {err}"),
            retry_after_secs: None,
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), "Provider responded");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(EngineError::UpstreamUnavailable {
                message: "provider rate limited the sync".to_string(),
                retry_after_secs,
            });
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream(format!(
                "provider returned {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EngineError::Authentication(format!(
                "provider rejected credentials with {}",
                status.as_u16()
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::validation(format!(
                "provider returned {}: {}",
                status.as_u16(),
                snippet(&body)
            )));
        }

        let body = response.bytes().await.map_err(|err| {
            EngineError::upstream(format!("failed to read provider response: {err}"))
        })?;
        serde_json::from_slice::<EventPage>(&body).map_err(|err| {
            EngineError::validation(format!("malformed provider response: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HttpPaymentProvider {
        HttpPaymentProvider::new(
            &server.uri(),
            Some("sk_test".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_page_with_cursor_and_bearer_key() {
        let server = MockServer::start().await;
        let business_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/v1/businesses/{business_id}/events")))
            .and(query_param("limit", "50"))
            .and(query_param("after", "evt_10"))
            .and(header("authorization", "Bearer sk_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [{ "id": "evt_11" }],
                "next_cursor": "evt_11",
                "has_more": false
            })))
            .mount(&server)
            .await;

        let page = provider(&server)
            .fetch_events(business_id, Some("evt_10"), 50)
            .await
            .unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("evt_11"));
    }

    #[tokio::test]
    async fn server_error_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch_events(Uuid::new_v4(), None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch_events(Uuid::new_v4(), None, 10)
            .await
            .unwrap_err();
        assert_eq!(err.retry_after_secs(), Some(120));
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch_events(Uuid::new_v4(), None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authentication(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_validation_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .fetch_events(Uuid::new_v4(), None, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let body = "é".repeat(300);
        let truncated = snippet(&body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), BODY_SNIPPET_CHARS + 3);
    }
}
