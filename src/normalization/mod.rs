//! Provider payload normalization.
//!
//! Provider envelopes `{ id, type, created, data }` are mapped into the fixed
//! [`NormalizedEvent`] shape here so nothing downstream sees provider structure.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::EngineError;
use crate::models::raw_event::EventType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Announced by the provider; not yet resolved.
    Pending,
    #[default]
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PayoutStatus::Pending)
    }
}

/// Tagged union stored in `raw_events.payload`.
///
/// `charge_id` on a charge is the provider's charge object id; refunds and
/// chargebacks carry the id of the charge they reverse. Several lifecycle
/// events of one payout share a `payout_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Charge {
        charge_id: String,
        amount: i64,
        status: ChargeStatus,
    },
    Refund {
        charge_id: String,
        amount: i64,
    },
    Chargeback {
        charge_id: String,
        amount: i64,
    },
    Payout {
        payout_id: String,
        amount: i64,
        #[serde(default)]
        status: PayoutStatus,
        expected_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        settled_at: Option<DateTime<Utc>>,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Charge { .. } => EventType::Charge,
            EventPayload::Refund { .. } => EventType::Refund,
            EventPayload::Chargeback { .. } => EventType::Chargeback,
            EventPayload::Payout { .. } => EventType::Payout,
        }
    }
}

/// A provider event in canonical form, ready for the event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub provider_event_id: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl NormalizedEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Provider event types accepted at the ingestion boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    ChargeSucceeded,
    ChargeFailed,
    ChargeRefunded,
    RefundCreated,
    DisputeCreated,
    ChargebackCreated,
    PayoutPaid,
    PayoutFailed,
    PayoutCreated,
}

impl ProviderEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProviderEventKind::ChargeSucceeded => "charge.succeeded",
            ProviderEventKind::ChargeFailed => "charge.failed",
            ProviderEventKind::ChargeRefunded => "charge.refunded",
            ProviderEventKind::RefundCreated => "refund.created",
            ProviderEventKind::DisputeCreated => "charge.dispute.created",
            ProviderEventKind::ChargebackCreated => "chargeback.created",
            ProviderEventKind::PayoutPaid => "payout.paid",
            ProviderEventKind::PayoutFailed => "payout.failed",
            ProviderEventKind::PayoutCreated => "payout.created",
        }
    }
}

impl fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ALL_PROVIDER_EVENT_KINDS: &[ProviderEventKind] = &[
    ProviderEventKind::ChargeSucceeded,
    ProviderEventKind::ChargeFailed,
    ProviderEventKind::ChargeRefunded,
    ProviderEventKind::RefundCreated,
    ProviderEventKind::DisputeCreated,
    ProviderEventKind::ChargebackCreated,
    ProviderEventKind::PayoutPaid,
    ProviderEventKind::PayoutFailed,
    ProviderEventKind::PayoutCreated,
];

pub fn parse_provider_event_kind(kind: &str) -> Option<ProviderEventKind> {
    ALL_PROVIDER_EVENT_KINDS
        .iter()
        .copied()
        .find(|k| k.as_str() == kind)
}

/// Errors that can occur while mapping provider payloads to canonical events.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("field {field} has an invalid value")]
    InvalidField { field: &'static str },
    #[error("amount must be a non-negative integer in minor units, got {0}")]
    NegativeAmount(i64),
    #[error("unsupported event type: {0}")]
    UnsupportedType(String),
}

impl From<NormalizationError> for EngineError {
    fn from(err: NormalizationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

/// Parse and normalize a raw webhook body.
pub fn normalize_body(body: &[u8]) -> Result<NormalizedEvent, NormalizationError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| NormalizationError::InvalidJson(err.to_string()))?;
    normalize_envelope(&value)
}

/// Normalize one provider envelope.
pub fn normalize_envelope(envelope: &Value) -> Result<NormalizedEvent, NormalizationError> {
    let provider_event_id = envelope
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(NormalizationError::MissingField { field: "id" })?
        .to_string();

    let raw_type = envelope
        .get("type")
        .and_then(Value::as_str)
        .ok_or(NormalizationError::MissingField { field: "type" })?;
    let kind = parse_provider_event_kind(raw_type)
        .ok_or_else(|| NormalizationError::UnsupportedType(raw_type.to_string()))?;

    let occurred_at = required_timestamp(envelope, "created")?;

    let data = envelope
        .get("data")
        .filter(|d| d.is_object())
        .ok_or(NormalizationError::MissingField { field: "data" })?;
    let amount = required_amount(data)?;
    // Charge and payout objects fall back to the envelope id when `data.id` is absent.
    let object_id = || optional_string(data, "id").unwrap_or_else(|| provider_event_id.clone());

    let payload = match kind {
        ProviderEventKind::ChargeSucceeded => EventPayload::Charge {
            charge_id: object_id(),
            amount,
            status: ChargeStatus::Succeeded,
        },
        ProviderEventKind::ChargeFailed => EventPayload::Charge {
            charge_id: object_id(),
            amount,
            status: ChargeStatus::Failed,
        },
        ProviderEventKind::ChargeRefunded | ProviderEventKind::RefundCreated => {
            EventPayload::Refund {
                charge_id: charge_reference(kind, data)?,
                amount,
            }
        }
        ProviderEventKind::DisputeCreated | ProviderEventKind::ChargebackCreated => {
            EventPayload::Chargeback {
                charge_id: charge_reference(kind, data)?,
                amount,
            }
        }
        ProviderEventKind::PayoutPaid => EventPayload::Payout {
            payout_id: object_id(),
            amount,
            status: PayoutStatus::Paid,
            expected_at: required_timestamp(data, "expected_at")?,
            settled_at: optional_timestamp(data, "settled_at")?,
        },
        ProviderEventKind::PayoutFailed => EventPayload::Payout {
            payout_id: object_id(),
            amount,
            status: PayoutStatus::Failed,
            expected_at: required_timestamp(data, "expected_at")?,
            settled_at: None,
        },
        ProviderEventKind::PayoutCreated => EventPayload::Payout {
            payout_id: object_id(),
            amount,
            status: PayoutStatus::Pending,
            expected_at: required_timestamp(data, "expected_at")?,
            settled_at: None,
        },
    };

    Ok(NormalizedEvent {
        provider_event_id,
        occurred_at,
        payload,
    })
}

fn optional_string(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Reversals name their charge in `data.charge`; `charge.refunded` may instead
/// carry the charge object itself, identified by `data.id`.
fn charge_reference(kind: ProviderEventKind, data: &Value) -> Result<String, NormalizationError> {
    optional_string(data, "charge")
        .or_else(|| {
            (kind == ProviderEventKind::ChargeRefunded)
                .then(|| optional_string(data, "id"))
                .flatten()
        })
        .ok_or(NormalizationError::MissingField { field: "charge" })
}

fn required_amount(data: &Value) -> Result<i64, NormalizationError> {
    let amount = data
        .get("amount")
        .ok_or(NormalizationError::MissingField { field: "amount" })?
        .as_i64()
        .ok_or(NormalizationError::InvalidField { field: "amount" })?;
    if amount < 0 {
        return Err(NormalizationError::NegativeAmount(amount));
    }
    Ok(amount)
}

fn required_timestamp(
    value: &Value,
    field: &'static str,
) -> Result<DateTime<Utc>, NormalizationError> {
    optional_timestamp(value, field)?.ok_or(NormalizationError::MissingField { field })
}

fn optional_timestamp(
    value: &Value,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, NormalizationError> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| NormalizationError::InvalidField { field }),
        Some(_) => Err(NormalizationError::InvalidField { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn registry_has_unique_entries() {
        let mut seen = HashSet::new();
        for kind in ALL_PROVIDER_EVENT_KINDS {
            assert!(seen.insert(kind.as_str()), "duplicate kind {}", kind);
        }
    }

    #[test]
    fn charge_succeeded_normalizes() {
        let event = normalize_envelope(&json!({
            "id": "evt_1",
            "type": "charge.succeeded",
            "created": "2025-03-01T10:00:00Z",
            "data": { "amount": 1250 }
        }))
        .unwrap();

        assert_eq!(event.provider_event_id, "evt_1");
        assert_eq!(event.event_type(), EventType::Charge);
        assert_eq!(
            event.occurred_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            event.payload,
            EventPayload::Charge {
                charge_id: "evt_1".to_string(),
                amount: 1250,
                status: ChargeStatus::Succeeded
            }
        );
    }

    #[test]
    fn dispute_maps_to_chargeback() {
        let event = normalize_envelope(&json!({
            "id": "evt_2",
            "type": "charge.dispute.created",
            "created": "2025-03-01T10:00:00+02:00",
            "data": { "amount": 500, "charge": "ch_9" }
        }))
        .unwrap();

        assert_eq!(
            event.payload,
            EventPayload::Chargeback {
                charge_id: "ch_9".to_string(),
                amount: 500
            }
        );
        assert_eq!(
            event.occurred_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn payout_paid_keeps_settlement() {
        let event = normalize_envelope(&json!({
            "id": "po_1",
            "type": "payout.paid",
            "created": "2025-03-03T00:00:00Z",
            "data": {
                "amount": 9000,
                "expected_at": "2025-03-02T00:00:00Z",
                "settled_at": "2025-03-03T00:00:00Z"
            }
        }))
        .unwrap();

        match event.payload {
            EventPayload::Payout {
                payout_id,
                status,
                settled_at,
                ..
            } => {
                assert_eq!(payout_id, "po_1");
                assert_eq!(status, PayoutStatus::Paid);
                assert!(settled_at.is_some());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn payout_lifecycle_events_share_the_payout_id() {
        let envelope = |id: &str, kind: &str| {
            json!({
                "id": id,
                "type": kind,
                "created": "2025-03-01T00:00:00Z",
                "data": {
                    "id": "po_77",
                    "amount": 9000,
                    "expected_at": "2025-03-02T00:00:00Z",
                    "settled_at": "2025-03-02T00:00:00Z"
                }
            })
        };

        let created = normalize_envelope(&envelope("evt_a", "payout.created")).unwrap();
        let paid = normalize_envelope(&envelope("evt_b", "payout.paid")).unwrap();

        match (created.payload, paid.payload) {
            (
                EventPayload::Payout {
                    payout_id: first,
                    status: PayoutStatus::Pending,
                    settled_at: None,
                    ..
                },
                EventPayload::Payout {
                    payout_id: second,
                    status: PayoutStatus::Paid,
                    ..
                },
            ) => {
                assert_eq!(first, "po_77");
                assert_eq!(second, "po_77");
            }
            other => panic!("unexpected payloads {other:?}"),
        }
    }

    #[test]
    fn payout_failed_is_never_settled() {
        let event = normalize_envelope(&json!({
            "id": "po_2",
            "type": "payout.failed",
            "created": "2025-03-03T00:00:00Z",
            "data": {
                "amount": 9000,
                "expected_at": "2025-03-02T00:00:00Z",
                "settled_at": "2025-03-03T00:00:00Z"
            }
        }))
        .unwrap();

        assert!(matches!(
            event.payload,
            EventPayload::Payout {
                status: PayoutStatus::Failed,
                settled_at: None,
                ..
            }
        ));
    }

    #[test]
    fn rejects_malformed_envelopes() {
        let unknown = normalize_envelope(&json!({
            "id": "evt", "type": "customer.created", "created": "2025-03-01T00:00:00Z", "data": {}
        }));
        assert_eq!(
            unknown,
            Err(NormalizationError::UnsupportedType("customer.created".into()))
        );

        let negative = normalize_envelope(&json!({
            "id": "evt", "type": "charge.succeeded", "created": "2025-03-01T00:00:00Z",
            "data": { "amount": -1 }
        }));
        assert_eq!(negative, Err(NormalizationError::NegativeAmount(-1)));

        let fractional = normalize_envelope(&json!({
            "id": "evt", "type": "charge.succeeded", "created": "2025-03-01T00:00:00Z",
            "data": { "amount": 10.5 }
        }));
        assert_eq!(
            fractional,
            Err(NormalizationError::InvalidField { field: "amount" })
        );

        let missing_id = normalize_envelope(&json!({
            "type": "charge.succeeded", "created": "2025-03-01T00:00:00Z", "data": { "amount": 1 }
        }));
        assert_eq!(
            missing_id,
            Err(NormalizationError::MissingField { field: "id" })
        );

        let unlinked = normalize_envelope(&json!({
            "id": "evt", "type": "chargeback.created", "created": "2025-03-01T00:00:00Z",
            "data": { "amount": 1 }
        }));
        assert_eq!(
            unlinked,
            Err(NormalizationError::MissingField { field: "charge" })
        );

        let bad_time = normalize_envelope(&json!({
            "id": "evt", "type": "charge.succeeded", "created": "yesterday", "data": { "amount": 1 }
        }));
        assert_eq!(
            bad_time,
            Err(NormalizationError::InvalidField { field: "created" })
        );

        assert!(matches!(
            normalize_body(b"not json"),
            Err(NormalizationError::InvalidJson(_))
        ));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let value = serde_json::to_value(EventPayload::Refund {
            charge_id: "ch_1".to_string(),
            amount: 300,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "kind": "refund", "charge_id": "ch_1", "amount": 300 })
        );
    }
}
