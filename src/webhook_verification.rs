//! # Webhook Signature Verification
//!
//! Pushed provider events carry `X-Readiness-Signature: t=<unix>,v1=<hex>`, an
//! HMAC-SHA256 over `"{t}.{business_id}.{body}"`. The business id is the one in
//! the delivery URL, so a delivery signed for one business does not verify for
//! another. Verification is constant-time and bounded by a timestamp tolerance.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Readiness-Signature";

/// Errors that can occur during webhook signature verification
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: &'static str },

    #[error("Invalid signature format: {reason}")]
    InvalidSignatureFormat { reason: &'static str },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Timestamp too old: {seconds}s old, max allowed: {max_seconds}s")]
    TimestampTooOld { seconds: u64, max_seconds: u64 },

    #[error("Timestamp too far in future: {seconds}s in future, max allowed: {max_seconds}s")]
    TimestampTooFuture { seconds: u64, max_seconds: u64 },

    #[error("Webhook signing secret is not configured")]
    NotConfigured,
}

impl From<VerificationError> for EngineError {
    fn from(err: VerificationError) -> Self {
        EngineError::Authentication(err.to_string())
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;

struct ParsedSignature<'a> {
    timestamp: u64,
    signatures: Vec<&'a str>,
}

fn parse_signature_header(header: &str) -> VerificationResult<ParsedSignature<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(VerificationError::InvalidSignatureFormat {
                reason: "expected comma separated key=value pairs",
            });
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<u64>().map_err(|_| {
                    VerificationError::InvalidSignatureFormat {
                        reason: "t must be a unix timestamp",
                    }
                })?);
            }
            "v1" => signatures.push(value),
            // Unknown schemes are ignored so providers can rotate algorithms.
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(VerificationError::InvalidSignatureFormat {
        reason: "missing t=",
    })?;
    if signatures.is_empty() {
        return Err(VerificationError::InvalidSignatureFormat {
            reason: "missing v1=",
        });
    }

    Ok(ParsedSignature {
        timestamp,
        signatures,
    })
}

fn compute_mac(
    secret: &str,
    business_id: Uuid,
    timestamp: u64,
    body: &[u8],
) -> VerificationResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| VerificationError::VerificationFailed)?;
    mac.update(format!("{timestamp}.{business_id}.").as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Verifies a push addressed to `business_id` against `secret`, with `now_unix`
/// as the reference clock.
pub fn verify_signature(
    business_id: Uuid,
    body: &[u8],
    signature_header: Option<&str>,
    secret: Option<&str>,
    tolerance_seconds: u64,
    now_unix: u64,
) -> VerificationResult<()> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(VerificationError::NotConfigured)?;

    let header = signature_header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(VerificationError::MissingSignature {
            header: SIGNATURE_HEADER,
        })?;

    debug!(body_size = body.len(), tolerance_seconds, "Verifying webhook signature");

    let parsed = parse_signature_header(header)?;

    let time_diff = now_unix.abs_diff(parsed.timestamp);
    if time_diff > tolerance_seconds {
        return if now_unix > parsed.timestamp {
            Err(VerificationError::TimestampTooOld {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            })
        } else {
            Err(VerificationError::TimestampTooFuture {
                seconds: time_diff,
                max_seconds: tolerance_seconds,
            })
        };
    }

    let expected = compute_mac(secret, business_id, parsed.timestamp, body)?
        .finalize()
        .into_bytes();
    let expected_bytes: &[u8] = expected.as_ref();

    for candidate in parsed.signatures {
        let Ok(provided) = hex::decode(candidate) else {
            continue;
        };
        if subtle::ConstantTimeEq::ct_eq(expected_bytes, &provided[..]).into() {
            return Ok(());
        }
    }

    Err(VerificationError::VerificationFailed)
}

/// Builds a signature header value for `body` addressed to `business_id`.
pub fn sign_payload(
    secret: &str,
    business_id: Uuid,
    timestamp: u64,
    body: &[u8],
) -> VerificationResult<String> {
    let digest = compute_mac(secret, business_id, timestamp, body)?
        .finalize()
        .into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}
