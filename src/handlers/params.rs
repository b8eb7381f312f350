//! Query-string parsing shared by handlers.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::{ApiError, validation_error};
use crate::models::recommendation::{Priority, RecommendationStatus};

pub fn parse_timestamp(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    validation_error(
                        &format!("Invalid {field} format"),
                        json!({ field: "Must be an RFC 3339 timestamp" }),
                    )
                })
        })
        .transpose()
}

/// `default` when absent; otherwise must fall within `min..=max`.
pub fn parse_limit(value: Option<u32>, default: u32, min: u32, max: u32) -> Result<u32, ApiError> {
    match value {
        None => Ok(default),
        Some(limit) if (min..=max).contains(&limit) => Ok(limit),
        Some(_) => Err(validation_error(
            "Invalid limit",
            json!({ "limit": format!("Must be between {min} and {max}") }),
        )),
    }
}

pub fn parse_status(value: Option<&str>) -> Result<Option<RecommendationStatus>, ApiError> {
    value
        .map(|raw| match raw {
            "pending" => Ok(RecommendationStatus::Pending),
            "accepted" => Ok(RecommendationStatus::Accepted),
            "dismissed" => Ok(RecommendationStatus::Dismissed),
            _ => Err(validation_error(
                "Invalid status",
                json!({ "status": "Must be one of: pending, accepted, dismissed" }),
            )),
        })
        .transpose()
}

pub fn parse_priority(value: Option<&str>) -> Result<Option<Priority>, ApiError> {
    value
        .map(|raw| match raw {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(validation_error(
                "Invalid priority",
                json!({ "priority": "Must be one of: high, medium, low" }),
            )),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_bounds() {
        assert_eq!(parse_limit(None, 30, 1, 200).unwrap(), 30);
        assert_eq!(parse_limit(Some(200), 30, 1, 200).unwrap(), 200);
        assert!(parse_limit(Some(0), 30, 1, 200).is_err());
        assert!(parse_limit(Some(201), 30, 1, 200).is_err());
    }

    #[test]
    fn timestamp_and_enum_filters() {
        assert!(parse_timestamp("start", None).unwrap().is_none());
        assert!(parse_timestamp("start", Some("2025-01-01T00:00:00Z")).unwrap().is_some());
        assert!(parse_timestamp("start", Some("yesterday")).is_err());

        assert_eq!(parse_status(Some("dismissed")).unwrap(), Some(RecommendationStatus::Dismissed));
        assert!(parse_status(Some("open")).is_err());
        assert_eq!(parse_priority(Some("low")).unwrap(), Some(Priority::Low));
        assert!(parse_priority(Some("urgent")).is_err());
    }
}
