use crate::estimation::classify::AvailabilityLevel;
use crate::state::{EstimateSource, LotStatus};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AvailabilityResponse {
    pub level: AvailabilityLevel,
    pub pct: Option<u8>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LotResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_lot_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    pub total: u32,
    /// `null` when unknown, never 0.
    pub free: Option<u32>,
    pub occupied: Option<u32>,
    pub status: LotStatus,
    pub confidence_pct: u8,
    pub estimate_source: EstimateSource,
    pub availability: AvailabilityResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub congestion_score: Option<u8>,
    pub last_updated: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LotsSuccessResponse {
    pub lots: Vec<LotResponse>,
    pub congestion_score: u8,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LotSuccessResponse {
    pub lot: LotResponse,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchHitResponse {
    #[serde(flatten)]
    pub lot: LotResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchSuccessResponse {
    pub query: String,
    pub results: Vec<SearchHitResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub lot_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RefreshAcceptedResponse {
    pub refresh_requested: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoData,
    NotFound,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lot_response() -> LotResponse {
        LotResponse {
            id: "p1".to_string(),
            source_lot_id: None,
            name: "City Hall Garage".to_string(),
            address: None,
            lat: Some(45.42),
            lng: Some(-75.69),
            total: 40,
            free: None,
            occupied: None,
            status: LotStatus::Busy,
            confidence_pct: 95,
            estimate_source: EstimateSource::Live,
            availability: AvailabilityResponse {
                level: AvailabilityLevel::Unknown,
                pct: None,
            },
            congestion_score: None,
            last_updated: "2026-01-12T13:00:00Z".to_string(),
        }
    }

    #[test]
    fn unknown_counts_serialize_as_null() {
        let value = serde_json::to_value(lot_response()).expect("serialize lot");

        assert_eq!(
            value,
            json!({
                "id": "p1",
                "name": "City Hall Garage",
                "lat": 45.42,
                "lng": -75.69,
                "total": 40,
                "free": null,
                "occupied": null,
                "status": "busy",
                "confidence_pct": 95,
                "estimate_source": "live",
                "availability": {"level": "unknown", "pct": null},
                "last_updated": "2026-01-12T13:00:00Z"
            })
        );
    }

    #[test]
    fn search_hit_flattens_lot_and_adds_distance() {
        let hit = SearchHitResponse {
            lot: lot_response(),
            distance_km: Some(1.25),
        };

        let value = serde_json::to_value(hit).expect("serialize hit");

        assert_eq!(value["id"], json!("p1"));
        assert_eq!(value["distance_km"], json!(1.25));
        assert!(value.get("lot").is_none());
    }

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = ErrorResponse {
            error_code: ErrorCode::NoData,
            error_message: "No lots fetched yet".to_string(),
            timestamp: "2026-01-12T13:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "NO_DATA",
                "error_message": "No lots fetched yet",
                "timestamp": "2026-01-12T13:00:00Z"
            })
        );
    }

    #[test]
    fn health_response_omits_missing_fetch() {
        let response = HealthSuccessResponse {
            status: HealthStatus::Ko,
            lot_count: 0,
            last_fetch: None,
            last_error: None,
            timestamp: "2026-01-12T13:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health");
        assert_eq!(
            value,
            json!({"status": "ko", "lot_count": 0, "timestamp": "2026-01-12T13:00:00Z"})
        );
    }
}
