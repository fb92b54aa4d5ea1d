use crate::api::ApiContext;
use crate::api::responses::{
    AvailabilityResponse, ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse,
    LotResponse, LotSuccessResponse, LotsSuccessResponse, RefreshAcceptedResponse,
    SearchHitResponse, SearchSuccessResponse,
};
use crate::estimation::{current_congestion, local_time};
use crate::geocode::Geocoder;
use crate::search::{LotFilters, SearchHit, filter_lots, search_lots};
use crate::service::RefreshTrigger;
use crate::state::{AppState, FetchStatus, ParkingLot};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, error};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success {
        status: StatusCode,
        body: T,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LotsParams {
    pub query: Option<String>,
    pub only_available: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn get_lots<G>(
    State(ctx): State<ApiContext<G>>,
    Query(params): Query<LotsParams>,
) -> impl IntoResponse {
    let filters = LotFilters {
        query: params.query.unwrap_or_default(),
        only_available: params.only_available.unwrap_or(false),
    };
    build_lots_response(&ctx.state, &filters, ctx.utc_offset, SystemTime::now())
}

pub async fn get_lot<G>(
    State(ctx): State<ApiContext<G>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    build_lot_response(&ctx.state, &id, SystemTime::now())
}

pub async fn get_search<G: Geocoder>(
    State(ctx): State<ApiContext<G>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let query = params.q.unwrap_or_default();
    let lots = match snapshot_lots(&ctx.state) {
        Ok(lots) => lots,
        Err(message) => return internal_error("/api/search", message),
    };
    let hits = search_lots(&lots, &query, ctx.geocoder.as_deref()).await;
    debug!(query = %query, hits = hits.len(), "Search served");
    build_search_response(query, hits, SystemTime::now())
}

pub async fn get_health<G>(State(ctx): State<ApiContext<G>>) -> impl IntoResponse {
    build_health_response(&ctx.state, SystemTime::now())
}

pub async fn post_refresh<G>(State(ctx): State<ApiContext<G>>) -> impl IntoResponse {
    build_refresh_response(&ctx.refresh, SystemTime::now())
}

fn snapshot_lots(state: &Arc<RwLock<AppState>>) -> Result<Vec<ParkingLot>, &'static str> {
    state
        .read()
        .map(|guard| guard.lots().to_vec())
        .map_err(|_| "state lock poisoned while reading lots")
}

/// Lots were fetched successfully at least once.
fn has_data(state: &AppState) -> bool {
    !state.lots().is_empty()
        || matches!(
            state.last_fetch().map(|f| &f.status),
            Some(FetchStatus::Ok { .. })
        )
}

fn build_lots_response(
    state: &Arc<RwLock<AppState>>,
    filters: &LotFilters,
    utc_offset: UtcOffset,
    now: SystemTime,
) -> ApiResponse<LotsSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => return internal_error("/api/lots", "state lock poisoned while reading lots"),
    };
    if !has_data(&guard) {
        drop(guard);
        return no_data_response(now);
    }
    let congestion = current_congestion(&guard, local_time(now, utc_offset));
    let lots = filter_lots(guard.lots(), filters);
    drop(guard);

    let (lots, timestamp) = match (map_lots(&lots), format_timestamp(now)) {
        (Ok(lots), Ok(timestamp)) => (lots, timestamp),
        _ => return internal_error("/api/lots", "timestamp formatting failure"),
    };

    ApiResponse::Success {
        status: StatusCode::OK,
        body: LotsSuccessResponse {
            lots,
            congestion_score: congestion,
            timestamp,
        },
    }
}

fn build_lot_response(
    state: &Arc<RwLock<AppState>>,
    id: &str,
    now: SystemTime,
) -> ApiResponse<LotSuccessResponse> {
    let lot = match state.read() {
        Ok(guard) => guard.lot(id).cloned(),
        Err(_) => return internal_error("/api/lots/{id}", "state lock poisoned while reading lot"),
    };

    let Some(lot) = lot else {
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("No lot with id {id}"),
            now,
        );
    };

    match (map_lot(&lot), format_timestamp(now)) {
        (Ok(lot), Ok(timestamp)) => ApiResponse::Success {
            status: StatusCode::OK,
            body: LotSuccessResponse { lot, timestamp },
        },
        _ => internal_error("/api/lots/{id}", "timestamp formatting failure"),
    }
}

fn build_search_response(
    query: String,
    hits: Vec<SearchHit>,
    now: SystemTime,
) -> ApiResponse<SearchSuccessResponse> {
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        match map_lot(&hit.lot) {
            Ok(lot) => results.push(SearchHitResponse {
                lot,
                distance_km: hit.distance_km,
            }),
            Err(_) => return internal_error("/api/search", "timestamp formatting failure"),
        }
    }

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: SearchSuccessResponse {
                query,
                results,
                timestamp,
            },
        },
        Err(_) => internal_error("/api/search", "timestamp formatting failure"),
    }
}

fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading lots");
        }
    };
    let lot_count = guard.lots().len();
    let last_fetch = guard.last_fetch().cloned();
    drop(guard);

    let status = derive_health_status(lot_count, last_fetch.as_ref().map(|f| &f.status));
    let last_error = match last_fetch.as_ref().map(|f| &f.status) {
        Some(FetchStatus::Failed { reason }) => Some(reason.clone()),
        _ => None,
    };
    let formatted = (
        format_timestamp(now),
        last_fetch.map(|f| format_timestamp(f.timestamp)).transpose(),
    );
    let (timestamp, last_fetch) = match formatted {
        (Ok(timestamp), Ok(last_fetch)) => (timestamp, last_fetch),
        _ => return internal_error("/api/health", "timestamp formatting failure"),
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            lot_count,
            last_fetch,
            last_error,
            timestamp,
        },
    }
}

fn derive_health_status(lot_count: usize, last_fetch: Option<&FetchStatus>) -> HealthStatus {
    match last_fetch {
        Some(FetchStatus::Ok { .. }) => HealthStatus::Ok,
        Some(FetchStatus::Failed { .. }) if lot_count > 0 => HealthStatus::Degraded,
        _ => HealthStatus::Ko,
    }
}

fn build_refresh_response(
    refresh: &RefreshTrigger,
    now: SystemTime,
) -> ApiResponse<RefreshAcceptedResponse> {
    refresh.request();
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::ACCEPTED,
            body: RefreshAcceptedResponse {
                refresh_requested: true,
                timestamp,
            },
        },
        Err(_) => internal_error("/api/refresh", "timestamp formatting failure"),
    }
}

fn map_lots(lots: &[ParkingLot]) -> Result<Vec<LotResponse>, TimestampError> {
    lots.iter().map(map_lot).collect()
}

fn map_lot(lot: &ParkingLot) -> Result<LotResponse, TimestampError> {
    Ok(LotResponse {
        id: lot.id.clone(),
        source_lot_id: lot.source_lot_id.clone(),
        name: lot.name.clone(),
        address: lot.address.clone(),
        lat: lot.coordinates.map(|c| c.lat),
        lng: lot.coordinates.map(|c| c.lng),
        total: lot.total,
        free: lot.free,
        occupied: lot.occupied,
        status: lot.status,
        confidence_pct: lot.confidence_pct(),
        estimate_source: lot.estimate_source,
        availability: AvailabilityResponse {
            level: lot.availability.level,
            pct: lot.availability.pct,
        },
        congestion_score: lot.congestion_score,
        last_updated: format_timestamp(lot.last_updated)?,
    })
}

fn no_data_response<T>(now: SystemTime) -> ApiResponse<T> {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::NoData,
        "No lots fetched yet".to_string(),
        now,
    )
}

fn error_response<T>(
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: SystemTime,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message,
                timestamp,
            },
        },
        Err(_) => internal_error("error response", "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route, reason = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::classify::{AvailabilityLevel, classify};
    use crate::source::mock::MockGeocoder;
    use crate::state::{Coordinates, EstimateSource, FetchOutcome, LotStatus};
    use std::time::{Duration, UNIX_EPOCH};

    fn lot(id: &str, free: Option<u32>) -> ParkingLot {
        ParkingLot {
            id: id.to_string(),
            source_lot_id: None,
            name: format!("Lot {id}"),
            address: Some("100 Queen St".to_string()),
            coordinates: Some(Coordinates {
                lat: 45.42,
                lng: -75.69,
            }),
            total: 100,
            free,
            occupied: free.map(|f| 100 - f),
            status: LotStatus::Available,
            confidence: 0.654,
            estimate_source: EstimateSource::Heuristic,
            availability: classify(free, 100),
            congestion_score: Some(40),
            last_updated: UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    fn state_with(lots: Vec<ParkingLot>, fetch: Option<FetchStatus>) -> Arc<RwLock<AppState>> {
        let mut app_state = AppState::new();
        app_state.set_lots(lots);
        if let Some(status) = fetch {
            app_state.record_fetch(FetchOutcome {
                timestamp: UNIX_EPOCH + Duration::from_secs(10),
                status,
            });
        }
        Arc::new(RwLock::new(app_state))
    }

    fn poisoned() -> Arc<RwLock<AppState>> {
        let state = Arc::new(RwLock::new(AppState::new()));
        let state_for_thread = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();
        state
    }

    fn ok_fetch(lot_count: usize) -> Option<FetchStatus> {
        Some(FetchStatus::Ok { lot_count })
    }

    fn failed_fetch() -> Option<FetchStatus> {
        Some(FetchStatus::Failed {
            reason: "http status 503 (down)".to_string(),
        })
    }

    #[test]
    fn lots_handler_returns_no_data_before_first_fetch() {
        let state = state_with(Vec::new(), failed_fetch());

        let response = build_lots_response(
            &state,
            &LotFilters::default(),
            UtcOffset::UTC,
            UNIX_EPOCH + Duration::from_secs(2),
        );

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::NoData);
                assert_eq!(body.timestamp, "1970-01-01T00:00:02Z");
            }
            ApiResponse::Success { .. } => panic!("expected no data response"),
        }
    }

    #[test]
    fn lots_handler_maps_lots_and_applies_filters() {
        let state = state_with(vec![lot("a", Some(80)), lot("b", Some(5))], ok_fetch(2));
        let filters = LotFilters {
            query: String::new(),
            only_available: true,
        };

        // Thursday 1970-01-01 00:00:03 UTC: 40 + 10 - 15
        let response =
            build_lots_response(&state, &filters, UtcOffset::UTC, UNIX_EPOCH + Duration::from_secs(3));

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.congestion_score, 35);
                assert_eq!(body.lots.len(), 1);
                let first = &body.lots[0];
                assert_eq!(first.id, "a");
                assert_eq!(first.confidence_pct, 65);
                assert_eq!(first.availability.level, AvailabilityLevel::Available);
                assert_eq!(first.availability.pct, Some(80));
                assert_eq!(first.last_updated, "1970-01-01T00:00:01Z");
            }
            ApiResponse::Error { status, .. } => panic!("expected success, got {status}"),
        }
    }

    #[test]
    fn successful_empty_fetch_is_not_no_data() {
        let state = state_with(Vec::new(), ok_fetch(0));

        let response =
            build_lots_response(&state, &LotFilters::default(), UtcOffset::UTC, UNIX_EPOCH);

        assert!(matches!(response, ApiResponse::Success { .. }));
    }

    #[test]
    fn lot_handler_returns_not_found() {
        let state = state_with(vec![lot("a", Some(80))], ok_fetch(1));

        match build_lot_response(&state, "missing", UNIX_EPOCH) {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body.error_code, ErrorCode::NotFound);
            }
            ApiResponse::Success { .. } => panic!("expected not found"),
        }
        assert!(matches!(
            build_lot_response(&state, "a", UNIX_EPOCH),
            ApiResponse::Success { .. }
        ));
    }

    #[test]
    fn health_reflects_last_fetch() {
        let cases = [
            (vec![lot("a", Some(1))], ok_fetch(1), HealthStatus::Ok, StatusCode::OK),
            (vec![lot("a", Some(1))], failed_fetch(), HealthStatus::Degraded, StatusCode::OK),
            (Vec::new(), failed_fetch(), HealthStatus::Ko, StatusCode::SERVICE_UNAVAILABLE),
            (Vec::new(), None, HealthStatus::Ko, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (lots, fetch, expected, expected_code) in cases {
            let state = state_with(lots, fetch);
            match build_health_response(&state, UNIX_EPOCH + Duration::from_secs(4)) {
                ApiResponse::Success { status, body } => {
                    assert_eq!(status, expected_code);
                    assert_eq!(body.status, expected);
                    assert_eq!(body.timestamp, "1970-01-01T00:00:04Z");
                }
                ApiResponse::Error { status, .. } => panic!("expected success, got {status}"),
            }
        }
    }

    #[test]
    fn degraded_health_reports_error_and_fetch_time() {
        let state = state_with(vec![lot("a", Some(1))], failed_fetch());

        match build_health_response(&state, UNIX_EPOCH) {
            ApiResponse::Success { body, .. } => {
                assert_eq!(body.last_fetch.as_deref(), Some("1970-01-01T00:00:10Z"));
                assert_eq!(body.last_error.as_deref(), Some("http status 503 (down)"));
            }
            ApiResponse::Error { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn handlers_return_internal_error_when_lock_poisoned() {
        let state = poisoned();

        let lots = build_lots_response(&state, &LotFilters::default(), UtcOffset::UTC, UNIX_EPOCH);
        let health = build_health_response(&state, UNIX_EPOCH);

        for response in [
            lots.into_response().status(),
            health.into_response().status(),
            build_lot_response(&state, "a", UNIX_EPOCH)
                .into_response()
                .status(),
        ] {
            assert_eq!(response, StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert!(snapshot_lots(&state).is_err());
    }

    #[tokio::test]
    async fn refresh_handler_accepts_and_notifies() {
        let trigger = RefreshTrigger::default();

        let response = build_refresh_response(&trigger, UNIX_EPOCH);

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::ACCEPTED);
                assert!(body.refresh_requested);
            }
            ApiResponse::Error { .. } => panic!("expected accepted"),
        }
        let notified =
            tokio::time::timeout(Duration::from_millis(100), trigger.requested()).await;
        assert!(notified.is_ok());
    }

    #[tokio::test]
    async fn search_response_carries_distance() {
        let lots = vec![lot("a", Some(10)), lot("b", Some(90))];
        let hits = search_lots(&lots, "rideau centre", None::<&MockGeocoder>).await;

        match build_search_response("rideau centre".to_string(), hits, UNIX_EPOCH) {
            ApiResponse::Success { body, .. } => {
                assert_eq!(body.query, "rideau centre");
                assert_eq!(body.results.len(), 2);
                assert!(body.results.iter().all(|r| r.distance_km.is_some()));
            }
            ApiResponse::Error { .. } => panic!("expected success"),
        }

        let hits = search_lots(&lots, "queen", None::<&MockGeocoder>).await;
        match build_search_response("queen".to_string(), hits, UNIX_EPOCH) {
            ApiResponse::Success { body, .. } => {
                let ids: Vec<_> = body.results.iter().map(|r| r.lot.id.as_str()).collect();
                assert_eq!(ids, vec!["b", "a"]);
                assert!(body.results.iter().all(|r| r.distance_km.is_none()));
            }
            ApiResponse::Error { .. } => panic!("expected success"),
        }
    }
}
