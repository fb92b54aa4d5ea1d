use crate::error::{AppError, SourceError};
use crate::source::{LotSource, RawLotRecord};
use crate::state::{AppState, FetchOutcome, FetchStatus, ParkingLot};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

pub mod classify;
pub mod congestion;
pub mod heuristic;
pub mod merge;
pub mod normalize;
pub mod tier;

use congestion::{adjust, adjust_lot, congestion_score};
use merge::{dedup_lots, merge};
use tier::{apply_heuristic, resolve};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Offset used for every calendar decision (peak hours, weekdays).
    pub utc_offset: UtcOffset,
    pub congestion_adjustment: bool,
    pub request_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            utc_offset: UtcOffset::UTC,
            congestion_adjustment: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

pub fn local_time(now: SystemTime, offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::from(now).to_offset(offset)
}

pub fn resolve_batch(rows: &[RawLotRecord], now: OffsetDateTime) -> Vec<ParkingLot> {
    rows.iter().map(|row| resolve(row, now)).collect()
}

/// Congestion for `now`, using the held weather reading when there is one.
pub fn current_congestion(state: &AppState, now: OffsetDateTime) -> u8 {
    congestion_score(now, state.weather())
}

pub async fn run_fetch_cycle<S: LotSource>(
    state: &Arc<RwLock<AppState>>,
    source: &S,
    settings: &PipelineSettings,
) -> Result<usize, AppError> {
    let rows = match tokio::time::timeout(settings.request_timeout, source.fetch_lots()).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::Timeout(settings.request_timeout.as_secs())),
    };
    apply_fetch_result(state, rows, settings, SystemTime::now())
}

/// Fold one fetch result into the shared state.
///
/// A failed fetch is recorded and the held lots are left untouched.
fn apply_fetch_result(
    state: &Arc<RwLock<AppState>>,
    rows: Result<Vec<RawLotRecord>, SourceError>,
    settings: &PipelineSettings,
    timestamp: SystemTime,
) -> Result<usize, AppError> {
    let rows = match rows {
        Ok(rows) => rows,
        Err(err) => {
            let mut guard = state.write().map_err(|_| AppError::StateLock)?;
            guard.record_fetch(FetchOutcome {
                timestamp,
                status: FetchStatus::Failed {
                    reason: err.to_string(),
                },
            });
            return Err(err.into());
        }
    };

    let now = local_time(timestamp, settings.utc_offset);
    let resolved = resolve_batch(&rows, now);

    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    let resolved = if settings.congestion_adjustment {
        adjust(resolved, current_congestion(&guard, now))
    } else {
        resolved
    };
    let fresh = dedup_lots(resolved);
    let merged = merge(guard.lots(), fresh);
    let lot_count = merged.len();

    guard.set_lots(merged);
    guard.record_fetch(FetchOutcome {
        timestamp,
        status: FetchStatus::Ok { lot_count },
    });
    drop(guard);

    if rows.len() != lot_count {
        debug!(rows = rows.len(), lots = lot_count, "Duplicate rows collapsed");
    }
    info!(lots = lot_count, "Lots refreshed");
    Ok(lot_count)
}

/// Re-estimate heuristic lots in memory. Live and virtual lots are not touched.
pub fn run_tick_cycle(
    state: &Arc<RwLock<AppState>>,
    settings: &PipelineSettings,
) -> Result<usize, AppError> {
    run_tick_cycle_at(state, settings, SystemTime::now())
}

fn run_tick_cycle_at(
    state: &Arc<RwLock<AppState>>,
    settings: &PipelineSettings,
    timestamp: SystemTime,
) -> Result<usize, AppError> {
    let now = local_time(timestamp, settings.utc_offset);
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;

    let ticked = guard.lots().iter().filter(|lot| lot.is_heuristic()).count();
    if ticked == 0 {
        return Ok(0);
    }

    let congestion = settings
        .congestion_adjustment
        .then(|| current_congestion(&guard, now));
    let lots = guard
        .lots()
        .iter()
        .cloned()
        .map(|mut lot| {
            if !lot.is_heuristic() {
                return lot;
            }
            apply_heuristic(&mut lot, now);
            match congestion {
                Some(score) => adjust_lot(lot, score),
                None => lot,
            }
        })
        .collect();

    guard.set_lots(lots);
    debug!(lots = ticked, "Heuristic lots re-estimated");
    Ok(ticked)
}

/// Log a cycle error the way every timer does.
pub(crate) fn log_cycle_error(cycle: &str, err: &AppError) {
    match err {
        AppError::Source(source) if source.is_timeout() => {
            warn!(cycle, error = %err, "Upstream request timed out");
        }
        _ => warn!(cycle, error = %err, "Cycle failed"),
    }
}
