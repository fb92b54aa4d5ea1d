//! Picks the provenance tier of a row (live, virtual, heuristic) and builds
//! the resolved [`ParkingLot`] from it.

use crate::estimation::classify::{MODERATE_MIN_PCT, classify, free_pct};
use crate::estimation::heuristic::{NO_CAPACITY_CONFIDENCE, estimate_occupied};
use crate::estimation::normalize::{LotCounts, counts_from, safe_int};
use crate::source::RawLotRecord;
use crate::state::{Coordinates, EstimateSource, LotStatus, ParkingLot};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const LIVE_CONFIDENCE: f64 = 0.95;
pub const VIRTUAL_CONFIDENCE: f64 = 0.65;

const LIVE_DATA_MODES: &[&str] = &["api", "realtime"];

/// Map an upstream status string onto the two UI statuses.
pub fn parse_status(raw: &str) -> Option<LotStatus> {
    match raw.trim().to_lowercase().as_str() {
        "available" | "open" | "ok" | "spaces" => Some(LotStatus::Available),
        "busy" | "full" | "closed" | "unavailable" | "offline" => Some(LotStatus::Busy),
        _ => None,
    }
}

/// Counts are the truth unless the feed says the lot is closed.
pub fn live_status(raw: Option<&str>, free: Option<u32>) -> LotStatus {
    if let Some(raw) = raw {
        if raw.to_lowercase().contains("closed") {
            return LotStatus::Busy;
        }
        if let Some(status) = parse_status(raw) {
            return status;
        }
    }
    status_from_free(free)
}

fn status_from_free(free: Option<u32>) -> LotStatus {
    match free {
        Some(free) if free > 0 => LotStatus::Available,
        _ => LotStatus::Busy,
    }
}

/// Heuristic lots count as available from 30% free upwards.
pub fn heuristic_status(free: u32, total: u32) -> LotStatus {
    match free_pct(Some(free), total) {
        Some(pct) if pct >= MODERATE_MIN_PCT => LotStatus::Available,
        _ => LotStatus::Busy,
    }
}

pub fn has_live_data(raw: &RawLotRecord) -> bool {
    let explicit_mode = raw
        .data_mode
        .as_deref()
        .map(|mode| LIVE_DATA_MODES.contains(&mode.trim().to_lowercase().as_str()))
        .unwrap_or(false);
    safe_int(raw.available).is_some()
        || safe_int(raw.occupied).is_some()
        || raw.status.as_deref().is_some_and(|s| !s.trim().is_empty())
        || explicit_mode
}

/// A virtual count only counts when it is a real, non-negative number.
pub fn has_virtual_data(raw: &RawLotRecord) -> bool {
    raw.virtual_occupied.is_some_and(|occupied| occupied >= 0.0)
}

pub fn parse_updated_at(raw: Option<&str>) -> Option<SystemTime> {
    let parsed = OffsetDateTime::parse(raw?.trim(), &Rfc3339).ok()?;
    Some(SystemTime::from(parsed))
}

fn coordinates(raw: &RawLotRecord) -> Option<Coordinates> {
    match (raw.lat, raw.lng) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
            Some(Coordinates { lat, lng })
        }
        _ => None,
    }
}

/// Resolve one row at local time `now`. First matching tier wins.
pub fn resolve(raw: &RawLotRecord, now: OffsetDateTime) -> ParkingLot {
    let total = safe_int(raw.capacity).unwrap_or(0);
    let coordinates = coordinates(raw);
    let now_system = SystemTime::from(now);

    let mut lot = ParkingLot {
        id: raw.id.clone(),
        source_lot_id: raw
            .source_lot_id
            .as_ref()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        name: raw.name.clone(),
        address: raw.address.clone().filter(|a| !a.trim().is_empty()),
        coordinates,
        total,
        free: None,
        occupied: None,
        status: LotStatus::Busy,
        confidence: NO_CAPACITY_CONFIDENCE,
        estimate_source: EstimateSource::Heuristic,
        availability: classify(None, total),
        congestion_score: None,
        last_updated: now_system,
    };

    if total == 0 {
        return lot;
    }

    let source_updated = parse_updated_at(raw.updated_at.as_deref()).unwrap_or(now_system);

    if has_live_data(raw) {
        let available = safe_int(raw.available);
        let occupied = safe_int(raw.occupied);
        let mut counts = counts_from(total, available, occupied);
        // An explicit occupied column alongside the free count is kept, within what is left.
        if let (Some(free), Some(explicit)) = (counts.free, occupied)
            && available.is_some()
        {
            counts.occupied = Some(explicit.min(total - free));
        }
        lot.set_counts(counts.free, counts.occupied);
        lot.status = live_status(raw.status.as_deref(), counts.free);
        lot.confidence = LIVE_CONFIDENCE;
        lot.estimate_source = EstimateSource::Live;
        lot.last_updated = source_updated;
        return lot;
    }

    if has_virtual_data(raw) {
        let counts = counts_from(total, None, safe_int(raw.virtual_occupied));
        lot.set_counts(counts.free, counts.occupied);
        lot.status = status_from_free(counts.free);
        lot.confidence = VIRTUAL_CONFIDENCE;
        lot.estimate_source = EstimateSource::Virtual;
        lot.last_updated = source_updated;
        return lot;
    }

    apply_heuristic(&mut lot, now);
    lot
}

/// Re-estimate a heuristic lot in place. Lots without capacity stay "no data".
pub fn apply_heuristic(lot: &mut ParkingLot, now: OffsetDateTime) {
    if lot.total == 0 {
        lot.set_counts(None, None);
        lot.confidence = NO_CAPACITY_CONFIDENCE;
        return;
    }

    let estimate = estimate_occupied(&lot.id, &lot.name, lot.total, lot.coordinates, now);
    let LotCounts { free, occupied, .. } = counts_from(lot.total, None, Some(estimate.occupied));
    lot.set_counts(free, occupied);
    lot.status = heuristic_status(free.unwrap_or(0), lot.total);
    lot.confidence = estimate.confidence;
    lot.estimate_source = EstimateSource::Heuristic;
    lot.congestion_score = None;
    lot.last_updated = SystemTime::from(now);
}
