//! Reconciles a fresh fetch with the lots already held in memory.

use crate::state::ParkingLot;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Combine `fresh` with the `previous` generation, matched by id.
///
/// Heuristic lots that were already held keep their ticking values (and their
/// tier) so a slow re-fetch never snaps them back; live and virtual lots
/// always take the fresh values. Lots missing from `fresh` are dropped.
pub fn merge(previous: &[ParkingLot], fresh: Vec<ParkingLot>) -> Vec<ParkingLot> {
    let previous_by_id: HashMap<&str, &ParkingLot> =
        previous.iter().map(|lot| (lot.id.as_str(), lot)).collect();

    fresh
        .into_iter()
        .map(|next| match previous_by_id.get(next.id.as_str()) {
            Some(prev) if next.is_heuristic() => carry_forward(prev, next),
            _ => next,
        })
        .collect()
}

fn carry_forward(prev: &ParkingLot, mut next: ParkingLot) -> ParkingLot {
    if prev.total != next.total {
        // Held counts were measured against the old capacity.
        if prev.is_heuristic() {
            debug!(
                lot_id = %next.id,
                previous_total = prev.total,
                total = next.total,
                "Capacity changed, dropping held estimate"
            );
        } else {
            info!(
                lot_id = %next.id,
                tier = ?prev.estimate_source,
                previous_total = prev.total,
                total = next.total,
                "Capacity changed and feed lost its counts, falling back to heuristic"
            );
        }
        return next;
    }

    if !prev.is_heuristic() {
        debug!(
            lot_id = %next.id,
            tier = ?prev.estimate_source,
            "Fresh row lost its counts, keeping held tier"
        );
    }

    next.estimate_source = prev.estimate_source;
    next.status = prev.status;
    next.confidence = prev.confidence;
    next.congestion_score = prev.congestion_score;
    next.last_updated = prev.last_updated;
    next.set_counts(prev.free, prev.occupied);
    next
}

/// Lowercased lot name without parenthesised notes or the "city parking" tag.
pub fn normalize_lot_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut stripped = String::with_capacity(lower.len());
    let mut rest = lower.as_str();
    while let Some(open) = rest.find('(') {
        match rest[open..].find(')') {
            Some(close) => {
                stripped.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    stripped.push_str(rest);

    stripped
        .replace("city parking", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedup_key(lot: &ParkingLot) -> String {
    if let Some(source_id) = lot.source_lot_id.as_deref() {
        return format!("src:{source_id}");
    }
    match lot.coordinates {
        Some(c) if !c.is_zero() => format!(
            "geo:{:.6},{:.6}|{}",
            c.lat,
            c.lng,
            normalize_lot_name(&lot.name)
        ),
        _ => format!("id:{}", lot.id),
    }
}

/// Drop near-duplicate rows; the first occurrence of each key wins.
pub fn dedup_lots(lots: Vec<ParkingLot>) -> Vec<ParkingLot> {
    let mut seen = HashSet::new();
    lots.into_iter()
        .filter(|lot| {
            let key = dedup_key(lot);
            let fresh = seen.insert(key);
            if !fresh {
                debug!(lot_id = %lot.id, "Skipping duplicate lot row");
            }
            fresh
        })
        .collect()
}
