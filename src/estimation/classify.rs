//! Availability bands shared by every consumer of resolved lots.
//!
//! Bands use two thresholds on the free percentage: 60% and 30%.

use serde::Serialize;

pub const AVAILABLE_MIN_PCT: u8 = 60;
pub const MODERATE_MIN_PCT: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityLevel {
    Available,
    Moderate,
    Busy,
    /// No usable counts ("no data"). Never rendered as 0% or 100%.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub level: AvailabilityLevel,
    pub pct: Option<u8>,
}

impl Availability {
    pub const UNKNOWN: Availability = Availability {
        level: AvailabilityLevel::Unknown,
        pct: None,
    };

    /// Busy sub-case where not a single space is free.
    pub fn is_full(&self) -> bool {
        self.pct == Some(0)
    }

    pub fn has_space(&self) -> bool {
        matches!(
            self.level,
            AvailabilityLevel::Available | AvailabilityLevel::Moderate
        )
    }
}

/// Rounded free percentage, or `None` when the counts are unknown.
pub fn free_pct(free: Option<u32>, total: u32) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let free = free?;
    let pct = (100.0 * f64::from(free) / f64::from(total)).round();
    Some(pct.clamp(0.0, 100.0) as u8)
}

pub fn level_for_pct(pct: u8) -> AvailabilityLevel {
    if pct >= AVAILABLE_MIN_PCT {
        AvailabilityLevel::Available
    } else if pct >= MODERATE_MIN_PCT {
        AvailabilityLevel::Moderate
    } else {
        AvailabilityLevel::Busy
    }
}

pub fn classify(free: Option<u32>, total: u32) -> Availability {
    match free_pct(free, total) {
        Some(pct) => Availability {
            level: level_for_pct(pct),
            pct: Some(pct),
        },
        None => Availability::UNKNOWN,
    }
}
