//! Time-of-day occupancy model for lots with neither live nor virtual counts.
//!
//! Output is deterministic: the noise term comes from a mulberry32 generator
//! seeded with the 32-bit FNV-1a hash of `"{lot_id}|{bucket}"`, where the
//! bucket is the 15 second window containing `now`. Two calls inside the same
//! window return identical values.

use crate::state::Coordinates;
use time::{OffsetDateTime, Weekday};

pub const BUCKET_SECS: i64 = 15;
pub const NO_CAPACITY_CONFIDENCE: f64 = 0.2;
const NOISE_SPAN: f64 = 0.12;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

// Downtown core bounding box.
const CORE_LAT: (f64, f64) = (45.415, 45.43);
const CORE_LNG: (f64, f64) = (-75.71, -75.68);

const HOSPITAL_KEYWORDS: &[&str] = &["hospital", "civic", "general", "queensway"];
const TRANSIT_KEYWORDS: &[&str] = &["station", "o-train", "park and ride", "park & ride"];
const DOWNTOWN_KEYWORDS: &[&str] = &["slater", "queen", "bank", "rideau", "byward"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotKind {
    Downtown,
    Hospital,
    Transit,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindProfile {
    pub base: f64,
    pub peak_boost: f64,
    pub min: f64,
    pub max: f64,
}

impl LotKind {
    pub fn profile(self) -> KindProfile {
        match self {
            LotKind::Downtown => KindProfile {
                base: 0.55,
                peak_boost: 0.3,
                min: 0.25,
                max: 0.95,
            },
            LotKind::Hospital => KindProfile {
                base: 0.5,
                peak_boost: 0.25,
                min: 0.2,
                max: 0.9,
            },
            LotKind::Transit => KindProfile {
                base: 0.35,
                peak_boost: 0.35,
                min: 0.1,
                max: 0.95,
            },
            LotKind::Generic => KindProfile {
                base: 0.4,
                peak_boost: 0.2,
                min: 0.1,
                max: 0.85,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicEstimate {
    pub occupied: u32,
    pub confidence: f64,
}

/// 32-bit FNV-1a over the UTF-16 code units of `input`.
pub fn fnv1a_32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// mulberry32: small 32-bit state generator yielding floats in `[0, 1)`.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let t = self.state;
        let mut x = (t ^ (t >> 15)).wrapping_mul(1 | t);
        x ^= x.wrapping_add((x ^ (x >> 7)).wrapping_mul(61 | x));
        x ^ (x >> 14)
    }

    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }
}

pub fn time_bucket(now: OffsetDateTime) -> i64 {
    now.unix_timestamp().div_euclid(BUCKET_SECS)
}

pub fn detect_lot_kind(name: &str, coordinates: Option<Coordinates>) -> LotKind {
    let name = name.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));

    if mentions(HOSPITAL_KEYWORDS) {
        return LotKind::Hospital;
    }
    if mentions(TRANSIT_KEYWORDS) {
        return LotKind::Transit;
    }
    if let Some(c) = coordinates
        && (CORE_LAT.0..=CORE_LAT.1).contains(&c.lat)
        && (CORE_LNG.0..=CORE_LNG.1).contains(&c.lng)
    {
        return LotKind::Downtown;
    }
    if mentions(DOWNTOWN_KEYWORDS) {
        return LotKind::Downtown;
    }
    LotKind::Generic
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Saturday | Weekday::Sunday)
}

/// How close `now` (local time) is to a parking peak, in `[0.4, 1.0]`.
pub fn peak_factor(now: OffsetDateTime) -> f64 {
    let hour = now.hour();

    if !is_weekend(now.weekday()) {
        return match hour {
            7..=10 => 1.0,
            15..=18 => 0.9,
            11..=14 => 0.7,
            19..=22 => 0.6,
            _ => 0.45,
        };
    }

    match hour {
        11..=17 => 0.85,
        18..=22 => 0.65,
        _ => 0.4,
    }
}

/// Estimate occupied spaces for a lot at local time `now`.
pub fn estimate_occupied(
    lot_id: &str,
    name: &str,
    capacity: u32,
    coordinates: Option<Coordinates>,
    now: OffsetDateTime,
) -> HeuristicEstimate {
    if capacity == 0 {
        return HeuristicEstimate {
            occupied: 0,
            confidence: NO_CAPACITY_CONFIDENCE,
        };
    }

    let profile = detect_lot_kind(name, coordinates).profile();
    let pf = peak_factor(now);

    let seed = fnv1a_32(&format!("{lot_id}|{}", time_bucket(now)));
    let noise = (Mulberry32::new(seed).next_f64() - 0.5) * NOISE_SPAN;

    let ratio = (profile.base + profile.peak_boost * (pf - 0.5) + noise)
        .clamp(profile.min, profile.max);
    let capacity_f = f64::from(capacity);
    let occupied = (ratio * capacity_f).round().clamp(0.0, capacity_f) as u32;

    let capacity_factor = (capacity_f / 200.0).clamp(0.2, 1.0);
    let peak_confidence = pf.clamp(0.4, 1.0);
    let confidence =
        (0.25 + 0.35 * peak_confidence + 0.2 * capacity_factor).clamp(0.25, 0.75);

    HeuristicEstimate {
        occupied,
        confidence,
    }
}
