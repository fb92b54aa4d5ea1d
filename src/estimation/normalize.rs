//! Raw-row adapter: turns whatever capacity/availability columns a row carries
//! into one canonical `{total, free, occupied}` triple.

use crate::source::RawLotRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotCounts {
    pub total: u32,
    pub free: Option<u32>,
    pub occupied: Option<u32>,
}

impl LotCounts {
    pub const fn unknown(total: u32) -> Self {
        Self {
            total,
            free: None,
            occupied: None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.total > 0 && self.free.is_some()
    }
}

/// Floors a possibly missing or non-finite number to a non-negative integer.
pub fn safe_int(value: Option<f64>) -> Option<u32> {
    let value = value?;
    if !value.is_finite() {
        return None;
    }
    Some(value.floor().clamp(0.0, f64::from(u32::MAX)) as u32)
}

pub fn normalize(raw: &RawLotRecord) -> LotCounts {
    counts_from(
        safe_int(raw.capacity).unwrap_or(0),
        safe_int(raw.available),
        safe_int(raw.occupied),
    )
}

/// Clamp an explicit free or occupied count against `total`.
///
/// Free wins over occupied when both are given; the other side is filled by
/// subtraction so that `free + occupied == total`.
pub fn counts_from(total: u32, available: Option<u32>, occupied: Option<u32>) -> LotCounts {
    if total == 0 {
        return LotCounts::unknown(0);
    }

    if let Some(available) = available {
        let free = available.min(total);
        return LotCounts {
            total,
            free: Some(free),
            occupied: Some(total - free),
        };
    }

    if let Some(occupied) = occupied {
        let occupied = occupied.min(total);
        return LotCounts {
            total,
            free: Some(total - occupied),
            occupied: Some(occupied),
        };
    }

    LotCounts::unknown(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(capacity: Option<f64>, available: Option<f64>, occupied: Option<f64>) -> RawLotRecord {
        RawLotRecord {
            id: "p1".to_string(),
            name: "Test Lot".to_string(),
            capacity,
            available,
            occupied,
            ..RawLotRecord::default()
        }
    }

    #[test]
    fn available_fills_occupied() {
        let counts = normalize(&raw(Some(50.0), Some(10.0), None));

        assert_eq!(
            counts,
            LotCounts {
                total: 50,
                free: Some(10),
                occupied: Some(40)
            }
        );
    }

    #[test]
    fn occupied_fills_free() {
        let counts = normalize(&raw(Some(50.0), None, Some(10.0)));

        assert_eq!(
            counts,
            LotCounts {
                total: 50,
                free: Some(40),
                occupied: Some(10)
            }
        );
    }

    #[test]
    fn missing_counts_stay_unknown() {
        let counts = normalize(&raw(Some(50.0), None, None));

        assert_eq!(counts, LotCounts::unknown(50));
        assert!(!counts.is_known());
    }

    #[test]
    fn counts_are_clamped_to_total() {
        let over = normalize(&raw(Some(50.0), Some(80.0), None));
        let negative = normalize(&raw(Some(50.0), Some(-3.0), None));
        let over_occupied = normalize(&raw(Some(50.0), None, Some(120.0)));

        assert_eq!(over.free, Some(50));
        assert_eq!(over.occupied, Some(0));
        assert_eq!(negative.free, Some(0));
        assert_eq!(negative.occupied, Some(50));
        assert_eq!(over_occupied.free, Some(0));
        assert_eq!(over_occupied.occupied, Some(50));
    }

    #[test]
    fn zero_or_invalid_capacity_means_no_data() {
        assert_eq!(normalize(&raw(Some(0.0), Some(5.0), None)), LotCounts::unknown(0));
        assert_eq!(normalize(&raw(None, Some(5.0), None)), LotCounts::unknown(0));
        assert_eq!(
            normalize(&raw(Some(f64::NAN), Some(5.0), None)),
            LotCounts::unknown(0)
        );
        assert_eq!(normalize(&raw(Some(-10.0), None, None)), LotCounts::unknown(0));
    }

    #[test]
    fn fractional_values_are_floored() {
        let counts = normalize(&raw(Some(49.9), Some(10.7), None));

        assert_eq!(counts.total, 49);
        assert_eq!(counts.free, Some(10));
        assert_eq!(counts.occupied, Some(39));
    }

    #[test]
    fn non_finite_available_is_treated_as_absent() {
        let counts = normalize(&raw(Some(50.0), Some(f64::INFINITY), Some(20.0)));

        assert_eq!(counts.free, Some(30));
        assert_eq!(counts.occupied, Some(20));
    }
}
