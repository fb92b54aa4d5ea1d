//! Congestion score (time of day plus weather) and its effect on heuristic lots.

use crate::estimation::tier::heuristic_status;
use crate::state::ParkingLot;
use crate::weather::WeatherReading;
use time::{OffsetDateTime, Weekday};

const BASELINE_SCORE: i32 = 40;
const MAX_DROP_RATIO: f64 = 0.35;
/// Free share assumed for a heuristic lot whose counts are unknown.
const DEFAULT_FREE_RATIO: f64 = 0.35;

/// Congestion from the local calendar alone, in `0..=100`.
pub fn time_congestion_score(now: OffsetDateTime) -> u8 {
    let hour = now.hour();
    let mut score = BASELINE_SCORE;

    if (7..=9).contains(&hour) {
        score += 25;
    }
    if (15..=18).contains(&hour) {
        score += 30;
    }
    match now.weekday() {
        Weekday::Monday | Weekday::Tuesday | Weekday::Wednesday | Weekday::Thursday => {
            score += 10
        }
        Weekday::Saturday | Weekday::Sunday => score -= 10,
        Weekday::Friday => {}
    }
    if hour >= 22 || hour <= 5 {
        score -= 15;
    }

    score.clamp(0, 100) as u8
}

pub fn weather_delta(weather: &WeatherReading) -> i32 {
    let mut delta = 0;
    if weather.rain {
        delta += 10;
    }
    if weather.snow {
        delta += 20;
    }
    if weather.temp < -10.0 {
        delta += 15;
    }
    delta
}

/// Time score plus the weather delta when a reading is available.
pub fn congestion_score(now: OffsetDateTime, weather: Option<&WeatherReading>) -> u8 {
    let base = i32::from(time_congestion_score(now));
    let delta = weather.map(weather_delta).unwrap_or(0);
    (base + delta).clamp(0, 100) as u8
}

fn round_u32(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Lower the free count of heuristic lots by up to 35% of capacity.
///
/// Status and availability are re-derived from the new counts. Live and
/// virtual lots are returned untouched.
pub fn adjust(lots: Vec<ParkingLot>, congestion: u8) -> Vec<ParkingLot> {
    lots.into_iter()
        .map(|lot| adjust_lot(lot, congestion))
        .collect()
}

pub fn adjust_lot(mut lot: ParkingLot, congestion: u8) -> ParkingLot {
    if !lot.is_heuristic() || lot.total == 0 {
        return lot;
    }

    let capacity = lot.total;
    let capacity_f = f64::from(capacity);
    let congestion = congestion.min(100);

    let max_drop = round_u32(capacity_f * MAX_DROP_RATIO);
    let drop = round_u32(f64::from(congestion) / 100.0 * f64::from(max_drop));

    let current = lot
        .free
        .unwrap_or_else(|| round_u32(capacity_f * DEFAULT_FREE_RATIO))
        .min(capacity);
    let free = current.saturating_sub(drop);

    lot.set_counts(Some(free), Some(capacity - free));
    lot.status = heuristic_status(free, capacity);
    lot.congestion_score = Some(congestion);
    lot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::classify::{AvailabilityLevel, classify};
    use crate::state::{EstimateSource, LotStatus};
    use std::time::UNIX_EPOCH;
    use time::macros::datetime;

    fn lot(source: EstimateSource, free: Option<u32>, total: u32) -> ParkingLot {
        ParkingLot {
            id: "p1".to_string(),
            source_lot_id: None,
            name: "Lot".to_string(),
            address: None,
            coordinates: None,
            total,
            free,
            occupied: free.map(|f| total - f),
            status: LotStatus::Available,
            confidence: 0.5,
            estimate_source: source,
            availability: classify(free, total),
            congestion_score: None,
            last_updated: UNIX_EPOCH,
        }
    }

    fn weather(temp: f64, rain: bool, snow: bool) -> WeatherReading {
        WeatherReading { temp, rain, snow }
    }

    #[test]
    fn time_score_follows_calendar() {
        // Tuesday 08:00: 40 + 25 + 10
        assert_eq!(time_congestion_score(datetime!(2026-01-13 08:00 -5)), 75);
        // Wednesday 16:00: 40 + 30 + 10
        assert_eq!(time_congestion_score(datetime!(2026-01-14 16:00 -5)), 80);
        // Friday 12:00: baseline only
        assert_eq!(time_congestion_score(datetime!(2026-01-16 12:00 -5)), 40);
        // Sunday 23:00: 40 - 10 - 15
        assert_eq!(time_congestion_score(datetime!(2026-01-18 23:00 -5)), 15);
    }

    #[test]
    fn weather_adds_on_top_and_clamps() {
        let now = datetime!(2026-01-14 16:00 -5);
        let storm = weather(-20.0, true, true);

        assert_eq!(weather_delta(&storm), 45);
        assert_eq!(congestion_score(now, Some(&storm)), 100);
        assert_eq!(congestion_score(now, Some(&weather(5.0, true, false))), 90);
        assert_eq!(congestion_score(now, None), 80);
    }

    #[test]
    fn full_congestion_drops_at_most_max_drop() {
        let adjusted = adjust_lot(lot(EstimateSource::Heuristic, Some(80), 100), 100);

        assert_eq!(adjusted.free, Some(45));
        assert_eq!(adjusted.occupied, Some(55));
        assert_eq!(adjusted.congestion_score, Some(100));
    }

    #[test]
    fn adjusted_free_stays_within_capacity() {
        for free in [0, 5, 35, 100] {
            for congestion in [0, 50, 100] {
                let before = lot(EstimateSource::Heuristic, Some(free), 100);
                let adjusted = adjust_lot(before, congestion);
                let after = adjusted.free.unwrap_or(0);
                assert!(after <= 100);
                assert!(free - after <= 35);
                assert_eq!(after + adjusted.occupied.unwrap_or(0), 100);
            }
        }
    }

    #[test]
    fn unknown_free_starts_from_default_share() {
        // current = 35, max_drop = 35, drop = round(0.5 * 35) = 18
        let adjusted = adjust_lot(lot(EstimateSource::Heuristic, None, 100), 50);

        assert_eq!(adjusted.free, Some(17));
    }

    #[test]
    fn live_and_virtual_lots_pass_through() {
        let live = lot(EstimateSource::Live, Some(80), 100);
        let virtual_lot = lot(EstimateSource::Virtual, Some(80), 100);

        let adjusted = adjust(vec![live.clone(), virtual_lot.clone()], 100);

        assert_eq!(adjusted, vec![live, virtual_lot]);
    }

    #[test]
    fn status_follows_adjusted_counts() {
        // 40 free of 100 is "available"; after a full drop of 35 only 5 remain.
        let adjusted = adjust_lot(lot(EstimateSource::Heuristic, Some(40), 100), 100);

        assert_eq!(adjusted.free, Some(5));
        assert_eq!(adjusted.status, LotStatus::Busy);
        assert_eq!(adjusted.availability.level, AvailabilityLevel::Busy);
    }

    #[test]
    fn adjusted_lots_agree_with_their_counts_across_the_week() {
        let mut checked = 0;
        for day in 12..=18 {
            for hour in 0..24u8 {
                let now = datetime!(2026-01-12 00:00 -5)
                    .replace_day(day)
                    .and_then(|t| t.replace_hour(hour))
                    .expect("valid local time");
                for storm in [None, Some(weather(-20.0, true, true))] {
                    let congestion = congestion_score(now, storm.as_ref());
                    for total in [1, 7, 40, 100, 350] {
                        for free in [None, Some(0), Some(1), Some(total / 3), Some(total)] {
                            let adjusted =
                                adjust_lot(lot(EstimateSource::Heuristic, free, total), congestion);
                            let after = adjusted.free.expect("adjusted free");
                            let occupied = adjusted.occupied.expect("adjusted occupied");

                            assert!(after <= total);
                            assert_eq!(after + occupied, total);
                            assert_eq!(adjusted.availability, classify(Some(after), total));
                            assert_eq!(adjusted.status, heuristic_status(after, total));
                            checked += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(checked, 7 * 24 * 2 * 5 * 5);
    }

    #[test]
    fn zero_capacity_lot_is_left_alone() {
        let empty = lot(EstimateSource::Heuristic, None, 0);

        assert_eq!(adjust_lot(empty.clone(), 100), empty);
    }
}
