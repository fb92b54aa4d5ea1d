use crate::estimation::classify::{Availability, classify};
use crate::weather::WeatherReading;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::watch;

pub type LotId = String;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Rows without a position are stored upstream as (0, 0).
    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

/// Provenance tier of a lot's counts, ordered from least to most trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateSource {
    Heuristic,
    Virtual,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    Available,
    Busy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParkingLot {
    pub id: LotId,
    pub source_lot_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub total: u32,
    pub free: Option<u32>,
    pub occupied: Option<u32>,
    pub status: LotStatus,
    pub confidence: f64,
    pub estimate_source: EstimateSource,
    pub availability: Availability,
    pub congestion_score: Option<u8>,
    pub last_updated: SystemTime,
}

impl ParkingLot {
    /// Overwrite the counts and re-derive the availability band from them.
    pub fn set_counts(&mut self, free: Option<u32>, occupied: Option<u32>) {
        self.free = free;
        self.occupied = occupied;
        self.refresh_availability();
    }

    pub fn refresh_availability(&mut self) {
        self.availability = classify(self.free, self.total);
    }

    pub fn is_heuristic(&self) -> bool {
        self.estimate_source == EstimateSource::Heuristic
    }

    /// Confidence as a whole percentage in 0..=100.
    pub fn confidence_pct(&self) -> u8 {
        let pct = if self.confidence > 1.0 {
            self.confidence
        } else {
            self.confidence * 100.0
        };
        pct.round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok { lot_count: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub timestamp: SystemTime,
    pub status: FetchStatus,
}

#[derive(Debug)]
pub struct AppState {
    lots: Vec<ParkingLot>,
    lots_tx: watch::Sender<Vec<ParkingLot>>,
    weather: Option<WeatherReading>,
    weather_tx: watch::Sender<Option<WeatherReading>>,
    last_fetch: Option<FetchOutcome>,
}

impl AppState {
    pub fn new() -> Self {
        let (lots_tx, _lots_rx) = watch::channel(Vec::new());
        let (weather_tx, _weather_rx) = watch::channel(None);
        Self {
            lots: Vec::new(),
            lots_tx,
            weather: None,
            weather_tx,
            last_fetch: None,
        }
    }

    pub fn lots(&self) -> &[ParkingLot] {
        &self.lots
    }

    pub fn lot(&self, id: &str) -> Option<&ParkingLot> {
        self.lots.iter().find(|lot| lot.id == id)
    }

    pub fn subscribe_lots(&self) -> watch::Receiver<Vec<ParkingLot>> {
        self.lots_tx.subscribe()
    }

    /// Replace the whole lot collection. Readers see either the old or the new set.
    pub fn set_lots(&mut self, lots: Vec<ParkingLot>) {
        self.lots = lots.clone();
        // send_replace stores the value even when nobody is subscribed
        self.lots_tx.send_replace(lots);
    }

    pub fn weather(&self) -> Option<&WeatherReading> {
        self.weather.as_ref()
    }

    pub fn subscribe_weather(&self) -> watch::Receiver<Option<WeatherReading>> {
        self.weather_tx.subscribe()
    }

    pub fn set_weather(&mut self, weather: Option<WeatherReading>) {
        self.weather = weather;
        self.weather_tx.send_replace(weather);
    }

    pub fn last_fetch(&self) -> Option<&FetchOutcome> {
        self.last_fetch.as_ref()
    }

    pub fn record_fetch(&mut self, outcome: FetchOutcome) {
        self.last_fetch = Some(outcome);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::classify::AvailabilityLevel;
    use std::time::{Duration, UNIX_EPOCH};

    fn lot(id: &str, free: Option<u32>, total: u32) -> ParkingLot {
        ParkingLot {
            id: id.to_string(),
            source_lot_id: None,
            name: format!("Lot {id}"),
            address: None,
            coordinates: None,
            total,
            free,
            occupied: free.map(|f| total - f),
            status: LotStatus::Available,
            confidence: 0.95,
            estimate_source: EstimateSource::Live,
            availability: classify(free, total),
            congestion_score: None,
            last_updated: UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    #[test]
    fn set_lots_updates_state_and_watch() {
        let mut state = AppState::new();
        let receiver = state.subscribe_lots();
        let lots = vec![lot("p1", Some(10), 50)];

        state.set_lots(lots.clone());

        assert_eq!(state.lots(), lots.as_slice());
        assert_eq!(receiver.borrow().as_slice(), lots.as_slice());
    }

    #[test]
    fn set_lots_without_subscribers_still_stores() {
        let mut state = AppState::new();

        state.set_lots(vec![lot("p1", None, 0)]);

        assert_eq!(state.lots().len(), 1);
        assert!(state.lot("p1").is_some());
        assert!(state.lot("missing").is_none());
    }

    #[test]
    fn set_counts_rederives_availability() {
        let mut lot = lot("p1", Some(40), 50);
        assert_eq!(lot.availability.level, AvailabilityLevel::Available);

        lot.set_counts(Some(5), Some(45));

        assert_eq!(lot.availability.level, AvailabilityLevel::Busy);
        assert_eq!(lot.availability.pct, Some(10));
    }

    #[test]
    fn confidence_pct_accepts_ratio_and_percent() {
        let mut lot = lot("p1", Some(1), 2);
        lot.confidence = 0.654;
        assert_eq!(lot.confidence_pct(), 65);
        lot.confidence = 87.0;
        assert_eq!(lot.confidence_pct(), 87);
    }

    #[test]
    fn estimate_source_orders_by_trust() {
        assert!(EstimateSource::Live > EstimateSource::Virtual);
        assert!(EstimateSource::Virtual > EstimateSource::Heuristic);
    }
}
